// crates/exchange-gate-core/src/core/audit.rs
// ============================================================================
// Module: Exchange Gate Audit Trail Model
// Description: Request-scoped audit context, finalized audits, and log records.
// Purpose: Guarantee one terminal audit record per request, shaped consistently.
// Dependencies: serde, serde_json, crate::core::{hashing, redaction}
// ============================================================================

//! ## Overview
//! Every exchange request opens an [`AuditContext`] before anything else
//! happens. The context accumulates identity, the requested fields, the
//! per-field decisions, and the downstream outcome. Finalizing consumes the
//! context and yields a [`FinalizedAudit`]; recording consumes that in turn,
//! so a context cannot be finalized or recorded twice.
//!
//! Lifecycle: `AuditContext` (open, then decided once decisions arrive) to
//! `FinalizedAudit` to [`AuditLogRecord`]. Each phase is written once; a
//! second downstream outcome is rejected with [`AuditContextError`].
//!
//! Audit records never embed raw payloads unless the host opts in through
//! [`PayloadCapture::Raw`]; digests are always present.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::decision::AccessDecision;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::fingerprint_payload;
use crate::core::identifiers::ApplicationId;
use crate::core::identifiers::ConsumerId;
use crate::core::identifiers::CorrelationId;
use crate::core::identifiers::FieldName;
use crate::core::identifiers::ProviderId;
use crate::core::identifiers::SchemaId;
use crate::core::redaction::PayloadCapture;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status and Reasons
// ============================================================================

/// Terminal status of an audited request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Request completed and data was disclosed.
    Success,
    /// Request ended without a successful disclosure.
    Failure,
}

impl AuditStatus {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// Reason attached to a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// At least one decision denied disclosure.
    PolicyDenied,
    /// A policy or grant read failed.
    StoreError,
    /// The downstream provider call failed.
    DownstreamError,
    /// The request was rejected before evaluation.
    InvalidRequest,
    /// Request handling stopped before reaching an explicit outcome.
    Cancelled,
    /// Internal contract violation.
    Internal,
}

impl FailureReason {
    /// Returns the stable reason label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PolicyDenied => "policy_denied",
            Self::StoreError => "store_error",
            Self::DownstreamError => "downstream_error",
            Self::InvalidRequest => "invalid_request",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

/// Terminal outcome supplied at finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Request succeeded.
    Success,
    /// Request failed.
    Failure {
        /// Failure classification.
        reason: FailureReason,
        /// Optional human-readable detail.
        detail: Option<String>,
    },
}

impl AuditOutcome {
    /// Builds a failure outcome.
    #[must_use]
    pub fn failure(reason: FailureReason, detail: Option<String>) -> Self {
        Self::Failure {
            reason,
            detail,
        }
    }

    /// Returns the audit status for the outcome.
    #[must_use]
    pub const fn status(&self) -> AuditStatus {
        match self {
            Self::Success => AuditStatus::Success,
            Self::Failure {
                ..
            } => AuditStatus::Failure,
        }
    }
}

// ============================================================================
// SECTION: Caller Metadata
// ============================================================================

/// Transport metadata about the caller, kept for forensics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallerMetadata {
    /// Caller user agent, if provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Caller network address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    /// Sanitized client trace identifier, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_trace_id: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when an audit phase is written out of order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditContextError {
    /// The downstream outcome was already recorded.
    #[error("downstream outcome already recorded for {0}")]
    DownstreamAlreadyRecorded(CorrelationId),
    /// The request payload was already recorded.
    #[error("request already recorded for {0}")]
    RequestAlreadyRecorded(CorrelationId),
}

// ============================================================================
// SECTION: Audit Context
// ============================================================================

/// Observable lifecycle phase of an open context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPhase {
    /// Opened; no decisions recorded yet.
    Open,
    /// At least one decision recorded.
    Decided,
}

/// Downstream result captured on the context.
#[derive(Debug, Clone, PartialEq)]
enum DownstreamOutcome {
    /// Provider returned a payload.
    Response(Value),
    /// Provider call failed.
    Failed(String),
}

/// Request-scoped audit accumulator.
///
/// # Invariants
/// - The correlation identifier never changes after opening.
/// - Request payload and downstream outcome are each written at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditContext {
    /// Correlation identifier for the request.
    correlation_id: CorrelationId,
    /// Instant the context opened.
    started_at: Timestamp,
    /// Consumer identity, once resolved.
    consumer_id: Option<ConsumerId>,
    /// Target provider, once known.
    provider_id: Option<ProviderId>,
    /// Consumer application, if supplied.
    application_id: Option<ApplicationId>,
    /// Provider schema, if supplied.
    schema_id: Option<SchemaId>,
    /// Requested field names in request order.
    requested_fields: Vec<FieldName>,
    /// Request payload, if any.
    request_payload: Option<Value>,
    /// Whether the request phase was written.
    request_recorded: bool,
    /// Per-field decisions.
    decisions: Vec<AccessDecision>,
    /// Downstream outcome, once known.
    downstream: Option<DownstreamOutcome>,
    /// Caller transport metadata.
    caller: CallerMetadata,
}

impl AuditContext {
    /// Opens a context for a request.
    #[must_use]
    pub fn new(correlation_id: CorrelationId, started_at: Timestamp) -> Self {
        Self {
            correlation_id,
            started_at,
            consumer_id: None,
            provider_id: None,
            application_id: None,
            schema_id: None,
            requested_fields: Vec::new(),
            request_payload: None,
            request_recorded: false,
            decisions: Vec::new(),
            downstream: None,
            caller: CallerMetadata::default(),
        }
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Returns the instant the context opened.
    #[must_use]
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> AuditPhase {
        if self.decisions.is_empty() { AuditPhase::Open } else { AuditPhase::Decided }
    }

    /// Returns decisions recorded so far.
    #[must_use]
    pub fn decisions(&self) -> &[AccessDecision] {
        &self.decisions
    }

    /// Records the resolved identity and target.
    pub fn set_identity(&mut self, consumer_id: ConsumerId, provider_id: ProviderId) {
        self.consumer_id = Some(consumer_id);
        self.provider_id = Some(provider_id);
    }

    /// Records the optional application and schema identifiers.
    pub fn set_application(
        &mut self,
        application_id: Option<ApplicationId>,
        schema_id: Option<SchemaId>,
    ) {
        self.application_id = application_id;
        self.schema_id = schema_id;
    }

    /// Records caller transport metadata.
    pub fn set_caller(&mut self, caller: CallerMetadata) {
        self.caller = caller;
    }

    /// Records the requested fields and payload.
    ///
    /// # Errors
    ///
    /// Returns [`AuditContextError::RequestAlreadyRecorded`] on a second call.
    pub fn record_request(
        &mut self,
        fields: Vec<FieldName>,
        payload: Option<Value>,
    ) -> Result<(), AuditContextError> {
        if self.request_recorded {
            return Err(AuditContextError::RequestAlreadyRecorded(self.correlation_id.clone()));
        }
        self.requested_fields = fields;
        self.request_payload = payload;
        self.request_recorded = true;
        Ok(())
    }

    /// Appends field decisions.
    pub fn record_decisions(&mut self, decisions: impl IntoIterator<Item = AccessDecision>) {
        self.decisions.extend(decisions);
    }

    /// Records the downstream payload.
    ///
    /// # Errors
    ///
    /// Returns [`AuditContextError::DownstreamAlreadyRecorded`] when an
    /// outcome was already recorded.
    pub fn record_downstream_response(&mut self, payload: Value) -> Result<(), AuditContextError> {
        self.set_downstream(DownstreamOutcome::Response(payload))
    }

    /// Records a downstream failure message.
    ///
    /// # Errors
    ///
    /// Returns [`AuditContextError::DownstreamAlreadyRecorded`] when an
    /// outcome was already recorded.
    pub fn record_downstream_failure(
        &mut self,
        message: impl Into<String>,
    ) -> Result<(), AuditContextError> {
        self.set_downstream(DownstreamOutcome::Failed(message.into()))
    }

    /// Writes the downstream phase once.
    fn set_downstream(&mut self, outcome: DownstreamOutcome) -> Result<(), AuditContextError> {
        if self.downstream.is_some() {
            return Err(AuditContextError::DownstreamAlreadyRecorded(self.correlation_id.clone()));
        }
        self.downstream = Some(outcome);
        Ok(())
    }

    /// Finalizes the context with a terminal outcome.
    ///
    /// An `ended_at` earlier than `started_at` is clamped to `started_at`.
    #[must_use]
    pub fn finalize(self, outcome: AuditOutcome, ended_at: Timestamp) -> FinalizedAudit {
        let ended_at = ended_at.max(self.started_at);
        let status = outcome.status();
        let (failure_reason, mut failure_detail) = match outcome {
            AuditOutcome::Success => (None, None),
            AuditOutcome::Failure {
                reason,
                detail,
            } => (Some(reason), detail),
        };
        let response_payload = match self.downstream {
            Some(DownstreamOutcome::Response(payload)) => Some(payload),
            Some(DownstreamOutcome::Failed(message)) => {
                if failure_detail.is_none() {
                    failure_detail = Some(message);
                }
                None
            }
            None => None,
        };
        FinalizedAudit {
            correlation_id: self.correlation_id,
            started_at: self.started_at,
            ended_at,
            consumer_id: self.consumer_id,
            provider_id: self.provider_id,
            application_id: self.application_id,
            schema_id: self.schema_id,
            requested_fields: self.requested_fields,
            request_payload: self.request_payload,
            response_payload,
            decisions: self.decisions,
            caller: self.caller,
            status,
            failure_reason,
            failure_detail,
        }
    }
}

// ============================================================================
// SECTION: Finalized Audit
// ============================================================================

/// Immutable audit ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedAudit {
    /// Correlation identifier for the request.
    correlation_id: CorrelationId,
    /// Instant the request started.
    started_at: Timestamp,
    /// Instant the request ended.
    ended_at: Timestamp,
    /// Consumer identity, if resolved.
    consumer_id: Option<ConsumerId>,
    /// Target provider, if known.
    provider_id: Option<ProviderId>,
    /// Consumer application, if supplied.
    application_id: Option<ApplicationId>,
    /// Provider schema, if supplied.
    schema_id: Option<SchemaId>,
    /// Requested field names.
    requested_fields: Vec<FieldName>,
    /// Request payload, if any.
    request_payload: Option<Value>,
    /// Downstream payload, if any.
    response_payload: Option<Value>,
    /// Per-field decisions.
    decisions: Vec<AccessDecision>,
    /// Caller metadata.
    caller: CallerMetadata,
    /// Terminal status.
    status: AuditStatus,
    /// Failure classification, for failures.
    failure_reason: Option<FailureReason>,
    /// Failure detail, for failures.
    failure_detail: Option<String>,
}

impl FinalizedAudit {
    /// Returns the correlation identifier.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Returns the terminal status.
    #[must_use]
    pub const fn status(&self) -> AuditStatus {
        self.status
    }

    /// Returns the failure reason, for failures.
    #[must_use]
    pub const fn failure_reason(&self) -> Option<FailureReason> {
        self.failure_reason
    }

    /// Builds the persisted record under a payload capture mode.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when a payload cannot be canonicalized.
    pub fn to_record(&self, capture: PayloadCapture) -> Result<AuditLogRecord, HashError> {
        let request_hash = self.request_payload.as_ref().map(fingerprint_payload).transpose()?;
        let response_hash = self.response_payload.as_ref().map(fingerprint_payload).transpose()?;
        Ok(AuditLogRecord {
            correlation_id: self.correlation_id.clone(),
            timestamp: self.ended_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
            consumer_id: self.consumer_id.clone(),
            provider_id: self.provider_id.clone(),
            application_id: self.application_id.clone(),
            schema_id: self.schema_id.clone(),
            requested_fields: self.requested_fields.clone(),
            requested_data: self.request_payload.as_ref().and_then(|p| capture.capture(p)),
            response_data: self.response_payload.as_ref().and_then(|p| capture.capture(p)),
            request_hash,
            response_hash,
            status: self.status,
            failure_reason: self.failure_reason,
            failure_detail: self.failure_detail.clone(),
            decisions: self.decisions.clone(),
            caller: self.caller.clone(),
            payload_capture: capture,
        })
    }
}

// ============================================================================
// SECTION: Audit Log Record
// ============================================================================

/// Persisted audit record for one request.
///
/// # Invariants
/// - `failure_reason` is present exactly when `status` is `FAILURE`.
/// - Hashes cover the full payload regardless of `payload_capture`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    /// Correlation identifier for the request.
    pub correlation_id: CorrelationId,
    /// Record timestamp (the request end instant).
    pub timestamp: Timestamp,
    /// Instant the request started.
    pub started_at: Timestamp,
    /// Instant the request ended.
    pub ended_at: Timestamp,
    /// Consumer identity, if resolved.
    #[serde(default)]
    pub consumer_id: Option<ConsumerId>,
    /// Target provider, if known.
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    /// Consumer application, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<ApplicationId>,
    /// Provider schema, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<SchemaId>,
    /// Requested field names in request order.
    #[serde(default)]
    pub requested_fields: Vec<FieldName>,
    /// Captured request payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_data: Option<Value>,
    /// Captured response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    /// Digest of the full request payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_hash: Option<HashDigest>,
    /// Digest of the full response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_hash: Option<HashDigest>,
    /// Terminal status.
    pub status: AuditStatus,
    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
    /// Per-field decisions.
    #[serde(default)]
    pub decisions: Vec<AccessDecision>,
    /// Caller metadata.
    #[serde(default)]
    pub caller: CallerMetadata,
    /// Payload capture mode applied to this record.
    pub payload_capture: PayloadCapture,
}

// ============================================================================
// SECTION: Audit Query Filter
// ============================================================================

/// Default result cap for audit queries.
pub const DEFAULT_AUDIT_QUERY_LIMIT: usize = 100;
/// Hard result cap for audit queries.
pub const MAX_AUDIT_QUERY_LIMIT: usize = 1_000;

/// Filter for audit log queries.
///
/// Time bounds apply to [`AuditLogRecord::timestamp`]: `since` inclusive,
/// `until` exclusive. Results are ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditLogFilter {
    /// Restrict to a consumer.
    #[serde(default)]
    pub consumer_id: Option<ConsumerId>,
    /// Restrict to a provider.
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    /// Restrict to a status.
    #[serde(default)]
    pub status: Option<AuditStatus>,
    /// Lower time bound.
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Upper time bound.
    #[serde(default)]
    pub until: Option<Timestamp>,
    /// Maximum number of records.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AuditLogFilter {
    /// Returns true when the record satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, record: &AuditLogRecord) -> bool {
        if let Some(consumer_id) = &self.consumer_id
            && record.consumer_id.as_ref() != Some(consumer_id)
        {
            return false;
        }
        if let Some(provider_id) = &self.provider_id
            && record.provider_id.as_ref() != Some(provider_id)
        {
            return false;
        }
        if let Some(status) = self.status
            && record.status != status
        {
            return false;
        }
        if let Some(since) = self.since
            && record.timestamp < since
        {
            return false;
        }
        if let Some(until) = self.until
            && record.timestamp >= until
        {
            return false;
        }
        true
    }

    /// Returns the effective limit, clamped to [`MAX_AUDIT_QUERY_LIMIT`].
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_AUDIT_QUERY_LIMIT).clamp(1, MAX_AUDIT_QUERY_LIMIT)
    }
}
