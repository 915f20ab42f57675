// crates/exchange-gate-service/src/gate.rs
// ============================================================================
// Module: Access Gate
// Description: Request orchestration around the access evaluator.
// Purpose: Decide, disclose, and audit every exchange request exactly once.
// Dependencies: exchange-gate-audit, exchange-gate-config, exchange-gate-core
// ============================================================================

//! ## Overview
//! [`AccessGate`] runs one exchange request end to end:
//! 1. open an [`AuditScope`] under a fresh correlation identifier;
//! 2. validate the request and record its identity and payload;
//! 3. evaluate every requested field and record the decisions;
//! 4. compose the verdicts under the configured [`DisclosureMode`];
//! 5. call the [`Downstream`] provider for the cleared fields;
//! 6. finalize the scope with the outcome.
//!
//! Each step that can fail finishes the scope with a matching failure
//! reason before returning, and the scope's `Drop` covers everything else
//! (panics and dropped futures). Policy denials are returned as values;
//! store and provider failures are returned as [`GateError`]. Audit
//! submission failures are reported to the audit monitor and never change
//! the result returned to the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use exchange_gate_audit::AuditHandle;
use exchange_gate_audit::AuditScope;
use exchange_gate_config::DisclosureMode;
use exchange_gate_core::AccessDecision;
use exchange_gate_core::AccessEvaluator;
use exchange_gate_core::ApplicationId;
use exchange_gate_core::AuditContextError;
use exchange_gate_core::CallerMetadata;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::CorrelationId;
use exchange_gate_core::DecisionSummary;
use exchange_gate_core::FailureReason;
use exchange_gate_core::FieldName;
use exchange_gate_core::GrantStore;
use exchange_gate_core::PolicyStore;
use exchange_gate_core::ProviderId;
use exchange_gate_core::SchemaId;
use exchange_gate_core::StoreError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::correlation::CorrelationIdGenerator;
use crate::correlation::sanitize_client_trace_id;
use crate::downstream::Downstream;
use crate::downstream::DownstreamError;
use crate::downstream::DownstreamRequest;
use crate::telemetry::DecisionMetricEvent;
use crate::telemetry::GateMetrics;
use crate::telemetry::NoopMetrics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of fields in one request.
pub const MAX_REQUEST_FIELDS: usize = 256;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Inbound exchange request.
///
/// The consumer identity is trusted input resolved by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    /// Requesting consumer.
    pub consumer_id: ConsumerId,
    /// Target provider.
    pub provider_id: ProviderId,
    /// Requested fields, in request order.
    pub fields: Vec<FieldName>,
    /// Consumer application, if supplied.
    pub application_id: Option<ApplicationId>,
    /// Provider schema, if supplied.
    pub schema_id: Option<SchemaId>,
    /// Raw request payload, if any.
    pub payload: Option<Value>,
    /// Caller transport metadata; `client_trace_id` is unsanitized here.
    pub caller: CallerMetadata,
}

impl AccessRequest {
    /// Creates a request for `fields`.
    #[must_use]
    pub fn new(
        consumer_id: impl Into<ConsumerId>,
        provider_id: impl Into<ProviderId>,
        fields: impl IntoIterator<Item = impl Into<FieldName>>,
    ) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            provider_id: provider_id.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            application_id: None,
            schema_id: None,
            payload: None,
            caller: CallerMetadata::default(),
        }
    }

    /// Attaches the raw request payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attaches application and schema identifiers.
    #[must_use]
    pub fn with_application(
        mut self,
        application_id: Option<ApplicationId>,
        schema_id: Option<SchemaId>,
    ) -> Self {
        self.application_id = application_id;
        self.schema_id = schema_id;
        self
    }

    /// Attaches caller transport metadata.
    #[must_use]
    pub fn with_caller(mut self, caller: CallerMetadata) -> Self {
        self.caller = caller;
        self
    }

    /// Checks request shape limits.
    fn validate(&self) -> Result<(), String> {
        if self.consumer_id.as_str().trim().is_empty() {
            return Err("consumer id must be non-empty".to_string());
        }
        if self.provider_id.as_str().trim().is_empty() {
            return Err("provider id must be non-empty".to_string());
        }
        if self.fields.is_empty() {
            return Err("request must name at least one field".to_string());
        }
        if self.fields.len() > MAX_REQUEST_FIELDS {
            return Err(format!("request exceeds {MAX_REQUEST_FIELDS} fields"));
        }
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field) {
                return Err(format!("field {field} requested more than once"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Result of the decision phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionReport {
    /// Correlation identifier of the audited request.
    pub correlation_id: CorrelationId,
    /// Per-field decisions in request order.
    pub decisions: Vec<AccessDecision>,
    /// Aggregate view of the decisions.
    pub summary: DecisionSummary,
    /// Fields cleared for disclosure under the disclosure mode.
    pub cleared_fields: Vec<FieldName>,
}

impl DecisionReport {
    /// Returns true when no field may be disclosed.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.cleared_fields.is_empty()
    }

    /// Returns requested fields that were not cleared.
    #[must_use]
    pub fn withheld_fields(&self) -> Vec<FieldName> {
        self.decisions
            .iter()
            .filter(|decision| !self.cleared_fields.contains(&decision.field_name))
            .map(|decision| decision.field_name.clone())
            .collect()
    }

    /// Returns a short failure detail for denied requests.
    fn denial_detail(&self) -> String {
        let denied = self.decisions.iter().filter(|decision| !decision.is_allowed()).count();
        format!("{denied} of {} requested field(s) denied", self.decisions.len())
    }
}

/// Disclosure decided for an exchange request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "disclosure", rename_all = "snake_case")]
pub enum Disclosure {
    /// Provider data was returned for the cleared fields.
    Granted {
        /// Provider response payload.
        payload: Value,
        /// Requested fields that were not disclosed.
        withheld: Vec<FieldName>,
    },
    /// Nothing was disclosed.
    Denied,
}

/// Outcome of an exchange request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExchangeOutcome {
    /// Decision phase result.
    pub report: DecisionReport,
    /// Disclosure returned to the consumer.
    pub disclosure: Disclosure,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gate failures; every variant has already been audited.
#[derive(Debug, Error)]
pub enum GateError {
    /// Request failed shape validation.
    #[error("invalid request {correlation_id}: {message}")]
    InvalidRequest {
        /// Correlation identifier of the audited request.
        correlation_id: CorrelationId,
        /// Validation failure detail.
        message: String,
    },
    /// Policy or grant store failed; retryable and never a denial.
    #[error("store failure for request {correlation_id}: {source}")]
    Store {
        /// Correlation identifier of the audited request.
        correlation_id: CorrelationId,
        /// Underlying store error.
        source: StoreError,
    },
    /// Provider call failed after the request was allowed.
    #[error("provider failure for request {correlation_id}: {source}")]
    Downstream {
        /// Correlation identifier of the audited request.
        correlation_id: CorrelationId,
        /// Underlying provider error.
        source: DownstreamError,
    },
    /// An audit phase was written out of order.
    #[error("audit contract violation for request {correlation_id}: {source}")]
    Contract {
        /// Correlation identifier of the audited request.
        correlation_id: CorrelationId,
        /// Underlying phase error.
        source: AuditContextError,
    },
}

impl GateError {
    /// Returns the correlation identifier of the audited request.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        match self {
            Self::InvalidRequest {
                correlation_id, ..
            }
            | Self::Store {
                correlation_id, ..
            }
            | Self::Downstream {
                correlation_id, ..
            }
            | Self::Contract {
                correlation_id, ..
            } => correlation_id,
        }
    }

    /// Returns true when repeating the request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store { .. }
                | Self::Downstream {
                    source: DownstreamError::Unavailable(_),
                    ..
                }
        )
    }

    /// Returns the audit failure reason for this error.
    #[must_use]
    pub const fn failure_reason(&self) -> FailureReason {
        match self {
            Self::InvalidRequest { .. } => FailureReason::InvalidRequest,
            Self::Store { .. } => FailureReason::StoreError,
            Self::Downstream { .. } => FailureReason::DownstreamError,
            Self::Contract { .. } => FailureReason::Internal,
        }
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Orchestrates decision, disclosure, and audit for exchange requests.
pub struct AccessGate {
    /// Field policy source.
    policies: Arc<dyn PolicyStore>,
    /// Consumer grant source.
    grants: Arc<dyn GrantStore>,
    /// Audit submission handle.
    audit: AuditHandle,
    /// Correlation identifier source.
    correlation: CorrelationIdGenerator,
    /// Verdict composition rule.
    disclosure: DisclosureMode,
    /// Decision telemetry.
    metrics: Arc<dyn GateMetrics>,
}

impl AccessGate {
    /// Creates a gate with all-or-nothing disclosure and no metrics.
    #[must_use]
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        grants: Arc<dyn GrantStore>,
        audit: AuditHandle,
    ) -> Self {
        Self {
            policies,
            grants,
            audit,
            correlation: CorrelationIdGenerator::default(),
            disclosure: DisclosureMode::default(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Sets the verdict composition rule.
    #[must_use]
    pub const fn with_disclosure(mut self, disclosure: DisclosureMode) -> Self {
        self.disclosure = disclosure;
        self
    }

    /// Sets the correlation identifier source.
    #[must_use]
    pub fn with_correlation(mut self, correlation: CorrelationIdGenerator) -> Self {
        self.correlation = correlation;
        self
    }

    /// Sets the decision telemetry sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn GateMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the verdict composition rule.
    #[must_use]
    pub const fn disclosure_mode(&self) -> DisclosureMode {
        self.disclosure
    }

    /// Runs the decision phase only and audits the request.
    ///
    /// The audit records `SUCCESS` when at least one field is cleared and
    /// `FAILURE` with reason `policy_denied` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] for invalid requests and store failures.
    pub fn decide(&self, request: &AccessRequest) -> Result<DecisionReport, GateError> {
        let mut scope = self.open_scope();
        let report = match self.decision_phase(&mut scope, request) {
            Ok(report) => report,
            Err(err) => return Err(fail_scope(scope, err)),
        };
        if report.is_denied() {
            let _ = scope.fail(FailureReason::PolicyDenied, Some(report.denial_detail()));
        } else {
            let _ = scope.succeed();
        }
        Ok(report)
    }

    /// Runs a full exchange: decide, call the provider, and audit.
    ///
    /// Dropping the returned future before it completes records the
    /// request as `FAILURE` with reason `cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] for invalid requests, store failures, and
    /// provider failures. Policy denials are returned as
    /// [`Disclosure::Denied`].
    pub async fn exchange(
        &self,
        request: &AccessRequest,
        downstream: &dyn Downstream,
    ) -> Result<ExchangeOutcome, GateError> {
        let mut scope = self.open_scope();
        let report = match self.decision_phase(&mut scope, request) {
            Ok(report) => report,
            Err(err) => return Err(fail_scope(scope, err)),
        };
        if report.is_denied() {
            let _ = scope.fail(FailureReason::PolicyDenied, Some(report.denial_detail()));
            return Ok(ExchangeOutcome {
                report,
                disclosure: Disclosure::Denied,
            });
        }

        let downstream_request = DownstreamRequest {
            correlation_id: report.correlation_id.clone(),
            consumer_id: request.consumer_id.clone(),
            provider_id: request.provider_id.clone(),
            fields: report.cleared_fields.clone(),
            payload: request.payload.clone(),
        };
        match downstream.fetch(&downstream_request).await {
            Ok(payload) => {
                if let Err(source) = scope.context_mut().record_downstream_response(payload.clone())
                {
                    return Err(fail_scope(
                        scope,
                        GateError::Contract {
                            correlation_id: report.correlation_id,
                            source,
                        },
                    ));
                }
                let _ = scope.succeed();
                let withheld = report.withheld_fields();
                Ok(ExchangeOutcome {
                    report,
                    disclosure: Disclosure::Granted {
                        payload,
                        withheld,
                    },
                })
            }
            Err(source) => {
                let _ = scope.context_mut().record_downstream_failure(source.to_string());
                let _ = scope.fail(FailureReason::DownstreamError, None);
                Err(GateError::Downstream {
                    correlation_id: report.correlation_id,
                    source,
                })
            }
        }
    }

    /// Opens an audit scope under a fresh correlation identifier.
    fn open_scope(&self) -> AuditScope {
        self.audit.open_scope(self.correlation.issue())
    }

    /// Validates, evaluates, and records the decision phase on `scope`.
    fn decision_phase(
        &self,
        scope: &mut AuditScope,
        request: &AccessRequest,
    ) -> Result<DecisionReport, GateError> {
        let correlation_id = scope.correlation_id().clone();
        let context = scope.context_mut();
        context.set_identity(request.consumer_id.clone(), request.provider_id.clone());
        context.set_application(request.application_id.clone(), request.schema_id.clone());
        let trace = sanitize_client_trace_id(request.caller.client_trace_id.as_deref());
        context.set_caller(CallerMetadata {
            client_trace_id: trace.clone().ok().flatten(),
            ..request.caller.clone()
        });
        context.record_request(request.fields.clone(), request.payload.clone()).map_err(
            |source| GateError::Contract {
                correlation_id: correlation_id.clone(),
                source,
            },
        )?;
        if let Err(rejection) = trace {
            return Err(GateError::InvalidRequest {
                correlation_id,
                message: format!("client trace id rejected: {rejection}"),
            });
        }
        request.validate().map_err(|message| GateError::InvalidRequest {
            correlation_id: correlation_id.clone(),
            message,
        })?;

        let started = Instant::now();
        let now = self.audit.clock().now();
        let evaluator = AccessEvaluator::new(self.policies.as_ref(), self.grants.as_ref());
        let decisions = evaluator
            .evaluate_fields(&request.consumer_id, &request.provider_id, &request.fields, now)
            .map_err(|source| GateError::Store {
                correlation_id: correlation_id.clone(),
                source,
            })?;
        self.metrics.record_decision_latency(started.elapsed());
        for decision in &decisions {
            self.metrics.record_decision(&DecisionMetricEvent::from_decision(decision));
        }
        scope.context_mut().record_decisions(decisions.iter().cloned());

        let summary = DecisionSummary::from_decisions(&decisions);
        let cleared_fields = match self.disclosure {
            DisclosureMode::AllOrNothing if !summary.all_allowed() => Vec::new(),
            DisclosureMode::AllOrNothing | DisclosureMode::AllowedOnly => {
                summary.allowed_fields.clone()
            }
        };
        Ok(DecisionReport {
            correlation_id,
            decisions,
            summary,
            cleared_fields,
        })
    }
}

/// Finishes `scope` as a failure matching `err` and returns `err`.
fn fail_scope(scope: AuditScope, err: GateError) -> GateError {
    let _ = scope.fail(err.failure_reason(), Some(err.to_string()));
    err
}
