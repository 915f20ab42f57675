// crates/exchange-gate-core/src/core/decision.rs
// ============================================================================
// Module: Exchange Gate Decisions
// Description: Per-field access outcomes and request-level decision summaries.
// Purpose: Give every allow or deny a stable, serializable reason code.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`AccessDecision`] is the answer for one `(consumer, provider, field)`
//! triple. A deny always carries exactly one [`DenyReason`]; an allow carries
//! none. [`DecisionSummary`] folds a request's decisions into the aggregate
//! flags consumers see in exchange responses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ConsumerId;
use crate::core::identifiers::FieldName;
use crate::core::identifiers::ProviderId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Reason a field was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Consumer grant does not list the field, or the field has no policy.
    NotGranted,
    /// Field is restricted and the consumer has no allow-list entry.
    RestrictedNoEntry,
    /// Consumer's allow-list entry has passed its expiry time.
    Expired,
    /// Owner consent is required and unmet.
    ///
    /// Reserved: the evaluator treats consent as informational and never emits it.
    ConsentRequiredUnmet,
}

impl DenyReason {
    /// Returns the stable reason code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotGranted => "not_granted",
            Self::RestrictedNoEntry => "restricted_no_entry",
            Self::Expired => "expired",
            Self::ConsentRequiredUnmet => "consent_required_unmet",
        }
    }
}

/// Allow or deny with its reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum AccessOutcome {
    /// Field may be disclosed.
    Allow,
    /// Field must be withheld.
    Deny(DenyReason),
}

impl AccessOutcome {
    /// Returns true for [`AccessOutcome::Allow`].
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns the deny reason, if any.
    #[must_use]
    pub const fn deny_reason(self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason),
        }
    }

    /// Returns the reason code, `ok` for allows.
    #[must_use]
    pub const fn reason_code(self) -> &'static str {
        match self {
            Self::Allow => "ok",
            Self::Deny(reason) => reason.as_str(),
        }
    }
}

// ============================================================================
// SECTION: Access Decision
// ============================================================================

/// Decision for one requested field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Consumer the decision was made for.
    pub consumer_id: ConsumerId,
    /// Provider addressed by the request.
    pub provider_id: ProviderId,
    /// Field the decision applies to.
    pub field_name: FieldName,
    /// Allow or deny with reason.
    pub outcome: AccessOutcome,
    /// Consent flag from the field policy; false when not granted or unpoliced.
    pub consent_required: bool,
    /// Instant the decision was evaluated at.
    pub evaluated_at: Timestamp,
}

impl AccessDecision {
    /// Returns true when the field may be disclosed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        self.outcome.is_allowed()
    }
}

// ============================================================================
// SECTION: Decision Summary
// ============================================================================

/// Aggregate view of a request's field decisions.
///
/// # Invariants
/// - Every requested field appears in exactly one of `allowed_fields`,
///   `unauthorized_fields`, or `expired_fields`.
/// - `consent_required_fields` is a subset of `allowed_fields`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionSummary {
    /// Fields that may be disclosed.
    pub allowed_fields: Vec<FieldName>,
    /// Fields denied because the consumer was never authorized.
    pub unauthorized_fields: Vec<FieldName>,
    /// Fields denied because the consumer's allow-list entry expired.
    pub expired_fields: Vec<FieldName>,
    /// Allowed fields whose policy asks for owner consent.
    pub consent_required_fields: Vec<FieldName>,
    /// True when no field was denied as unauthorized.
    pub app_authorized: bool,
    /// True when at least one field was denied as expired.
    pub app_access_expired: bool,
    /// True when at least one allowed field asks for owner consent.
    pub app_requires_owner_consent: bool,
}

impl DecisionSummary {
    /// Folds decisions in request order.
    #[must_use]
    pub fn from_decisions(decisions: &[AccessDecision]) -> Self {
        let mut summary = Self::default();
        for decision in decisions {
            match decision.outcome {
                AccessOutcome::Allow => {
                    summary.allowed_fields.push(decision.field_name.clone());
                    if decision.consent_required {
                        summary.consent_required_fields.push(decision.field_name.clone());
                    }
                }
                AccessOutcome::Deny(DenyReason::Expired) => {
                    summary.expired_fields.push(decision.field_name.clone());
                }
                AccessOutcome::Deny(_) => {
                    summary.unauthorized_fields.push(decision.field_name.clone());
                }
            }
        }
        summary.app_authorized = summary.unauthorized_fields.is_empty();
        summary.app_access_expired = !summary.expired_fields.is_empty();
        summary.app_requires_owner_consent = !summary.consent_required_fields.is_empty();
        summary
    }

    /// Returns true when every requested field was allowed.
    #[must_use]
    pub fn all_allowed(&self) -> bool {
        self.unauthorized_fields.is_empty() && self.expired_fields.is_empty()
    }
}
