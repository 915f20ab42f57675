// crates/exchange-gate-core/src/runtime/evaluator.rs
// ============================================================================
// Module: Exchange Gate Access Evaluator
// Description: Field-level allow/deny evaluation over policy and grant facts.
// Purpose: Produce deterministic per-field decisions with explicit reason codes.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`evaluate_field`] is a pure function of a consumer grant, a field policy,
//! and `now`. Rules are applied in order:
//! 1. field not in the consumer's approved fields: deny `not_granted`;
//! 2. no policy for the field: deny `not_granted` (fail closed);
//! 3. public field: allow, without consulting the allow-list;
//! 4. restricted field: allow for an active entry, deny `expired` when only
//!    expired entries match, deny `restricted_no_entry` otherwise.
//!
//! The consent flag is copied onto granted decisions but never gates them.
//! [`AccessEvaluator`] wraps the pure function with store reads and surfaces
//! store failures as errors rather than denials.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::AccessControlType;
use crate::core::AccessDecision;
use crate::core::AccessOutcome;
use crate::core::AllowListMatch;
use crate::core::ConsumerGrant;
use crate::core::ConsumerId;
use crate::core::DenyReason;
use crate::core::FieldName;
use crate::core::FieldPolicy;
use crate::core::ProviderId;
use crate::core::Timestamp;
use crate::interfaces::GrantStore;
use crate::interfaces::PolicyStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Pure Evaluation
// ============================================================================

/// Evaluates one field against already-loaded facts.
#[must_use]
pub fn evaluate_field(
    grant: Option<&ConsumerGrant>,
    policy: Option<&FieldPolicy>,
    consumer_id: &ConsumerId,
    provider_id: &ProviderId,
    field_name: &FieldName,
    now: Timestamp,
) -> AccessDecision {
    let granted = grant.is_some_and(|grant| grant.approves(field_name));
    let outcome = if granted {
        decide_granted(policy, consumer_id, now)
    } else {
        AccessOutcome::Deny(DenyReason::NotGranted)
    };
    AccessDecision {
        consumer_id: consumer_id.clone(),
        provider_id: provider_id.clone(),
        field_name: field_name.clone(),
        outcome,
        consent_required: granted && policy.is_some_and(|policy| policy.consent_required),
        evaluated_at: now,
    }
}

/// Applies the policy rules to a granted field.
fn decide_granted(
    policy: Option<&FieldPolicy>,
    consumer_id: &ConsumerId,
    now: Timestamp,
) -> AccessOutcome {
    let Some(policy) = policy else {
        return AccessOutcome::Deny(DenyReason::NotGranted);
    };
    match policy.access_control_type {
        AccessControlType::Public => AccessOutcome::Allow,
        AccessControlType::Restricted => match policy.allow_list.lookup(consumer_id, now) {
            AllowListMatch::Active(_) => AccessOutcome::Allow,
            AllowListMatch::Expired(_) => AccessOutcome::Deny(DenyReason::Expired),
            AllowListMatch::Absent => AccessOutcome::Deny(DenyReason::RestrictedNoEntry),
        },
    }
}

// ============================================================================
// SECTION: Store-Backed Evaluation
// ============================================================================

/// Evaluator reading facts from policy and grant stores.
pub struct AccessEvaluator<'a, P: PolicyStore + ?Sized, G: GrantStore + ?Sized> {
    /// Field policy source.
    policies: &'a P,
    /// Consumer grant source.
    grants: &'a G,
}

impl<'a, P: PolicyStore + ?Sized, G: GrantStore + ?Sized> AccessEvaluator<'a, P, G> {
    /// Creates an evaluator over the given stores.
    #[must_use]
    pub const fn new(policies: &'a P, grants: &'a G) -> Self {
        Self {
            policies,
            grants,
        }
    }

    /// Evaluates a single field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a policy or grant read fails.
    pub fn evaluate(
        &self,
        consumer_id: &ConsumerId,
        provider_id: &ProviderId,
        field_name: &FieldName,
        now: Timestamp,
    ) -> Result<AccessDecision, StoreError> {
        let grant = self.grants.consumer_grant(consumer_id)?;
        self.evaluate_with_grant(grant.as_ref(), consumer_id, provider_id, field_name, now)
    }

    /// Evaluates every requested field in order.
    ///
    /// The consumer grant is read once and shared by all fields. Fields the
    /// grant does not list are denied without reading their policy.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] encountered; no partial result is returned.
    pub fn evaluate_fields(
        &self,
        consumer_id: &ConsumerId,
        provider_id: &ProviderId,
        field_names: &[FieldName],
        now: Timestamp,
    ) -> Result<Vec<AccessDecision>, StoreError> {
        let grant = self.grants.consumer_grant(consumer_id)?;
        field_names
            .iter()
            .map(|field_name| {
                self.evaluate_with_grant(grant.as_ref(), consumer_id, provider_id, field_name, now)
            })
            .collect()
    }

    /// Reads the policy when needed and applies the rules.
    fn evaluate_with_grant(
        &self,
        grant: Option<&ConsumerGrant>,
        consumer_id: &ConsumerId,
        provider_id: &ProviderId,
        field_name: &FieldName,
        now: Timestamp,
    ) -> Result<AccessDecision, StoreError> {
        if !grant.is_some_and(|grant| grant.approves(field_name)) {
            return Ok(evaluate_field(grant, None, consumer_id, provider_id, field_name, now));
        }
        let policy = self.policies.field_policy(field_name)?;
        Ok(evaluate_field(grant, policy.as_ref(), consumer_id, provider_id, field_name, now))
    }
}
