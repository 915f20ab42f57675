// crates/exchange-gate-core/src/runtime/admin.rs
// ============================================================================
// Module: Exchange Gate Administrative Operations
// Description: Allow-list grants, field registration, and grant replacement.
// Purpose: Apply approval-flow writes with per-key optimistic concurrency.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Administrative writes are read-modify-write cycles over a single key. Each
//! cycle reads the versioned record, applies the change, and writes it back
//! with [`ExpectedVersion::Exactly`]. A conflicting concurrent writer causes a
//! re-read and retry, bounded by [`MAX_WRITE_ATTEMPTS`]. Unrelated keys never
//! contend; there is no store-wide lock.
//!
//! Multi-field operations are atomic per field, not across fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::AccessControlType;
use crate::core::AllowList;
use crate::core::ConsumerGrant;
use crate::core::ConsumerId;
use crate::core::DurationError;
use crate::core::FieldName;
use crate::core::FieldPolicy;
use crate::core::GrantDuration;
use crate::core::ProviderId;
use crate::core::Timestamp;
use crate::interfaces::ExpectedVersion;
use crate::interfaces::GrantWriter;
use crate::interfaces::PolicyWriter;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum read-modify-write attempts per key before giving up.
pub const MAX_WRITE_ATTEMPTS: usize = 8;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by administrative operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Grant duration could not be parsed or applied.
    #[error(transparent)]
    Duration(#[from] DurationError),
    /// Field has no registered policy.
    #[error("unknown field: {0}")]
    UnknownField(FieldName),
    /// Registration input lists a field twice.
    #[error("duplicate field in registration: {0}")]
    DuplicateField(FieldName),
    /// Field is registered to a different provider.
    #[error("field {field} belongs to provider {actual}, not {expected}")]
    ProviderMismatch {
        /// Field being registered.
        field: FieldName,
        /// Provider performing the registration.
        expected: ProviderId,
        /// Provider currently owning the field.
        actual: ProviderId,
    },
    /// Concurrent writers kept winning the race for a key.
    #[error("write contention on {0}; retry later")]
    Contention(String),
}

// ============================================================================
// SECTION: Allow-List Operations
// ============================================================================

/// Result of granting one field to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListGrant {
    /// Field the entry was written to.
    pub field_name: FieldName,
    /// Consumer the entry applies to.
    pub consumer_id: ConsumerId,
    /// Expiry time written to the entry.
    pub expiry_time: Timestamp,
    /// Policy version after the write.
    pub version: u64,
}

/// Adds or extends allow-list entries for a consumer on several fields.
///
/// Every field must already have a policy; all are checked before any write.
///
/// # Errors
///
/// Returns [`AdminError::UnknownField`] when a field has no policy, or a
/// store, duration, or contention error.
pub fn grant_allow_list<S: PolicyWriter + ?Sized>(
    store: &S,
    field_names: &[FieldName],
    consumer_id: &ConsumerId,
    duration: &GrantDuration,
    now: Timestamp,
) -> Result<Vec<AllowListGrant>, AdminError> {
    let expiry_time = duration.expiry_from(now)?;
    for field_name in field_names {
        if store.load_field_policy(field_name)?.is_none() {
            return Err(AdminError::UnknownField(field_name.clone()));
        }
    }
    let mut grants = Vec::with_capacity(field_names.len());
    for field_name in field_names {
        let version = update_policy(store, field_name, |policy| {
            policy.allow_list.upsert(consumer_id.clone(), expiry_time, now);
            true
        })?;
        grants.push(AllowListGrant {
            field_name: field_name.clone(),
            consumer_id: consumer_id.clone(),
            expiry_time,
            version,
        });
    }
    Ok(grants)
}

/// Removes a consumer's allow-list entry from a field.
///
/// Returns false when the consumer had no entry.
///
/// # Errors
///
/// Returns [`AdminError::UnknownField`] when the field has no policy, or a
/// store or contention error.
pub fn revoke_allow_list_entry<S: PolicyWriter + ?Sized>(
    store: &S,
    field_name: &FieldName,
    consumer_id: &ConsumerId,
) -> Result<bool, AdminError> {
    let mut removed = false;
    update_policy(store, field_name, |policy| {
        removed = policy.allow_list.remove(consumer_id);
        removed
    })?;
    Ok(removed)
}

/// Deletes expired allow-list entries from a field, returning how many were removed.
///
/// Expired entries already deny on read; pruning only reclaims space.
///
/// # Errors
///
/// Returns [`AdminError::UnknownField`] when the field has no policy, or a
/// store or contention error.
pub fn prune_expired_entries<S: PolicyWriter + ?Sized>(
    store: &S,
    field_name: &FieldName,
    now: Timestamp,
) -> Result<usize, AdminError> {
    let mut pruned = 0;
    update_policy(store, field_name, |policy| {
        pruned = policy.allow_list.prune_expired(now);
        pruned > 0
    })?;
    Ok(pruned)
}

/// Runs a read-modify-write cycle on one policy.
///
/// `change` returns false when it made no modification, which skips the write.
fn update_policy<S, F>(store: &S, field_name: &FieldName, mut change: F) -> Result<u64, AdminError>
where
    S: PolicyWriter + ?Sized,
    F: FnMut(&mut FieldPolicy) -> bool,
{
    for _ in 0 .. MAX_WRITE_ATTEMPTS {
        let Some(current) = store.load_field_policy(field_name)? else {
            return Err(AdminError::UnknownField(field_name.clone()));
        };
        let version = current.version;
        let mut policy = current.value;
        if !change(&mut policy) {
            return Ok(version);
        }
        match store.put_field_policy(policy, ExpectedVersion::Exactly(version)) {
            Ok(next) => return Ok(next),
            Err(err) if err.is_conflict() => {}
            Err(err) => return Err(err.into()),
        }
    }
    Err(AdminError::Contention(field_name.to_string()))
}

// ============================================================================
// SECTION: Field Registration
// ============================================================================

/// Field attributes supplied when a provider registers its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRegistration {
    /// Field name.
    pub field_name: FieldName,
    /// Administrative owner.
    pub owner: String,
    /// Whether owner consent is expected.
    #[serde(default)]
    pub consent_required: bool,
    /// Public or restricted classification.
    #[serde(default)]
    pub access_control_type: AccessControlType,
    /// Free-form attributes.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Counts of changes applied by a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationSummary {
    /// Policies created.
    pub created: usize,
    /// Policies updated in place.
    pub updated: usize,
    /// Policies removed because the provider no longer lists them.
    pub removed: usize,
}

/// Replaces the provider's registered fields with `fields`.
///
/// Existing policies keep their allow-lists; only their attributes change.
/// Policies the provider owned but no longer lists are removed. A field
/// registered to another provider is rejected before any write.
///
/// # Errors
///
/// Returns [`AdminError::DuplicateField`], [`AdminError::ProviderMismatch`],
/// or a store or contention error.
pub fn register_provider_fields<S: PolicyWriter + ?Sized>(
    store: &S,
    provider: &ProviderId,
    fields: Vec<FieldRegistration>,
) -> Result<RegistrationSummary, AdminError> {
    let mut listed = BTreeSet::new();
    for field in &fields {
        if !listed.insert(field.field_name.clone()) {
            return Err(AdminError::DuplicateField(field.field_name.clone()));
        }
        if let Some(existing) = store.load_field_policy(&field.field_name)?
            && &existing.value.provider != provider
        {
            return Err(AdminError::ProviderMismatch {
                field: field.field_name.clone(),
                expected: provider.clone(),
                actual: existing.value.provider,
            });
        }
    }

    let mut summary = RegistrationSummary::default();
    for field in fields {
        if register_field(store, provider, field)? {
            summary.created += 1;
        } else {
            summary.updated += 1;
        }
    }

    for stale in store.list_field_policies(Some(provider))? {
        if listed.contains(&stale.value.field_name) {
            continue;
        }
        match store
            .delete_field_policy(&stale.value.field_name, ExpectedVersion::Exactly(stale.version))
        {
            Ok(true) => summary.removed += 1,
            Ok(false) => {}
            Err(err) if err.is_conflict() => {
                return Err(AdminError::Contention(stale.value.field_name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(summary)
}

/// Writes one registration, returning true when the policy was created.
fn register_field<S: PolicyWriter + ?Sized>(
    store: &S,
    provider: &ProviderId,
    field: FieldRegistration,
) -> Result<bool, AdminError> {
    for _ in 0 .. MAX_WRITE_ATTEMPTS {
        let current = store.load_field_policy(&field.field_name)?;
        let expected = ExpectedVersion::of(current.as_ref());
        let created = current.is_none();
        let allow_list = current.map_or_else(AllowList::new, |record| record.value.allow_list);
        let policy = FieldPolicy {
            field_name: field.field_name.clone(),
            owner: field.owner.clone(),
            provider: provider.clone(),
            consent_required: field.consent_required,
            access_control_type: field.access_control_type,
            allow_list,
            metadata: field.metadata.clone(),
        };
        match store.put_field_policy(policy, expected) {
            Ok(_) => return Ok(created),
            Err(err) if err.is_conflict() => {}
            Err(err) => return Err(err.into()),
        }
    }
    Err(AdminError::Contention(field.field_name.to_string()))
}

// ============================================================================
// SECTION: Consumer Grants
// ============================================================================

/// Replaces a consumer's approved field set, returning the new version.
///
/// # Errors
///
/// Returns [`AdminError::Store`] when the write fails or `expected` does not hold.
pub fn replace_consumer_grant<S: GrantWriter + ?Sized>(
    store: &S,
    grant: ConsumerGrant,
    expected: ExpectedVersion,
) -> Result<u64, AdminError> {
    Ok(store.put_consumer_grant(grant, expected)?)
}
