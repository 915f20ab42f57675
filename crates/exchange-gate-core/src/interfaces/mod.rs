// crates/exchange-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Exchange Gate Interfaces
// Description: Backend-agnostic store traits for policy facts and audit logs.
// Purpose: Define the contracts store backends implement for the decision core.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Decisions read policy facts through [`PolicyStore`] and [`GrantStore`].
//! Administrative operations write through [`PolicyWriter`] and
//! [`GrantWriter`], which replace whole records under an
//! [`ExpectedVersion`] precondition. Implementations must:
//! - return a consistent snapshot per key read (no torn reads);
//! - fail closed: a read error is surfaced as [`StoreError`], never as "absent";
//! - bump the key's version on every successful write, including deletions.
//!
//! Traits are synchronous; async hosts move store calls onto blocking workers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::AuditLogFilter;
use crate::core::AuditLogRecord;
use crate::core::ConsumerGrant;
use crate::core::ConsumerId;
use crate::core::FieldName;
use crate::core::FieldPolicy;
use crate::core::ProviderId;
use crate::core::Versioned;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Policy and grant store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("policy store io error: {0}")]
    Io(String),
    /// Stored data is corrupted or fails integrity checks.
    #[error("policy store corruption: {0}")]
    Corrupt(String),
    /// Stored schema version is incompatible.
    #[error("policy store version mismatch: {0}")]
    VersionMismatch(String),
    /// Input data is invalid.
    #[error("policy store invalid data: {0}")]
    Invalid(String),
    /// Optimistic write precondition failed.
    #[error("policy store conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        /// Key that was written.
        key: String,
        /// Precondition supplied by the writer.
        expected: ExpectedVersion,
        /// Version found in the store, if any.
        actual: StoredVersion,
    },
    /// Backend is temporarily unavailable.
    #[error("policy store unavailable: {0}")]
    Unavailable(String),
    /// Store reported an error.
    #[error("policy store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Returns true for optimistic concurrency conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

// ============================================================================
// SECTION: Versions
// ============================================================================

/// Write precondition for optimistic replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Write unconditionally.
    Any,
    /// Key must hold no live value.
    Absent,
    /// Key must hold a live value at this version.
    Exactly(u64),
}

impl ExpectedVersion {
    /// Returns true when the precondition holds for the stored state.
    #[must_use]
    pub const fn admits(self, stored: StoredVersion) -> bool {
        match (self, stored) {
            (Self::Any, _) | (Self::Absent, StoredVersion::Absent | StoredVersion::Deleted(_)) => {
                true
            }
            (Self::Exactly(expected), StoredVersion::Live(actual)) => expected == actual,
            _ => false,
        }
    }

    /// Returns the precondition matching a previously read record.
    #[must_use]
    pub fn of<T>(record: Option<&Versioned<T>>) -> Self {
        record.map_or(Self::Absent, |record| Self::Exactly(record.version))
    }
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Absent => f.write_str("absent"),
            Self::Exactly(version) => write!(f, "v{version}"),
        }
    }
}

/// Version state of a key as seen by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredVersion {
    /// Key was never written.
    Absent,
    /// Key holds a tombstone at this version.
    Deleted(u64),
    /// Key holds a live value at this version.
    Live(u64),
}

impl StoredVersion {
    /// Returns the last written version, zero for never-written keys.
    #[must_use]
    pub const fn last_version(self) -> u64 {
        match self {
            Self::Absent => 0,
            Self::Deleted(version) | Self::Live(version) => version,
        }
    }
}

impl std::fmt::Display for StoredVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Deleted(version) => write!(f, "deleted at v{version}"),
            Self::Live(version) => write!(f, "v{version}"),
        }
    }
}

// ============================================================================
// SECTION: Read Interfaces
// ============================================================================

/// Read access to field policies.
pub trait PolicyStore: Send + Sync {
    /// Loads the policy for a field with its version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_field_policy(
        &self,
        field_name: &FieldName,
    ) -> Result<Option<Versioned<FieldPolicy>>, StoreError>;

    /// Loads the policy for a field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn field_policy(&self, field_name: &FieldName) -> Result<Option<FieldPolicy>, StoreError> {
        Ok(self.load_field_policy(field_name)?.map(Versioned::into_value))
    }
}

/// Read access to consumer grants.
pub trait GrantStore: Send + Sync {
    /// Loads the grant for a consumer with its version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_consumer_grant(
        &self,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Versioned<ConsumerGrant>>, StoreError>;

    /// Loads the grant for a consumer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn consumer_grant(&self, consumer_id: &ConsumerId) -> Result<Option<ConsumerGrant>, StoreError> {
        Ok(self.load_consumer_grant(consumer_id)?.map(Versioned::into_value))
    }
}

// ============================================================================
// SECTION: Write Interfaces
// ============================================================================

/// Write access to field policies.
pub trait PolicyWriter: PolicyStore {
    /// Replaces the policy for `policy.field_name`, returning the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `expected` does not hold.
    fn put_field_policy(
        &self,
        policy: FieldPolicy,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;

    /// Deletes the policy for a field, returning true when one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `expected` does not hold.
    fn delete_field_policy(
        &self,
        field_name: &FieldName,
        expected: ExpectedVersion,
    ) -> Result<bool, StoreError>;

    /// Lists live policies ordered by field name, optionally for one provider.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_field_policies(
        &self,
        provider: Option<&ProviderId>,
    ) -> Result<Vec<Versioned<FieldPolicy>>, StoreError>;
}

/// Write access to consumer grants.
pub trait GrantWriter: GrantStore {
    /// Replaces the grant for `grant.consumer_id`, returning the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `expected` does not hold.
    fn put_consumer_grant(
        &self,
        grant: ConsumerGrant,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Audit Queries
// ============================================================================

/// Read access to recorded audit logs.
pub trait AuditLogQuery: Send + Sync {
    /// Returns records matching the filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn query_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogRecord>, StoreError>;
}
