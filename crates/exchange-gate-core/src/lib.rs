// crates/exchange-gate-core/src/lib.rs
// ============================================================================
// Module: Exchange Gate Core Library
// Description: Public API surface for the Exchange Gate core.
// Purpose: Expose policy types, store interfaces, and the decision runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Exchange Gate core decides field-level disclosure for government data
//! exchange requests and shapes the audit trail for every request. It is
//! backend-agnostic: policy facts arrive through store interfaces and audit
//! records leave through sinks implemented by other crates. The core never
//! performs network I/O and never reads wall-clock time on the decision path.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AuditLogQuery;
pub use interfaces::ExpectedVersion;
pub use interfaces::GrantStore;
pub use interfaces::GrantWriter;
pub use interfaces::PolicyStore;
pub use interfaces::PolicyWriter;
pub use interfaces::StoreError;
pub use interfaces::StoredVersion;
pub use runtime::AccessEvaluator;
pub use runtime::AdminError;
pub use runtime::AllowListGrant;
pub use runtime::Clock;
pub use runtime::FieldRegistration;
pub use runtime::InMemoryGrantStore;
pub use runtime::InMemoryPolicyStore;
pub use runtime::MAX_WRITE_ATTEMPTS;
pub use runtime::ManualClock;
pub use runtime::RegistrationSummary;
pub use runtime::SystemClock;
pub use runtime::evaluate_field;
pub use runtime::grant_allow_list;
pub use runtime::prune_expired_entries;
pub use runtime::register_provider_fields;
pub use runtime::replace_consumer_grant;
pub use runtime::revoke_allow_list_entry;
