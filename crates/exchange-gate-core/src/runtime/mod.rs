// crates/exchange-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Exchange Gate Runtime
// Description: Access evaluation, in-memory stores, clocks, and admin writes.
// Purpose: Execute field decisions and approval-flow writes against store interfaces.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the decision path and the administrative write
//! path. Every host (service, CLI, tests) calls into the same evaluator so
//! reason codes cannot drift between surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod admin;
pub mod clock;
pub mod evaluator;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use admin::AdminError;
pub use admin::AllowListGrant;
pub use admin::FieldRegistration;
pub use admin::MAX_WRITE_ATTEMPTS;
pub use admin::RegistrationSummary;
pub use admin::grant_allow_list;
pub use admin::prune_expired_entries;
pub use admin::register_provider_fields;
pub use admin::replace_consumer_grant;
pub use admin::revoke_allow_list_entry;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use evaluator::AccessEvaluator;
pub use evaluator::evaluate_field;
pub use store::InMemoryGrantStore;
pub use store::InMemoryPolicyStore;
