// crates/exchange-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Exchange Store
// Description: Durable policy, grant, and audit log storage using SQLite WAL.
// Purpose: Provide production persistence for Exchange Gate state.
// Dependencies: exchange-gate-audit, exchange-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed implementation of the policy, grant,
//! and audit query interfaces, plus an [`exchange_gate_audit::AuditSink`]
//! that lands audit records in the same database. Stored payloads are
//! canonical JSON verified against their hash on read. Storage inputs are
//! untrusted; corrupt rows fail closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit_log;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteExchangeStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
