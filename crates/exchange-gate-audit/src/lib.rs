// crates/exchange-gate-audit/src/lib.rs
// ============================================================================
// Module: Exchange Gate Audit Library
// Description: Audit sinks, delivery, dispatch, and request scopes.
// Purpose: Record one audit per request without affecting its verdict.
// Dependencies: exchange-gate-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! This crate turns finalized audit contexts into delivered audit records.
//! Request paths hold an [`AuditScope`], which guarantees exactly one
//! finalized audit per request and submits it to an [`AuditDispatcher`]
//! without waiting. The dispatcher's [`AuditRecorder`] delivers records to an
//! [`AuditSink`] under a [`RetryPolicy`] and reports retries and lost records
//! to an [`AuditMonitor`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dispatch;
pub mod http;
pub mod monitor;
pub mod recorder;
pub mod retry;
pub mod scope;
pub mod sink;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatch::AuditDispatcher;
pub use dispatch::AuditHandle;
pub use dispatch::DEFAULT_MAX_IN_FLIGHT;
pub use dispatch::DEFAULT_MAX_QUEUED;
pub use dispatch::SubmitError;
pub use http::HttpAuditSink;
pub use http::HttpAuditSinkConfig;
pub use monitor::AuditMonitor;
pub use monitor::AuditMonitorEvent;
pub use monitor::AuditMonitorEventKind;
pub use monitor::FileAuditMonitor;
pub use monitor::InMemoryAuditMonitor;
pub use monitor::RecordReceipt;
pub use monitor::StderrAuditMonitor;
pub use recorder::AuditDeliveryError;
pub use recorder::AuditRecorder;
pub use retry::Backoff;
pub use retry::MAX_RETRY_ATTEMPTS;
pub use retry::RetryPolicy;
pub use scope::AuditScope;
pub use sink::AuditSink;
pub use sink::AuditSinkError;
pub use sink::InMemoryAuditSink;
pub use sink::JsonLineAuditSink;
