// crates/exchange-gate-service/src/lib.rs
// ============================================================================
// Module: Exchange Gate Service Library
// Description: Request orchestration for the data-exchange access gate.
// Purpose: Decide, disclose, and audit consumer requests to providers.
// Dependencies: exchange-gate-audit, exchange-gate-config, exchange-gate-core
// ============================================================================

//! ## Overview
//! The service crate joins the access evaluator, the audit pipeline, and a
//! downstream provider into one request path. [`AccessGate`] handles a
//! single request; [`GateRuntime`] assembles a gate from configuration.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod correlation;
pub mod downstream;
pub mod gate;
pub mod runtime;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use correlation::CorrelationIdGenerator;
pub use correlation::DEFAULT_CORRELATION_PREFIX;
pub use correlation::TraceIdRejection;
pub use correlation::sanitize_client_trace_id;
pub use downstream::Downstream;
pub use downstream::DownstreamError;
pub use downstream::DownstreamRequest;
pub use downstream::FixtureDownstream;
pub use gate::AccessGate;
pub use gate::AccessRequest;
pub use gate::DecisionReport;
pub use gate::Disclosure;
pub use gate::ExchangeOutcome;
pub use gate::GateError;
pub use gate::MAX_REQUEST_FIELDS;
pub use runtime::GateRuntime;
pub use runtime::GateStores;
pub use runtime::RuntimeError;
pub use telemetry::AuditDeliveryOutcome;
pub use telemetry::DecisionMetricEvent;
pub use telemetry::GateMetrics;
pub use telemetry::MetricsAuditMonitor;
pub use telemetry::NoopMetrics;
