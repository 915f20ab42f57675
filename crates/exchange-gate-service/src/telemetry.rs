// crates/exchange-gate-service/src/telemetry.rs
// ============================================================================
// Module: Gate Telemetry
// Description: Observability hooks for decisions and audit delivery.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: exchange-gate-audit, exchange-gate-core
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for per-field decision
//! counters, decision latency, and audit delivery outcomes. Deployments plug
//! in their own exporter by implementing [`GateMetrics`]. Labels carry reason
//! codes and identifiers only; payloads never reach telemetry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use exchange_gate_audit::AuditMonitor;
use exchange_gate_audit::AuditMonitorEvent;
use exchange_gate_audit::AuditMonitorEventKind;
use exchange_gate_audit::RecordReceipt;
use exchange_gate_core::AccessDecision;
use exchange_gate_core::AuditStatus;
use exchange_gate_core::ProviderId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for decision histograms.
pub const DECISION_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Per-field decision metric payload.
///
/// # Invariants
/// - `reason` is the stable decision reason code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionMetricEvent {
    /// Provider the field belongs to.
    pub provider_id: ProviderId,
    /// Whether the field was allowed.
    pub allowed: bool,
    /// Reason code (`ok`, `not_granted`, ...).
    pub reason: &'static str,
}

impl DecisionMetricEvent {
    /// Builds the event for a decision.
    #[must_use]
    pub fn from_decision(decision: &AccessDecision) -> Self {
        Self {
            provider_id: decision.provider_id.clone(),
            allowed: decision.is_allowed(),
            reason: decision.outcome.reason_code(),
        }
    }
}

/// Audit delivery outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditDeliveryOutcome {
    /// Record acknowledged by the sink.
    Delivered,
    /// Attempt failed and will be retried.
    Retried,
    /// Record lost after the retry budget.
    Failed,
    /// Record refused because dispatch had shut down or was full.
    Dropped,
}

impl AuditDeliveryOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Retried => "retried",
            Self::Failed => "failed",
            Self::Dropped => "dropped",
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for gate decisions and audit delivery.
pub trait GateMetrics: Send + Sync {
    /// Records one per-field decision.
    fn record_decision(&self, event: &DecisionMetricEvent);
    /// Records how long the decision phase of a request took.
    fn record_decision_latency(&self, latency: Duration);
    /// Records an audit delivery outcome.
    fn record_audit_delivery(&self, outcome: AuditDeliveryOutcome, status: AuditStatus);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl GateMetrics for NoopMetrics {
    fn record_decision(&self, _event: &DecisionMetricEvent) {}

    fn record_decision_latency(&self, _latency: Duration) {}

    fn record_audit_delivery(&self, _outcome: AuditDeliveryOutcome, _status: AuditStatus) {}
}

// ============================================================================
// SECTION: Monitor Adapter
// ============================================================================

/// Audit monitor that counts delivery outcomes before forwarding.
pub struct MetricsAuditMonitor {
    /// Monitor receiving the forwarded signals.
    inner: Arc<dyn AuditMonitor>,
    /// Metrics sink receiving delivery counters.
    metrics: Arc<dyn GateMetrics>,
}

impl MetricsAuditMonitor {
    /// Wraps `inner` so every signal is also counted in `metrics`.
    #[must_use]
    pub fn new(inner: Arc<dyn AuditMonitor>, metrics: Arc<dyn GateMetrics>) -> Self {
        Self {
            inner,
            metrics,
        }
    }
}

impl AuditMonitor for MetricsAuditMonitor {
    fn emit(&self, event: &AuditMonitorEvent) {
        let outcome = match event.event {
            AuditMonitorEventKind::AuditDeliveryRetry => AuditDeliveryOutcome::Retried,
            AuditMonitorEventKind::AuditDeliveryFailed => AuditDeliveryOutcome::Failed,
            AuditMonitorEventKind::AuditDispatchClosed
            | AuditMonitorEventKind::AuditDispatchOverflow => AuditDeliveryOutcome::Dropped,
        };
        self.metrics.record_audit_delivery(outcome, event.status);
        self.inner.emit(event);
    }

    fn delivered(&self, receipt: &RecordReceipt) {
        self.metrics.record_audit_delivery(AuditDeliveryOutcome::Delivered, receipt.status);
        self.inner.delivered(receipt);
    }
}

/// Returns the bucket upper bound for a latency, or `None` past the last.
#[must_use]
pub fn latency_bucket_ms(latency: Duration) -> Option<u64> {
    let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    DECISION_LATENCY_BUCKETS_MS.iter().copied().find(|bound| millis <= *bound)
}
