// crates/exchange-gate-service/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared policy fixtures, gates, and scripted collaborators.
// Purpose: Build gates over in-memory stores with observable audit output.
// Dependencies: exchange-gate-audit, exchange-gate-core, exchange-gate-service
// ============================================================================

//! ## Overview
//! Provides a gate harness over in-memory stores seeded with the reference
//! consumers (`C1`, `C2`, `C3`), a pinned manual clock, an in-memory audit
//! sink and monitor, plus failing stores, sinks, and providers.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use exchange_gate_audit::AuditDispatcher;
use exchange_gate_audit::AuditRecorder;
use exchange_gate_audit::AuditSink;
use exchange_gate_audit::AuditSinkError;
use exchange_gate_audit::Backoff;
use exchange_gate_audit::InMemoryAuditMonitor;
use exchange_gate_audit::InMemoryAuditSink;
use exchange_gate_audit::RetryPolicy;
use exchange_gate_config::DisclosureMode;
use exchange_gate_core::AllowList;
use exchange_gate_core::AllowListEntry;
use exchange_gate_core::AuditLogRecord;
use exchange_gate_core::AuditStatus;
use exchange_gate_core::ConsumerGrant;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::FieldName;
use exchange_gate_core::FieldPolicy;
use exchange_gate_core::GrantStore;
use exchange_gate_core::InMemoryGrantStore;
use exchange_gate_core::InMemoryPolicyStore;
use exchange_gate_core::ManualClock;
use exchange_gate_core::PayloadCapture;
use exchange_gate_core::PolicyStore;
use exchange_gate_core::StoreError;
use exchange_gate_core::Timestamp;
use exchange_gate_core::Versioned;
use exchange_gate_service::AccessGate;
use exchange_gate_service::AuditDeliveryOutcome;
use exchange_gate_service::CorrelationIdGenerator;
use exchange_gate_service::DecisionMetricEvent;
use exchange_gate_service::Downstream;
use exchange_gate_service::DownstreamError;
use exchange_gate_service::DownstreamRequest;
use exchange_gate_service::FixtureDownstream;
use exchange_gate_service::GateMetrics;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Time
// ============================================================================

/// Parses an RFC 3339 instant.
pub fn ts(value: &str) -> Timestamp {
    Timestamp::parse_rfc3339(value).unwrap()
}

/// Instant before the `C1` allow-list entry expires.
pub fn before_expiry() -> Timestamp {
    ts("2024-06-01T00:00:00Z")
}

/// Instant after the `C1` allow-list entry expired.
pub fn after_expiry() -> Timestamp {
    ts("2025-02-01T00:00:00Z")
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Reference policies for provider `drp`.
pub fn reference_policies() -> Vec<FieldPolicy> {
    let entry = AllowListEntry {
        consumer_id: ConsumerId::new("C1"),
        expiry_time: ts("2025-01-01T00:00:00Z"),
        created_at: ts("2024-01-01T00:00:00Z"),
        updated_at: None,
    };
    vec![
        FieldPolicy::restricted("nationalId", "registry", "drp")
            .with_allow_list(AllowList::from_entries(vec![entry])),
        FieldPolicy::restricted("income", "tax-office", "drp").with_consent_required(true),
        FieldPolicy::public("publicHoliday", "calendar", "drp"),
    ]
}

/// Reference grants for `C1`, `C2`, and `C3`.
pub fn reference_grants() -> Vec<ConsumerGrant> {
    vec![
        ConsumerGrant::new("C1", ["nationalId", "income", "publicHoliday"]),
        ConsumerGrant::new("C2", ["income"]),
        ConsumerGrant::new("C3", ["publicHoliday"]),
    ]
}

/// Provider fixture serving every reference field.
pub fn reference_downstream() -> FixtureDownstream {
    FixtureDownstream::from_json(json!({
        "drp": {
            "nationalId": "199001011234",
            "income": 52000,
            "publicHoliday": "2024-12-25"
        }
    }))
    .unwrap()
}

/// Retry policy with short fixed delays.
pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        attempt_timeout: Duration::from_secs(1),
        backoff: Backoff::Fixed {
            delay: Duration::from_millis(5),
        },
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Gate plus every observable collaborator.
pub struct Harness {
    /// Gate under test.
    pub gate: AccessGate,
    /// Clock shared by the gate and the recorder.
    pub clock: Arc<ManualClock>,
    /// Delivered audit records.
    pub sink: InMemoryAuditSink,
    /// Delivery signals.
    pub monitor: InMemoryAuditMonitor,
    /// Decision metrics.
    pub metrics: Arc<RecordingMetrics>,
    /// Background dispatcher; shut down to flush records.
    pub dispatcher: AuditDispatcher,
}

impl Harness {
    /// Builds a harness over the reference fixtures.
    pub fn new(disclosure: DisclosureMode) -> Self {
        let policies = InMemoryPolicyStore::with_policies(reference_policies()).unwrap();
        let grants = InMemoryGrantStore::with_grants(reference_grants()).unwrap();
        Self::with_stores(Arc::new(policies), Arc::new(grants), disclosure)
    }

    /// Builds a harness over the given stores.
    pub fn with_stores(
        policies: Arc<dyn PolicyStore>,
        grants: Arc<dyn GrantStore>,
        disclosure: DisclosureMode,
    ) -> Self {
        let sink = InMemoryAuditSink::new();
        Self::with_sink(policies, grants, disclosure, Arc::new(sink.clone()), sink)
    }

    /// Builds a harness whose recorder delivers to `delivery`.
    pub fn with_sink(
        policies: Arc<dyn PolicyStore>,
        grants: Arc<dyn GrantStore>,
        disclosure: DisclosureMode,
        delivery: Arc<dyn AuditSink>,
        sink: InMemoryAuditSink,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(before_expiry()));
        let monitor = InMemoryAuditMonitor::new();
        let recorder = AuditRecorder::new(
            delivery,
            Arc::new(monitor.clone()),
            quick_retry(2),
            PayloadCapture::Redacted,
            clock.clone(),
        );
        let dispatcher = AuditDispatcher::spawn(Arc::new(recorder), 8, 256);
        let metrics = Arc::new(RecordingMetrics::default());
        let gate = AccessGate::new(policies, grants, dispatcher.handle())
            .with_disclosure(disclosure)
            .with_correlation(CorrelationIdGenerator::with_boot_id("test", 1))
            .with_metrics(metrics.clone());
        Self {
            gate,
            clock,
            sink,
            monitor,
            metrics,
            dispatcher,
        }
    }

    /// Drains the dispatcher and returns delivered records.
    pub async fn finish(self) -> (Vec<AuditLogRecord>, InMemoryAuditMonitor) {
        let Self {
            gate,
            sink,
            monitor,
            dispatcher,
            ..
        } = self;
        drop(gate);
        dispatcher.shutdown().await;
        (sink.records(), monitor)
    }
}

/// Returns the single record, failing when there is not exactly one.
pub fn single(records: &[AuditLogRecord]) -> &AuditLogRecord {
    assert_eq!(records.len(), 1, "expected exactly one audit record: {records:?}");
    &records[0]
}

/// Asserts a record is a failure with the given reason label.
pub fn assert_failure(record: &AuditLogRecord, reason: &str) {
    assert_eq!(record.status, AuditStatus::Failure);
    let actual = record.failure_reason.map(|reason| reason.as_str());
    assert_eq!(actual, Some(reason));
}

/// Field name helper.
pub fn field(name: &str) -> FieldName {
    FieldName::new(name)
}

// ============================================================================
// SECTION: Scripted Collaborators
// ============================================================================

/// Policy store whose reads always fail.
pub struct UnavailablePolicyStore;

impl PolicyStore for UnavailablePolicyStore {
    fn load_field_policy(
        &self,
        _field_name: &FieldName,
    ) -> Result<Option<Versioned<FieldPolicy>>, StoreError> {
        Err(StoreError::Unavailable("policy database offline".to_string()))
    }
}

/// Audit sink that rejects every delivery.
pub struct DownAuditSink;

#[async_trait]
impl AuditSink for DownAuditSink {
    fn name(&self) -> &str {
        "down"
    }

    async fn deliver(&self, _record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        Err(AuditSinkError::Unavailable("audit service offline".to_string()))
    }
}

/// Provider that always fails.
pub struct FailingDownstream;

#[async_trait]
impl Downstream for FailingDownstream {
    async fn fetch(&self, _request: &DownstreamRequest) -> Result<Value, DownstreamError> {
        Err(DownstreamError::Unavailable("connection refused".to_string()))
    }
}

/// Provider that never answers.
pub struct HangingDownstream;

#[async_trait]
impl Downstream for HangingDownstream {
    async fn fetch(&self, _request: &DownstreamRequest) -> Result<Value, DownstreamError> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(Value::Null)
    }
}

/// Provider that records the fields it was asked for.
#[derive(Default)]
pub struct RecordingDownstream {
    /// Requests received in order.
    pub requests: Mutex<Vec<DownstreamRequest>>,
}

#[async_trait]
impl Downstream for RecordingDownstream {
    async fn fetch(&self, request: &DownstreamRequest) -> Result<Value, DownstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        reference_downstream().fetch(request).await
    }
}

/// Metrics sink that keeps every decision event.
#[derive(Default)]
pub struct RecordingMetrics {
    /// Decision events in order.
    pub decisions: Mutex<Vec<DecisionMetricEvent>>,
    /// Number of latency samples.
    pub latencies: Mutex<usize>,
}

impl RecordingMetrics {
    /// Returns recorded decision events.
    pub fn decisions(&self) -> Vec<DecisionMetricEvent> {
        self.decisions.lock().unwrap().clone()
    }

    /// Returns the number of latency samples.
    pub fn latency_samples(&self) -> usize {
        *self.latencies.lock().unwrap()
    }
}

impl GateMetrics for RecordingMetrics {
    fn record_decision(&self, event: &DecisionMetricEvent) {
        self.decisions.lock().unwrap().push(event.clone());
    }

    fn record_decision_latency(&self, _latency: Duration) {
        *self.latencies.lock().unwrap() += 1;
    }

    fn record_audit_delivery(&self, _outcome: AuditDeliveryOutcome, _status: AuditStatus) {}
}
