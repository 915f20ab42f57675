// crates/exchange-gate-audit/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared sinks, clocks, and audit builders for audit tests.
// Purpose: Provide scripted sinks that count and fail deliveries on demand.
// Dependencies: exchange-gate-audit, exchange-gate-core
// ============================================================================

//! ## Overview
//! Provides a recording sink that keeps every delivery (including repeats),
//! a scripted sink that fails a fixed number of attempts, and builders for
//! finalized audits and recorders.

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
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use exchange_gate_audit::AuditMonitor;
use exchange_gate_audit::AuditRecorder;
use exchange_gate_audit::AuditSink;
use exchange_gate_audit::AuditSinkError;
use exchange_gate_audit::Backoff;
use exchange_gate_audit::RetryPolicy;
use exchange_gate_core::AuditContext;
use exchange_gate_core::AuditLogRecord;
use exchange_gate_core::AuditOutcome;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::CorrelationId;
use exchange_gate_core::FinalizedAudit;
use exchange_gate_core::ManualClock;
use exchange_gate_core::PayloadCapture;
use exchange_gate_core::ProviderId;
use exchange_gate_core::Timestamp;

/// Returns a fixed test instant.
pub fn fixed_time() -> Timestamp {
    Timestamp::parse_rfc3339("2024-06-01T08:00:00Z").unwrap()
}

/// Returns a manual clock pinned to [`fixed_time`].
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(fixed_time()))
}

/// Builds a finalized success audit for a correlation identifier.
pub fn finalized(correlation_id: &str) -> FinalizedAudit {
    let mut context = AuditContext::new(CorrelationId::new(correlation_id), fixed_time());
    context.set_identity(ConsumerId::new("C1"), ProviderId::new("drp"));
    context.finalize(AuditOutcome::Success, fixed_time())
}

/// Retry policy with short fixed delays.
pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        attempt_timeout: Duration::from_secs(1),
        backoff: Backoff::Fixed {
            delay: Duration::from_millis(10),
        },
    }
}

/// Builds a recorder over the given sink and monitor.
pub fn recorder(
    sink: Arc<dyn AuditSink>,
    monitor: Arc<dyn AuditMonitor>,
    retry: RetryPolicy,
) -> AuditRecorder {
    AuditRecorder::new(sink, monitor, retry, PayloadCapture::Redacted, manual_clock())
}

/// Sink that keeps every delivery, including repeats.
#[derive(Default)]
pub struct RecordingSink {
    /// Delivered records in order.
    pub records: Mutex<Vec<AuditLogRecord>>,
}

impl RecordingSink {
    /// Returns delivered records.
    pub fn records(&self) -> Vec<AuditLogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Returns how many deliveries carried the correlation identifier.
    pub fn count_for(&self, correlation_id: &str) -> usize {
        self.records()
            .iter()
            .filter(|record| record.correlation_id.as_str() == correlation_id)
            .count()
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// How a scripted sink fails.
#[derive(Clone)]
pub enum Failure {
    /// Return the error immediately.
    Error(AuditSinkError),
    /// Never complete the attempt.
    Hang,
}

/// Sink that fails the first `failures` attempts.
pub struct ScriptedSink {
    /// Number of attempts to fail.
    pub failures: u32,
    /// Failure mode for failing attempts.
    pub failure: Failure,
    /// Attempts observed.
    pub attempts: AtomicU32,
    /// Successful deliveries.
    pub delivered: RecordingSink,
}

impl ScriptedSink {
    /// Creates a sink failing `failures` attempts with `failure`.
    pub fn new(failures: u32, failure: Failure) -> Self {
        Self {
            failures,
            failure,
            attempts: AtomicU32::new(0),
            delivered: RecordingSink::default(),
        }
    }

    /// Returns attempts observed.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for ScriptedSink {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt > self.failures {
            return self.delivered.deliver(record).await;
        }
        match &self.failure {
            Failure::Error(err) => Err(err.clone()),
            Failure::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(())
            }
        }
    }
}
