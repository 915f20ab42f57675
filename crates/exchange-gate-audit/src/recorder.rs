// crates/exchange-gate-audit/src/recorder.rs
// ============================================================================
// Module: Audit Recorder
// Description: Converts finalized audits into records and delivers them.
// Purpose: Apply the retry policy and report exhaustion to the monitor.
// Dependencies: exchange-gate-core, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`AuditRecorder::record`] consumes a [`FinalizedAudit`], so an audit can be
//! recorded at most once. The record is shaped under the configured payload
//! capture mode and delivered with the [`RetryPolicy`]. Each attempt runs
//! under its own timeout; a timeout counts as a failed attempt. When the
//! budget is spent, or the sink reports a permanent failure, the monitor
//! receives `audit_delivery_failed` and the error is returned to the caller,
//! which must not let it change the request verdict.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use exchange_gate_core::AuditLogRecord;
use exchange_gate_core::Clock;
use exchange_gate_core::CorrelationId;
use exchange_gate_core::FinalizedAudit;
use exchange_gate_core::PayloadCapture;
use thiserror::Error;

use crate::monitor::AuditMonitor;
use crate::monitor::AuditMonitorEvent;
use crate::monitor::AuditMonitorEventKind;
use crate::monitor::RecordReceipt;
use crate::retry::RetryPolicy;
use crate::sink::AuditSink;
use crate::sink::AuditSinkError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Audit delivery failures surfaced after monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditDeliveryError {
    /// Record could not be shaped from the finalized audit.
    #[error("audit record {correlation_id} could not be encoded: {message}")]
    Encode {
        /// Correlation identifier of the lost record.
        correlation_id: CorrelationId,
        /// Encoding failure detail.
        message: String,
    },
    /// Every permitted attempt failed.
    #[error("audit record {correlation_id} not delivered after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Correlation identifier of the lost record.
        correlation_id: CorrelationId,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        source: AuditSinkError,
    },
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Delivers finalized audits to a sink with retry and monitoring.
pub struct AuditRecorder {
    /// Delivery target.
    sink: Arc<dyn AuditSink>,
    /// Operational signal receiver.
    monitor: Arc<dyn AuditMonitor>,
    /// Attempt budget and backoff.
    retry: RetryPolicy,
    /// Payload capture mode for shaped records.
    capture: PayloadCapture,
    /// Time source for monitor events.
    clock: Arc<dyn Clock>,
}

impl AuditRecorder {
    /// Creates a recorder.
    #[must_use]
    pub fn new(
        sink: Arc<dyn AuditSink>,
        monitor: Arc<dyn AuditMonitor>,
        retry: RetryPolicy,
        capture: PayloadCapture,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            monitor,
            retry,
            capture,
            clock,
        }
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the clock shared with scopes and monitors.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Returns the monitor receiving delivery signals.
    #[must_use]
    pub fn monitor(&self) -> Arc<dyn AuditMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Records a finalized audit.
    ///
    /// # Errors
    ///
    /// Returns [`AuditDeliveryError`] when the record could not be encoded or
    /// delivered within the retry budget. The monitor has already received
    /// `audit_delivery_failed` when this returns an error.
    pub async fn record(&self, audit: FinalizedAudit) -> Result<RecordReceipt, AuditDeliveryError> {
        let max_attempts = self.retry.attempt_budget();
        let record = match audit.to_record(self.capture) {
            Ok(record) => record,
            Err(err) => {
                let event = AuditMonitorEvent {
                    error: Some(err.to_string()),
                    ..self.event(AuditMonitorEventKind::AuditDeliveryFailed, &audit, 0)
                };
                self.monitor.emit(&event);
                return Err(AuditDeliveryError::Encode {
                    correlation_id: audit.correlation_id().clone(),
                    message: err.to_string(),
                });
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&record).await {
                Ok(()) => {
                    let receipt = RecordReceipt {
                        correlation_id: record.correlation_id.clone(),
                        status: record.status,
                        attempts: attempt,
                    };
                    self.monitor.delivered(&receipt);
                    return Ok(receipt);
                }
                Err(err) if attempt < max_attempts && err.is_retryable() => {
                    let event = self
                        .event(AuditMonitorEventKind::AuditDeliveryRetry, &audit, attempt)
                        .with_error(&err);
                    self.monitor.emit(&event);
                    tokio::time::sleep(self.retry.backoff.delay_after(attempt)).await;
                }
                Err(err) => {
                    let event = self
                        .event(AuditMonitorEventKind::AuditDeliveryFailed, &audit, attempt)
                        .with_error(&err);
                    self.monitor.emit(&event);
                    return Err(AuditDeliveryError::Exhausted {
                        correlation_id: record.correlation_id.clone(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Runs one time-bounded delivery attempt.
    async fn attempt(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        let timeout = self.retry.attempt_timeout;
        match tokio::time::timeout(timeout, self.sink.deliver(record)).await {
            Ok(result) => result,
            Err(_) => Err(AuditSinkError::Unavailable(format!(
                "attempt timed out after {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Builds a monitor event for the audit.
    fn event(
        &self,
        kind: AuditMonitorEventKind,
        audit: &FinalizedAudit,
        attempt: u32,
    ) -> AuditMonitorEvent {
        AuditMonitorEvent {
            event: kind,
            timestamp_ms: self.clock.now().unix_millis(),
            correlation_id: audit.correlation_id().clone(),
            status: audit.status(),
            sink: self.sink.name().to_string(),
            attempt,
            max_attempts: self.retry.attempt_budget(),
            error: None,
        }
    }
}
