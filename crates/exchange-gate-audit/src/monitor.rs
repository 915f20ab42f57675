// crates/exchange-gate-audit/src/monitor.rs
// ============================================================================
// Module: Audit Delivery Monitoring
// Description: Operational signals about audit delivery.
// Purpose: Surface retries and lost records without failing requests.
// Dependencies: serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! Delivery problems never reach the request path. Instead they are emitted
//! as [`AuditMonitorEvent`] values through an [`AuditMonitor`]: a retry
//! signal per failed attempt that will be retried, a distinct
//! `audit_delivery_failed` signal when a record is given up on, and
//! `audit_dispatch_closed` / `audit_dispatch_overflow` when a record never
//! reaches the queue. Monitors write JSON lines to stderr or a file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use exchange_gate_core::AuditStatus;
use exchange_gate_core::CorrelationId;
use serde::Serialize;
use tokio::runtime::Handle;

use crate::sink::AuditSinkError;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Kind of delivery signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMonitorEventKind {
    /// An attempt failed and another will follow.
    AuditDeliveryRetry,
    /// The record was given up on.
    AuditDeliveryFailed,
    /// The record could not be queued because dispatch has shut down.
    AuditDispatchClosed,
    /// The record could not be queued because the dispatch queue was full.
    AuditDispatchOverflow,
}

impl AuditMonitorEventKind {
    /// Returns the stable event label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuditDeliveryRetry => "audit_delivery_retry",
            Self::AuditDeliveryFailed => "audit_delivery_failed",
            Self::AuditDispatchClosed => "audit_dispatch_closed",
            Self::AuditDispatchOverflow => "audit_dispatch_overflow",
        }
    }
}

/// Monitoring event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditMonitorEvent {
    /// Event identifier.
    pub event: AuditMonitorEventKind,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Correlation identifier of the affected record.
    pub correlation_id: CorrelationId,
    /// Terminal status of the affected request.
    pub status: AuditStatus,
    /// Sink label.
    pub sink: String,
    /// Attempts made so far.
    pub attempt: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Last error, when one occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditMonitorEvent {
    /// Attaches the sink error that triggered the event.
    #[must_use]
    pub fn with_error(mut self, error: &AuditSinkError) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Acknowledgement of a delivered record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReceipt {
    /// Correlation identifier of the delivered record.
    pub correlation_id: CorrelationId,
    /// Terminal status of the delivered record.
    pub status: AuditStatus,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

// ============================================================================
// SECTION: Monitor Interface
// ============================================================================

/// Receiver for delivery signals.
pub trait AuditMonitor: Send + Sync {
    /// Handles a retry or failure signal.
    fn emit(&self, event: &AuditMonitorEvent);

    /// Observes a successful delivery.
    fn delivered(&self, _receipt: &RecordReceipt) {}
}

/// Monitor that logs JSON lines to stderr.
pub struct StderrAuditMonitor;

impl AuditMonitor for StderrAuditMonitor {
    fn emit(&self, event: &AuditMonitorEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            run_blocking(move || {
                let _ = writeln!(std::io::stderr(), "{payload}");
            });
        }
    }
}

/// Monitor that logs JSON lines to a file.
pub struct FileAuditMonitor {
    /// File handle used for append-only logging.
    file: Arc<Mutex<File>>,
}

impl FileAuditMonitor {
    /// Opens (or creates) the monitor log.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSinkError::Io`] when the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, AuditSinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| AuditSinkError::Io(err.to_string()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl AuditMonitor for FileAuditMonitor {
    fn emit(&self, event: &AuditMonitorEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let file = Arc::clone(&self.file);
            run_blocking(move || {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(file, "{payload}");
                    let _ = file.flush();
                }
            });
        }
    }
}

/// Runs a write on the tokio blocking pool when called from a runtime, and
/// inline otherwise.
fn run_blocking(write: impl FnOnce() + Send + 'static) {
    match Handle::try_current() {
        Ok(handle) => drop(handle.spawn_blocking(write)),
        Err(_) => write(),
    }
}

/// Monitor that keeps events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditMonitor {
    /// Emitted events in order.
    events: Arc<Mutex<Vec<AuditMonitorEvent>>>,
    /// Receipts of delivered records in order.
    receipts: Arc<Mutex<Vec<RecordReceipt>>>,
}

impl InMemoryAuditMonitor {
    /// Creates an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns emitted events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditMonitorEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Returns emitted events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: AuditMonitorEventKind) -> Vec<AuditMonitorEvent> {
        self.events().into_iter().filter(|event| event.event == kind).collect()
    }

    /// Returns receipts of delivered records.
    #[must_use]
    pub fn receipts(&self) -> Vec<RecordReceipt> {
        self.receipts.lock().map(|receipts| receipts.clone()).unwrap_or_default()
    }
}

impl AuditMonitor for InMemoryAuditMonitor {
    fn emit(&self, event: &AuditMonitorEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }

    fn delivered(&self, receipt: &RecordReceipt) {
        if let Ok(mut receipts) = self.receipts.lock() {
            receipts.push(receipt.clone());
        }
    }
}

impl<M: AuditMonitor + ?Sized> AuditMonitor for Arc<M> {
    fn emit(&self, event: &AuditMonitorEvent) {
        (**self).emit(event);
    }

    fn delivered(&self, receipt: &RecordReceipt) {
        (**self).delivered(receipt);
    }
}
