// crates/exchange-gate-audit/src/sink.rs
// ============================================================================
// Module: Audit Sinks
// Description: Sink interface plus JSON-lines and in-memory sinks.
// Purpose: Deliver finalized audit records to durable or diagnostic targets.
// Dependencies: async-trait, exchange-gate-core, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! An [`AuditSink`] accepts one [`AuditLogRecord`] per call and either
//! acknowledges it or fails. Sinks do not retry; retry and failure reporting
//! belong to [`crate::AuditRecorder`]. Deliveries are keyed by correlation
//! identifier, so sinks that can detect a repeated delivery treat it as
//! already acknowledged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Stderr;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use exchange_gate_core::AuditLogFilter;
use exchange_gate_core::AuditLogQuery;
use exchange_gate_core::AuditLogRecord;
use exchange_gate_core::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Sink Interface
// ============================================================================

/// Destination for finalized audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Returns a stable label for monitoring events.
    fn name(&self) -> &str;

    /// Delivers a single record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSinkError`] when the record was not acknowledged.
    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError>;
}

#[async_trait]
impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        (**self).deliver(record).await
    }
}

/// Audit sink delivery failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditSinkError {
    /// Writing to the target failed.
    #[error("audit sink io error: {0}")]
    Io(String),
    /// Record could not be serialized.
    #[error("audit record serialization failed: {0}")]
    Serialize(String),
    /// Remote endpoint answered with an unexpected status.
    #[error("audit endpoint rejected record: status {status}: {body}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Truncated response body.
        body: String,
    },
    /// Target could not be reached.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    /// Backing store failed.
    #[error("audit store error: {0}")]
    Store(String),
}

impl AuditSinkError {
    /// Returns true when another attempt may succeed.
    ///
    /// Serialization failures and client errors other than timeouts and rate
    /// limiting are permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Serialize(_) => false,
            Self::Rejected {
                status, ..
            } => !matches!(*status, 400 ..= 499) || matches!(*status, 408 | 429),
            Self::Io(_) | Self::Unavailable(_) | Self::Store(_) => true,
        }
    }
}

impl From<StoreError> for AuditSinkError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

// ============================================================================
// SECTION: JSON Lines Sink
// ============================================================================

/// Sink writing one JSON object per line.
///
/// Writes run on the tokio blocking pool.
pub struct JsonLineAuditSink<W: Write + Send + 'static> {
    /// Label reported to monitors.
    name: &'static str,
    /// Serialized writer shared with blocking write tasks.
    writer: Arc<Mutex<W>>,
}

impl JsonLineAuditSink<Stderr> {
    /// Creates a sink writing to standard error.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new("stderr", std::io::stderr())
    }
}

impl JsonLineAuditSink<File> {
    /// Opens (or creates) an append-only log file.
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
        Ok(Self::new("file", file))
    }
}

impl<W: Write + Send + 'static> JsonLineAuditSink<W> {
    /// Wraps an arbitrary writer.
    #[must_use]
    pub fn new(name: &'static str, writer: W) -> Self {
        Self {
            name,
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Consumes the sink and returns the writer.
    ///
    /// # Errors
    ///
    /// Returns [`AuditSinkError::Io`] when a detached write still holds the
    /// writer or the writer lock was poisoned.
    pub fn into_inner(self) -> Result<W, AuditSinkError> {
        let writer = Arc::try_unwrap(self.writer)
            .map_err(|_| AuditSinkError::Io("writer still in use".to_string()))?;
        writer.into_inner().map_err(|_| AuditSinkError::Io("writer lock poisoned".to_string()))
    }
}

#[async_trait]
impl<W: Write + Send + 'static> AuditSink for JsonLineAuditSink<W> {
    fn name(&self) -> &str {
        self.name
    }

    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        let payload = serde_json::to_string(record)
            .map_err(|err| AuditSinkError::Serialize(err.to_string()))?;
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || write_line(&writer, &payload))
            .await
            .map_err(|err| AuditSinkError::Unavailable(err.to_string()))?
    }
}

/// Appends one line under the writer lock and flushes.
fn write_line<W: Write>(writer: &Mutex<W>, payload: &str) -> Result<(), AuditSinkError> {
    let mut writer =
        writer.lock().map_err(|_| AuditSinkError::Io("writer lock poisoned".to_string()))?;
    writeln!(writer, "{payload}").map_err(|err| AuditSinkError::Io(err.to_string()))?;
    writer.flush().map_err(|err| AuditSinkError::Io(err.to_string()))
}

// ============================================================================
// SECTION: In-Memory Sink
// ============================================================================

/// Queryable in-memory sink.
///
/// # Invariants
/// - Holds at most one record per correlation identifier.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    /// Records in delivery order.
    records: Arc<Mutex<Vec<AuditLogRecord>>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of delivered records in delivery order.
    #[must_use]
    pub fn records(&self) -> Vec<AuditLogRecord> {
        self.records.lock().map(|records| records.clone()).unwrap_or_default()
    }

    /// Returns the number of delivered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or_default()
    }

    /// Returns true when nothing has been delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        let mut records =
            self.records.lock().map_err(|_| AuditSinkError::Store("sink lock poisoned".to_string()))?;
        if records.iter().all(|existing| existing.correlation_id != record.correlation_id) {
            records.push(record.clone());
        }
        Ok(())
    }
}

impl AuditLogQuery for InMemoryAuditSink {
    fn query_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogRecord>, StoreError> {
        let records =
            self.records.lock().map_err(|_| StoreError::Store("sink lock poisoned".to_string()))?;
        let mut matched: Vec<AuditLogRecord> =
            records.iter().filter(|record| filter.matches(record)).cloned().collect();
        matched.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
        matched.truncate(filter.effective_limit());
        Ok(matched)
    }
}
