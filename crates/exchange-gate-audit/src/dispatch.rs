// crates/exchange-gate-audit/src/dispatch.rs
// ============================================================================
// Module: Audit Dispatch
// Description: Background delivery of finalized audits.
// Purpose: Keep audit delivery off the request path with bounded concurrency.
// Dependencies: thiserror, tokio
// ============================================================================

//! ## Overview
//! The [`AuditDispatcher`] owns a worker task fed by a bounded channel of
//! `max_queued` audits. Request paths submit finalized audits through a
//! cloneable [`AuditHandle`]; submission never blocks and never awaits, so it
//! is safe from `Drop`. A full queue refuses the audit and emits
//! `audit_dispatch_overflow` on the monitor. The worker records each audit on
//! its own task, with at most `max_in_flight` deliveries running at once.
//! [`AuditDispatcher::shutdown`] stops intake, drains queued audits, and waits
//! for in-flight deliveries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use exchange_gate_core::Clock;
use exchange_gate_core::CorrelationId;
use exchange_gate_core::FinalizedAudit;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;

use crate::monitor::AuditMonitor;
use crate::monitor::AuditMonitorEvent;
use crate::monitor::AuditMonitorEventKind;
use crate::recorder::AuditRecorder;
use crate::scope::AuditScope;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on concurrent deliveries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;
/// Default bound on audits waiting for a delivery slot.
pub const DEFAULT_MAX_QUEUED: usize = 1_024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Submission refused by the dispatcher.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Dispatch has shut down.
    #[error("audit dispatcher closed; record {} was not queued", .0.correlation_id())]
    Closed(Box<FinalizedAudit>),
    /// The queue already holds `max_queued` audits.
    #[error("audit dispatch queue full; record {} was not queued", .0.correlation_id())]
    QueueFull(Box<FinalizedAudit>),
}

impl SubmitError {
    /// Returns the audit that was not queued.
    #[must_use]
    pub fn audit(&self) -> &FinalizedAudit {
        match self {
            Self::Closed(audit) | Self::QueueFull(audit) => audit,
        }
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Cloneable submission handle.
#[derive(Clone)]
pub struct AuditHandle {
    /// Channel into the dispatch worker.
    sender: mpsc::Sender<Box<FinalizedAudit>>,
    /// Receiver for dispatch-closed and overflow signals.
    monitor: Arc<dyn AuditMonitor>,
    /// Time source for scopes and events.
    clock: Arc<dyn Clock>,
    /// Attempt budget reported in events.
    max_attempts: u32,
}

impl AuditHandle {
    /// Queues a finalized audit for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Closed`] when dispatch has shut down and
    /// [`SubmitError::QueueFull`] when the queue is at capacity. The monitor
    /// has already received `audit_dispatch_closed` or
    /// `audit_dispatch_overflow` respectively.
    pub fn submit(&self, audit: FinalizedAudit) -> Result<(), SubmitError> {
        let err = match self.sender.try_send(Box::new(audit)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(audit)) => SubmitError::Closed(audit),
            Err(TrySendError::Full(audit)) => SubmitError::QueueFull(audit),
        };
        let kind = match err {
            SubmitError::Closed(_) => AuditMonitorEventKind::AuditDispatchClosed,
            SubmitError::QueueFull(_) => AuditMonitorEventKind::AuditDispatchOverflow,
        };
        let audit = err.audit();
        self.monitor.emit(&AuditMonitorEvent {
            event: kind,
            timestamp_ms: self.clock.now().unix_millis(),
            correlation_id: audit.correlation_id().clone(),
            status: audit.status(),
            sink: "dispatcher".to_string(),
            attempt: 0,
            max_attempts: self.max_attempts,
            error: None,
        });
        Err(err)
    }

    /// Opens a request scope that submits through this handle.
    #[must_use]
    pub fn open_scope(&self, correlation_id: CorrelationId) -> AuditScope {
        AuditScope::open(self.clone(), correlation_id)
    }

    /// Returns the shared clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns true once the worker has stopped accepting audits.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Owner of the background dispatch worker.
pub struct AuditDispatcher {
    /// Handle cloned out to request paths.
    handle: AuditHandle,
    /// Signal asking the worker to stop intake.
    shutdown: oneshot::Sender<()>,
    /// Worker task.
    worker: JoinHandle<()>,
}

impl AuditDispatcher {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// Zero bounds are raised to one.
    #[must_use]
    pub fn spawn(recorder: Arc<AuditRecorder>, max_in_flight: usize, max_queued: usize) -> Self {
        let (sender, receiver) = mpsc::channel(max_queued.max(1));
        let (shutdown, shutdown_signal) = oneshot::channel();
        let handle = AuditHandle {
            sender,
            monitor: recorder.monitor(),
            clock: recorder.clock(),
            max_attempts: recorder.retry_policy().attempt_budget(),
        };
        let worker =
            tokio::spawn(run_worker(recorder, receiver, shutdown_signal, max_in_flight.max(1)));
        Self {
            handle,
            shutdown,
            worker,
        }
    }

    /// Returns a submission handle.
    #[must_use]
    pub fn handle(&self) -> AuditHandle {
        self.handle.clone()
    }

    /// Stops intake, drains queued audits, and waits for deliveries.
    ///
    /// Audits submitted after this call are refused with
    /// [`SubmitError::Closed`].
    /// Dropping the dispatcher without calling this also stops intake; queued
    /// audits are still delivered by the detached worker.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.worker.await;
    }
}

/// Worker loop: spawn a bounded delivery task per queued audit.
async fn run_worker(
    recorder: Arc<AuditRecorder>,
    mut receiver: mpsc::Receiver<Box<FinalizedAudit>>,
    mut shutdown: oneshot::Receiver<()>,
    max_in_flight: usize,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut tasks = JoinSet::new();
    let mut intake_open = true;
    loop {
        tokio::select! {
            next = receiver.recv() => {
                let Some(audit) = next else {
                    break;
                };
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let recorder = Arc::clone(&recorder);
                tasks.spawn(async move {
                    let _permit = permit;
                    let _ = recorder.record(*audit).await;
                });
                while tasks.try_join_next().is_some() {}
            }
            _ = &mut shutdown, if intake_open => {
                intake_open = false;
                receiver.close();
            }
        }
    }
    while tasks.join_next().await.is_some() {}
}
