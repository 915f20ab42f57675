// crates/exchange-gate-audit/tests/scope.rs
// ============================================================================
// Module: Audit Scope Tests
// Description: Exactly-once audit submission on every exit path.
// ============================================================================
//! ## Overview
//! Drives request scopes through normal completion, early return, panic
//! unwinding, and task cancellation, and checks that the dispatcher delivers
//! exactly one record per scope in every case.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use exchange_gate_audit::AuditDispatcher;
use exchange_gate_audit::AuditHandle;
use exchange_gate_audit::AuditMonitorEventKind;
use exchange_gate_audit::InMemoryAuditMonitor;
use exchange_gate_audit::SubmitError;
use exchange_gate_audit::scope::DROPPED_DETAIL;
use exchange_gate_audit::scope::PANIC_DETAIL;
use exchange_gate_core::AccessDecision;
use exchange_gate_core::AccessOutcome;
use exchange_gate_core::AuditStatus;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::CorrelationId;
use exchange_gate_core::DenyReason;
use exchange_gate_core::FailureReason;
use exchange_gate_core::FieldName;
use exchange_gate_core::ProviderId;

use crate::common::RecordingSink;
use crate::common::finalized;
use crate::common::fixed_time;
use crate::common::quick_retry;
use crate::common::recorder;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn dispatcher(sink: &Arc<RecordingSink>, monitor: &InMemoryAuditMonitor) -> AuditDispatcher {
    let recorder = recorder(sink.clone(), Arc::new(monitor.clone()), quick_retry(3));
    AuditDispatcher::spawn(Arc::new(recorder), 4, 64)
}

fn denied(field: &str) -> AccessDecision {
    AccessDecision {
        consumer_id: ConsumerId::new("C1"),
        provider_id: ProviderId::new("drp"),
        field_name: FieldName::new(field),
        outcome: AccessOutcome::Deny(DenyReason::RestrictedNoEntry),
        consent_required: false,
        evaluated_at: fixed_time(),
    }
}

#[derive(Debug)]
struct LookupFailed;

fn failing_lookup() -> Result<(), LookupFailed> {
    Err(LookupFailed)
}

fn handle_with_early_return(handle: &AuditHandle) -> Result<(), LookupFailed> {
    let mut scope = handle.open_scope(CorrelationId::new("early"));
    scope.context_mut().set_identity(ConsumerId::new("C1"), ProviderId::new("drp"));
    failing_lookup()?;
    scope.succeed().unwrap();
    Ok(())
}

// ============================================================================
// SECTION: Exit Paths
// ============================================================================

/// Verifies a completed scope yields one success record.
#[tokio::test]
async fn completed_scope_records_success_once() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);

    let mut scope = dispatcher.handle().open_scope(CorrelationId::new("ok"));
    scope.context_mut().set_identity(ConsumerId::new("C1"), ProviderId::new("drp"));
    scope.succeed().unwrap();
    dispatcher.shutdown().await;

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Success);
    assert_eq!(records[0].consumer_id, Some(ConsumerId::new("C1")));
}

/// Verifies the scope exposes the same live context it later submits.
#[tokio::test]
async fn context_mutations_reach_the_submitted_record() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);

    let mut scope = dispatcher.handle().open_scope(CorrelationId::new("live"));
    assert_eq!(scope.context().correlation_id().as_str(), "live");
    assert_eq!(scope.context().started_at(), fixed_time());
    scope.context_mut().record_decisions(vec![denied("income")]);
    scope.context_mut().record_decisions(vec![denied("nationalId")]);
    assert_eq!(scope.context().decisions().len(), 2);
    scope.fail(FailureReason::PolicyDenied, None).unwrap();
    dispatcher.shutdown().await;

    assert_eq!(sink.count_for("live"), 1);
    assert_eq!(sink.records()[0].decisions, vec![denied("income"), denied("nationalId")]);
}

/// Verifies an explicit denial is recorded with its decisions.
#[tokio::test]
async fn denial_records_failure_with_decisions() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);

    let mut scope = dispatcher.handle().open_scope(CorrelationId::new("deny"));
    scope.context_mut().record_decisions(vec![denied("income")]);
    scope.fail(FailureReason::PolicyDenied, Some("income: restricted_no_entry".to_string())).unwrap();
    dispatcher.shutdown().await;

    assert_eq!(sink.count_for("deny"), 1);
    let record = &sink.records()[0];
    assert_eq!(record.failure_reason, Some(FailureReason::PolicyDenied));
    assert_eq!(record.decisions, vec![denied("income")]);
}

/// Verifies `?` propagation still records a cancellation.
#[tokio::test]
async fn early_return_records_cancellation_once() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);

    assert!(handle_with_early_return(&dispatcher.handle()).is_err());
    dispatcher.shutdown().await;

    assert_eq!(sink.count_for("early"), 1);
    let record = &sink.records()[0];
    assert_eq!(record.status, AuditStatus::Failure);
    assert_eq!(record.failure_reason, Some(FailureReason::Cancelled));
    assert_eq!(record.failure_detail.as_deref(), Some(DROPPED_DETAIL));
}

/// Verifies panic unwinding records a cancellation marked as a panic.
#[tokio::test]
async fn panic_unwinding_records_cancellation_once() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);
    let handle = dispatcher.handle();

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let _scope = handle.open_scope(CorrelationId::new("panic"));
        panic!("handler bug");
    }));
    assert!(outcome.is_err());
    dispatcher.shutdown().await;

    assert_eq!(sink.count_for("panic"), 1);
    assert_eq!(sink.records()[0].failure_detail.as_deref(), Some(PANIC_DETAIL));
}

/// Verifies an aborted task records a cancellation.
#[tokio::test]
async fn aborted_task_records_cancellation_once() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);
    let handle = dispatcher.handle();

    let (opened_tx, opened_rx) = tokio::sync::oneshot::channel();
    let task = tokio::spawn(async move {
        let _scope = handle.open_scope(CorrelationId::new("aborted"));
        let _ = opened_tx.send(());
        std::future::pending::<()>().await;
    });
    opened_rx.await.unwrap();
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    dispatcher.shutdown().await;

    assert_eq!(sink.count_for("aborted"), 1);
    let record = &sink.records()[0];
    assert_eq!(record.failure_reason, Some(FailureReason::Cancelled));
}

/// Verifies many concurrent scopes each record exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scopes_record_once_each() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);

    let tasks: Vec<_> = (0 .. 50)
        .map(|index| {
            let handle = dispatcher.handle();
            tokio::spawn(async move {
                let scope = handle.open_scope(CorrelationId::new(format!("req-{index}")));
                if index % 2 == 0 {
                    scope.succeed().unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
    dispatcher.shutdown().await;

    let records = sink.records();
    assert_eq!(records.len(), 50);
    for index in 0 .. 50 {
        assert_eq!(sink.count_for(&format!("req-{index}")), 1);
    }
    let failures = records.iter().filter(|record| record.status == AuditStatus::Failure).count();
    assert_eq!(failures, 25);
}

// ============================================================================
// SECTION: Shutdown
// ============================================================================

/// Verifies submissions after shutdown are refused and signalled.
#[tokio::test]
async fn submit_after_shutdown_is_signalled() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let dispatcher = dispatcher(&sink, &monitor);
    let handle = dispatcher.handle();
    dispatcher.shutdown().await;

    assert!(handle.is_closed());
    let refused = handle.submit(finalized("late")).unwrap_err();
    assert!(matches!(refused, SubmitError::Closed(_)));
    assert_eq!(refused.audit().correlation_id().as_str(), "late");
    let closed = monitor.events_of(AuditMonitorEventKind::AuditDispatchClosed);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].correlation_id.as_str(), "late");
    assert!(sink.records().is_empty());
}

/// Verifies a full queue refuses the audit and signals overflow.
#[tokio::test]
async fn full_queue_refuses_and_signals_overflow() {
    let sink = Arc::new(RecordingSink::default());
    let monitor = InMemoryAuditMonitor::new();
    let recorder = recorder(sink.clone(), Arc::new(monitor.clone()), quick_retry(3));
    let dispatcher = AuditDispatcher::spawn(Arc::new(recorder), 1, 2);
    let handle = dispatcher.handle();

    handle.submit(finalized("queued-1")).unwrap();
    handle.submit(finalized("queued-2")).unwrap();
    let refused = handle.submit(finalized("overflow")).unwrap_err();
    assert!(matches!(refused, SubmitError::QueueFull(_)));
    assert_eq!(refused.audit().correlation_id().as_str(), "overflow");
    assert!(!handle.is_closed());
    dispatcher.shutdown().await;

    let overflow = monitor.events_of(AuditMonitorEventKind::AuditDispatchOverflow);
    assert_eq!(overflow.len(), 1);
    assert_eq!(overflow[0].correlation_id.as_str(), "overflow");
    assert_eq!(overflow[0].status, AuditStatus::Success);
    assert_eq!(sink.count_for("queued-1"), 1);
    assert_eq!(sink.count_for("queued-2"), 1);
    assert_eq!(sink.count_for("overflow"), 0);
    assert!(monitor.events_of(AuditMonitorEventKind::AuditDispatchClosed).is_empty());
}
