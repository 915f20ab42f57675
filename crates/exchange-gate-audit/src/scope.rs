// crates/exchange-gate-audit/src/scope.rs
// ============================================================================
// Module: Audit Scope Guard
// Description: Request-scoped owner of an audit context.
// Purpose: Finalize and submit exactly one audit on every exit path.
// Dependencies: exchange-gate-core
// ============================================================================

//! ## Overview
//! An [`AuditScope`] owns the request's [`AuditContext`] from entry to exit.
//! Completing the scope with [`AuditScope::finish`] (or the `succeed` / `fail`
//! shorthands) finalizes the context with the given outcome and submits it.
//! Any other way of leaving the scope, including early return, `?`, panic
//! unwinding, or a dropped future, runs `Drop`, which finalizes the context
//! as `FAILURE` with reason `cancelled` and submits it. Both paths go through
//! one submission step guarded by a flag, so a scope yields exactly one audit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::mem;
use std::thread;

use exchange_gate_core::AuditContext;
use exchange_gate_core::AuditOutcome;
use exchange_gate_core::CorrelationId;
use exchange_gate_core::FailureReason;
use exchange_gate_core::Timestamp;

use crate::dispatch::AuditHandle;
use crate::dispatch::SubmitError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Failure detail recorded when a scope unwinds from a panic.
pub const PANIC_DETAIL: &str = "request panicked before completion";
/// Failure detail recorded when a scope is dropped before completion.
pub const DROPPED_DETAIL: &str = "request abandoned before completion";

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Guard that finalizes its audit context exactly once.
///
/// # Invariants
/// - `context` always holds the request's live context; once `submitted` is
///   set it is an empty placeholder that is never submitted.
pub struct AuditScope {
    /// Context accumulated by the request path.
    context: AuditContext,
    /// Set once the context has been finalized and handed to dispatch.
    submitted: bool,
    /// Correlation identifier fixed at entry.
    correlation_id: CorrelationId,
    /// Entry instant.
    started_at: Timestamp,
    /// Submission handle.
    handle: AuditHandle,
}

impl AuditScope {
    /// Opens a scope, fixing the start instant from the handle's clock.
    #[must_use]
    pub fn open(handle: AuditHandle, correlation_id: CorrelationId) -> Self {
        let started_at = handle.clock().now();
        Self {
            context: AuditContext::new(correlation_id.clone(), started_at),
            submitted: false,
            correlation_id,
            started_at,
            handle,
        }
    }

    /// Returns the correlation identifier.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Returns the context for inspection.
    #[must_use]
    pub const fn context(&self) -> &AuditContext {
        &self.context
    }

    /// Returns the context for mutation.
    pub const fn context_mut(&mut self) -> &mut AuditContext {
        &mut self.context
    }

    /// Finalizes with `SUCCESS` and submits.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when dispatch refuses the record.
    pub fn succeed(self) -> Result<(), SubmitError> {
        self.finish(AuditOutcome::Success)
    }

    /// Finalizes with `FAILURE` and submits.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when dispatch refuses the record.
    pub fn fail(self, reason: FailureReason, detail: Option<String>) -> Result<(), SubmitError> {
        self.finish(AuditOutcome::failure(reason, detail))
    }

    /// Finalizes with the given outcome and submits.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when dispatch refuses the record.
    pub fn finish(mut self, outcome: AuditOutcome) -> Result<(), SubmitError> {
        self.submit(outcome)
    }

    /// Finalizes the live context and submits it, at most once per scope.
    fn submit(&mut self, outcome: AuditOutcome) -> Result<(), SubmitError> {
        if self.submitted {
            return Ok(());
        }
        self.submitted = true;
        let placeholder = AuditContext::new(self.correlation_id.clone(), self.started_at);
        let context = mem::replace(&mut self.context, placeholder);
        let finalized = context.finalize(outcome, self.handle.clock().now());
        self.handle.submit(finalized)
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if self.submitted {
            return;
        }
        let detail = if thread::panicking() { PANIC_DETAIL } else { DROPPED_DETAIL };
        let outcome = AuditOutcome::failure(FailureReason::Cancelled, Some(detail.to_string()));
        let _ = self.submit(outcome);
    }
}
