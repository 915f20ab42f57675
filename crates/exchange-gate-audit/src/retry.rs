// crates/exchange-gate-audit/src/retry.rs
// ============================================================================
// Module: Audit Delivery Retry Policy
// Description: Attempt budget, per-attempt timeout, and backoff schedule.
// Purpose: Bound how long the recorder keeps trying a single record.
// Dependencies: std
// ============================================================================

//! ## Overview
//! A [`RetryPolicy`] bounds delivery of one record: at most `max_attempts`
//! attempts, each individually limited by `attempt_timeout`, separated by a
//! [`Backoff`] delay. A timed-out attempt counts as one failed attempt.

use std::time::Duration;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Largest attempt budget accepted from configuration.
pub const MAX_RETRY_ATTEMPTS: u32 = 20;

// ============================================================================
// SECTION: Backoff
// ============================================================================

/// Delay schedule between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
    },
    /// Doubling delay capped at `max`.
    Exponential {
        /// Delay after the first failure.
        initial: Duration,
        /// Upper bound on any delay.
        max: Duration,
    },
}

impl Backoff {
    /// Returns the delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed {
                delay,
            } => delay,
            Self::Exponential {
                initial,
                max,
            } => {
                let exponent = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << exponent).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(2),
        }
    }
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Delivery retry settings.
///
/// # Invariants
/// - At least one attempt is always made, even when `max_attempts` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Time limit for each attempt.
    pub attempt_timeout: Duration,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy making exactly one attempt.
    #[must_use]
    pub const fn single_attempt(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            backoff: Backoff::Fixed {
                delay: Duration::ZERO,
            },
        }
    }

    /// Returns the attempt budget, never below one.
    #[must_use]
    pub const fn attempt_budget(&self) -> u32 {
        if self.max_attempts == 0 { 1 } else { self.max_attempts }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
        }
    }
}
