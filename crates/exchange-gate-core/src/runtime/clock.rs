// crates/exchange-gate-core/src/runtime/clock.rs
// ============================================================================
// Module: Exchange Gate Clocks
// Description: Time sources supplied to the gate by its host.
// Purpose: Keep wall-clock reads at the edge so decisions stay replayable.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Hosts hand a [`Clock`] to the gate; the evaluator only ever sees the
//! `now` value the gate read from it. [`ManualClock`] lets tests pin and
//! advance time explicitly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use time::Duration;

use crate::core::Timestamp;

// ============================================================================
// SECTION: Clock Trait
// ============================================================================

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now_utc()
    }
}

// ============================================================================
// SECTION: Manual Clock
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    /// Current instant.
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Creates a clock pinned at `now`.
    #[must_use]
    pub const fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: Timestamp) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    /// Advances the clock by `duration`; overflow leaves it unchanged.
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut guard) = self.now.lock()
            && let Some(next) = guard.checked_add(duration)
        {
            *guard = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.lock().map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }
}
