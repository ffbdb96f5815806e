// Copyright 2026 Axon Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: Deterministic, budgeted busy-wait loops for mailbox operations.
//!
//! The subsystem never sleeps: acknowledgement and reply waits are spin
//! loops bounded by an explicit deadline, checked periodically so the hot
//! path stays off the clock. Callers pick the clock source; tests use a
//! synthetic one and stay deterministic.
//!
//! OWNERS: @platform-ipc
//! STATUS: Functional
//! API_STABILITY: Internal (crate public, but intended for in-tree use)
//! TEST_COVERAGE: Unit tests (host)

use core::fmt;
use core::time::Duration;

const SPIN_CHECK_MASK: usize = 0x7f; // check time every 128 spins

/// Clock source used for budgeted loops.
pub trait Clock {
    /// Returns the current time in nanoseconds, monotonic.
    fn now_ns(&self) -> u64;
    /// Cooperative yield to allow other work to make progress.
    fn yield_now(&self);
}

/// A budgeted wait ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadline expired")
    }
}

fn duration_to_ns(d: Duration) -> u64 {
    d.as_secs().saturating_mul(1_000_000_000).saturating_add(d.subsec_nanos() as u64)
}

/// Computes a deadline timestamp based on `clock.now_ns() + budget`.
pub fn deadline_after(clock: &impl Clock, budget: Duration) -> u64 {
    clock.now_ns().saturating_add(duration_to_ns(budget))
}

/// Runs `poll` until it yields a value or the deadline expires.
///
/// `poll` returning `None` is the retryable condition; each miss yields
/// cooperatively before the next attempt.
pub fn poll_until<T>(
    clock: &impl Clock,
    deadline_ns: u64,
    mut poll: impl FnMut() -> Option<T>,
) -> Result<T, TimedOut> {
    let mut spins: usize = 0;
    loop {
        if let Some(v) = poll() {
            return Ok(v);
        }
        if (spins & SPIN_CHECK_MASK) == 0 && clock.now_ns() >= deadline_ns {
            return Err(TimedOut);
        }
        clock.yield_now();
        spins = spins.wrapping_add(1);
    }
}

/// Runs `poll` until it yields a value or the budget expires.
pub fn poll_budgeted<T>(
    clock: &impl Clock,
    budget: Duration,
    poll: impl FnMut() -> Option<T>,
) -> Result<T, TimedOut> {
    poll_until(clock, deadline_after(clock, budget), poll)
}

#[cfg(test)]
pub(crate) use test_clock::TestClock;
