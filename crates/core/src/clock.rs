// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source for lease expiry
//!
//! Leases store an absolute `Instant` deadline and compare it against
//! the clock on every access, so expiry can be tested without sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of "now" for lease deadlines
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Deadline of a lease granted now for `ttl`
    fn deadline(&self, ttl: Duration) -> Instant {
        self.now() + ttl
    }

    /// True once `deadline` is reached
    fn is_past(&self, deadline: Instant) -> bool {
        self.now() >= deadline
    }

    /// Time left until `deadline`, zero once it has passed
    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }
}

/// Real system clock
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock; clones share the same time
#[derive(Clone, Debug)]
pub struct FakeClock {
    current: Arc<Mutex<Instant>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += duration;
    }

    /// Jump to a specific instant
    pub fn set(&self, instant: Instant) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = instant;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
