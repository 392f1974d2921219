// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Injectable wall-clock capability, so lease expiry is deterministically testable
//! instead of depending on ambient `SystemTime::now()` calls scattered through the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current wall-clock time, in whole seconds since the Unix epoch.
pub trait Clock {
    fn now(&self) -> u64;
}

/// Production clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
    }
}

/// Test clock with an explicitly advanceable time. Starts at a caller-chosen epoch.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self { now: AtomicU64::new(start) }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now(), 1000);
        clock.advance(5);
        assert_eq!(clock.now(), 1005);
        clock.set(2000);
        assert_eq!(clock.now(), 2000);
    }

    #[test]
    fn system_clock_is_plausible() {
        let clock = SystemClock;
        assert!(clock.now() > 1_700_000_000);
    }
}
