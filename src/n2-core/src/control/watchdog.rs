// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Liveness supervision of field data.

use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogState {
    Ok,
    Stale,
}

/// Result of one watchdog check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogReport {
    pub state: WatchdogState,
    /// True only on the check that moved the watchdog into `Stale`.
    pub became_stale: bool,
    pub age: Duration,
}

/// Tracks the age of the last successful read.
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    last_fresh: Instant,
    state: WatchdogState,
}

impl Watchdog {
    /// Before the first read, age is measured from `started`.
    pub fn new(timeout: Duration, started: Instant) -> Self {
        Self {
            timeout,
            last_fresh: started,
            state: WatchdogState::Ok,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn is_stale(&self) -> bool {
        self.state == WatchdogState::Stale
    }

    /// Record a successful read; the only way back to `Ok`.
    pub fn feed(&mut self, at: Instant) {
        self.last_fresh = at;
        self.state = WatchdogState::Ok;
    }

    pub fn check(&mut self, now: Instant) -> WatchdogReport {
        let age = now.saturating_duration_since(self.last_fresh);
        let mut became_stale = false;
        if age >= self.timeout && self.state == WatchdogState::Ok {
            self.state = WatchdogState::Stale;
            became_stale = true;
        }
        WatchdogReport {
            state: self.state,
            became_stale,
            age,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_after_timeout() {
        let start = Instant::now();
        let mut wd = Watchdog::new(Duration::from_secs(60), start);
        wd.feed(start);

        let r = wd.check(start + Duration::from_secs(59));
        assert_eq!(r.state, WatchdogState::Ok);
        assert!(!r.became_stale);

        let r = wd.check(start + Duration::from_secs(65));
        assert_eq!(r.state, WatchdogState::Stale);
        assert!(r.became_stale);
        assert_eq!(r.age, Duration::from_secs(65));
    }

    #[test]
    fn test_edge_reported_once() {
        let start = Instant::now();
        let mut wd = Watchdog::new(Duration::from_secs(60), start);
        assert!(wd.check(start + Duration::from_secs(60)).became_stale);
        assert!(!wd.check(start + Duration::from_secs(70)).became_stale);
        assert!(wd.is_stale());
    }

    #[test]
    fn test_fresh_read_recovers() {
        let start = Instant::now();
        let mut wd = Watchdog::new(Duration::from_secs(60), start);
        wd.check(start + Duration::from_secs(90));
        assert!(wd.is_stale());

        wd.feed(start + Duration::from_secs(91));
        assert_eq!(wd.state(), WatchdogState::Ok);
        assert_eq!(
            wd.check(start + Duration::from_secs(100)).state,
            WatchdogState::Ok
        );
    }

    #[test]
    fn test_measures_from_start_before_first_read() {
        let start = Instant::now();
        let mut wd = Watchdog::new(Duration::from_secs(10), start);
        assert_eq!(
            wd.check(start + Duration::from_secs(9)).state,
            WatchdogState::Ok
        );
        assert_eq!(
            wd.check(start + Duration::from_secs(10)).state,
            WatchdogState::Stale
        );
    }
}
