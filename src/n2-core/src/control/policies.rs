// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Reconnect scheduling after field-bus failures.

use std::time::Duration;

/// Policy deciding how long to wait before the next connect attempt.
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before attempt number `failures` (1 after the first failure).
    fn delay(&self, failures: u32) -> Duration;
}

/// Constant wait between attempts.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

impl ReconnectPolicy for FixedBackoff {
    fn delay(&self, _failures: u32) -> Duration {
        self.delay
    }
}

/// Doubling wait, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(15), Duration::from_secs(120))
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn delay(&self, failures: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(failures.saturating_sub(1));
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_backoff() {
        let p = FixedBackoff::default();
        assert_eq!(p.delay(1), Duration::from_secs(15));
        assert_eq!(p.delay(7), Duration::from_secs(15));
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let p = ExponentialBackoff::default();
        assert_eq!(p.delay(1), Duration::from_secs(15));
        assert_eq!(p.delay(2), Duration::from_secs(30));
        assert_eq!(p.delay(3), Duration::from_secs(60));
        assert_eq!(p.delay(4), Duration::from_secs(120));
        assert_eq!(p.delay(40), Duration::from_secs(120));
    }
}
