//! # Backoff schedule for restarting crashed processes.
//!
//! The delay before restart `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`, then jittered. The base is derived from the attempt number alone, so
//! jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use radiovisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(500),
//!     max: Duration::from_secs(8),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(500));
//! assert_eq!(backoff.next(2), Duration::from_secs(2));
//! assert_eq!(backoff.next(10), Duration::from_secs(8));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::jitter::JitterPolicy;

/// Exponential backoff schedule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first restart.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` expected).
    pub factor: f64,
    /// Randomization applied after clamping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 500ms`, `factor = 2.0`, `max = 30s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to [`BackoffPolicy::max`].
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling(first_ms: u64, max_secs: u64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_secs(max_secs),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_exponential_growth() {
        let policy = doubling(100, 30);
        let got: Vec<u64> = (0..5).map(|n| policy.next(n).as_millis() as u64).collect();
        assert_eq!(got, vec![100, 200, 400, 800, 1600]);
    }

    #[test]
    fn test_first_exceeds_max() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            ..doubling(0, 5)
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_overflow_clamps_to_max() {
        let policy = doubling(100, 10);
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_equal_jitter_respects_bounds() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..doubling(1000, 30)
        };
        for _ in 0..50 {
            let d = policy.next(0);
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1000));
        }
    }
}
