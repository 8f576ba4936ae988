//! # Bounded retry policy.
//!
//! [`RetryPolicy`] is the one place that decides whether another attempt is
//! allowed and how long to wait for it. The supervisor uses it to restart a
//! crashed receiver process; restarts are off unless the caller opts in, so an
//! unplugged dongle never causes a crash loop.
//!
//! ```text
//! crash #1 ─► delay_for(0) = Some(first)        ─► restart
//! crash #2 ─► delay_for(1) = Some(first×factor) ─► restart
//! crash #n ─► delay_for(n-1) = None (n > max_attempts) ─► give up
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::backoff::BackoffPolicy;

/// Maximum attempts plus the delay schedule between them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of retries allowed (`0` = never retry).
    pub max_attempts: u32,
    /// Delay schedule between retries.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Returns [`RetryPolicy::never`].
    fn default() -> Self {
        Self::never()
    }
}

impl RetryPolicy {
    /// No retries.
    pub fn never() -> Self {
        Self {
            max_attempts: 0,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Up to `max_attempts` retries spaced by `backoff`.
    pub fn bounded(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// True if any retry is allowed.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before retry number `done + 1`, or `None` once `done` retries were used.
    pub fn delay_for(&self, done: u32) -> Option<Duration> {
        (done < self.max_attempts).then(|| self.backoff.next(done))
    }
}
