//! # DeviceArbiter: exclusive ownership of the receiver.
//!
//! The arbiter is the only component that may authorize a process to touch the
//! hardware. It holds at most one lease at a time:
//!
//! ```text
//!            acquire(mode) ──► Ok(token)
//!   ┌──────┐ ───────────────────────────► ┌──────────────┐
//!   │ Free │                              │ Held(mode)   │
//!   └──────┘ ◄─────────────────────────── └──────────────┘
//!            release(token) / force_release(token)   (crash recovery)
//!
//!   acquire while Held(m)        → Err(Busy { current: m })   (also for the same mode)
//!   release with foreign token   → Err(InvalidToken)          (no state change)
//! ```
//!
//! ## Rules
//! - Not reentrant: callers keep their own token.
//! - Tokens are random 128-bit values; they cannot be guessed from the mode or time.
//! - Every transition happens under one mutex; the critical sections never await.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ArbiterError;
use crate::events::now_ms;
use crate::mode::Mode;

/// Opaque proof of lease ownership.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LeaseToken(u128);

impl LeaseToken {
    fn fresh() -> Self {
        LeaseToken(rand::random())
    }
}

impl fmt::Debug for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LeaseToken({:08x}…)", (self.0 >> 96) as u32)
    }
}

#[derive(Debug)]
struct Held {
    mode: Mode,
    token: LeaseToken,
    acquired_at_ms: u64,
}

#[derive(Debug, Default)]
struct State {
    held: Option<Held>,
    generation: u64,
}

/// Observable arbiter state, comparable across calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSnapshot {
    /// Mode holding the lease.
    pub mode: Option<Mode>,
    /// When the lease was acquired, ms since the Unix epoch.
    pub acquired_at_ms: Option<u64>,
    /// Number of successful acquisitions so far.
    pub generation: u64,
}

/// Exclusive-ownership state machine over the physical receiver.
#[derive(Debug, Default)]
pub struct DeviceArbiter {
    state: Mutex<State>,
}

impl DeviceArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the receiver for `mode`.
    ///
    /// Fails with [`ArbiterError::Busy`] whenever a lease is held, including by `mode` itself.
    pub fn acquire(&self, mode: Mode) -> Result<LeaseToken, ArbiterError> {
        let mut st = self.state();
        if let Some(held) = &st.held {
            debug!(requested = %mode, current = %held.mode, "lease busy");
            return Err(ArbiterError::Busy { current: held.mode });
        }
        let token = LeaseToken::fresh();
        st.generation += 1;
        st.held = Some(Held {
            mode,
            token: token.clone(),
            acquired_at_ms: now_ms(),
        });
        info!(%mode, generation = st.generation, "lease acquired");
        Ok(token)
    }

    /// Returns the receiver to `Free` if `token` is the current holder's.
    pub fn release(&self, token: &LeaseToken) -> Result<(), ArbiterError> {
        let mut st = self.state();
        match &st.held {
            Some(held) if held.token == *token => {
                info!(mode = %held.mode, "lease released");
                st.held = None;
                Ok(())
            }
            _ => {
                warn!("release with stale or foreign lease token rejected");
                Err(ArbiterError::InvalidToken)
            }
        }
    }

    /// Crash-recovery release; returns whether anything was released.
    pub(crate) fn force_release(&self, token: &LeaseToken) -> bool {
        let mut st = self.state();
        match &st.held {
            Some(held) if held.token == *token => {
                warn!(mode = %held.mode, "lease force-released after process exit");
                st.held = None;
                true
            }
            _ => false,
        }
    }

    /// Mode holding the lease, if any.
    pub fn status(&self) -> Option<Mode> {
        self.state().held.as_ref().map(|h| h.mode)
    }

    /// True if `token` is the current lease for `mode`.
    pub fn holds(&self, mode: Mode, token: &LeaseToken) -> bool {
        self.state()
            .held
            .as_ref()
            .is_some_and(|h| h.mode == mode && h.token == *token)
    }

    pub fn snapshot(&self) -> LeaseSnapshot {
        let st = self.state();
        LeaseSnapshot {
            mode: st.held.as_ref().map(|h| h.mode),
            acquired_at_ms: st.held.as_ref().map(|h| h.acquired_at_ms),
            generation: st.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_busy_reports_current_mode_even_for_same_mode() {
        let arb = DeviceArbiter::new();
        let _t = arb.acquire(Mode::Decode).unwrap();

        assert_eq!(
            arb.acquire(Mode::LiveSpectrum),
            Err(ArbiterError::Busy { current: Mode::Decode })
        );
        assert_eq!(
            arb.acquire(Mode::Decode),
            Err(ArbiterError::Busy { current: Mode::Decode })
        );
    }

    #[test]
    fn test_release_then_any_mode_can_acquire() {
        let arb = DeviceArbiter::new();
        let t = arb.acquire(Mode::AudioListen).unwrap();
        arb.release(&t).unwrap();
        assert_eq!(arb.status(), None);

        let t2 = arb.acquire(Mode::ScanSweep).unwrap();
        assert!(arb.holds(Mode::ScanSweep, &t2));
        assert!(!arb.holds(Mode::ScanSweep, &t));
    }

    #[test]
    fn test_foreign_and_stale_tokens_change_nothing() {
        let arb = DeviceArbiter::new();
        let stale = arb.acquire(Mode::Decode).unwrap();
        arb.release(&stale).unwrap();
        let _live = arb.acquire(Mode::LiveSpectrum).unwrap();

        let before = arb.snapshot();
        assert_eq!(arb.release(&stale), Err(ArbiterError::InvalidToken));
        assert_eq!(arb.release(&LeaseToken(42)), Err(ArbiterError::InvalidToken));
        assert!(!arb.force_release(&stale));
        assert_eq!(arb.snapshot(), before);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let arb = DeviceArbiter::new();
        let t = arb.acquire(Mode::Decode).unwrap();
        assert!(arb.release(&t).is_ok());
        assert_eq!(arb.release(&t), Err(ArbiterError::InvalidToken));
    }

    #[test]
    fn test_concurrent_acquire_has_single_winner() {
        let arb = Arc::new(DeviceArbiter::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let arb = Arc::clone(&arb);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    let mode = Mode::ALL[i % Mode::ALL.len()];
                    if arb.acquire(mode).is_ok() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interleaved_holders_never_overlap() {
        let arb = Arc::new(DeviceArbiter::new());
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = Mode::ALL
            .into_iter()
            .map(|mode| {
                let arb = Arc::clone(&arb);
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Ok(token) = arb.acquire(mode) {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            assert_eq!(arb.status(), Some(mode));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            arb.release(&token).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(arb.status(), None);
    }
}
