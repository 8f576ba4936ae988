//! Retry policies.
//!
//! This module groups the knobs that control **whether** a crashed receiver
//! process is restarted and **how long** to wait between attempts.
//!
//! ## Contents
//! - [`RetryPolicy`]   bounded attempt count plus a backoff schedule
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization of the computed delay
//!
//! ## Quick wiring
//! ```text
//! Config { restart: RetryPolicy }
//!      └─► core::actor::ProcessActor on unexpected exit:
//!           - restart.delay_for(n) → None  ⇒ give up, lease stays released
//!           - restart.delay_for(n) → Some(d) ⇒ sleep d, re-acquire lease, respawn
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::never()`: a crash is reported, never retried.
//! - `BackoffPolicy::default()` → first=500ms, factor=2.0, max=30s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
