//! # Sweep jobs: one batch scan with progress.
//!
//! A sweep runs the scanner to completion and reports one aggregate
//! [`SweepResult`]. The scanner prints nothing useful until each hop is
//! integrated, so progress is estimated from elapsed time and the CSV rows
//! read so far.
//!
//! ```text
//! start_sweep ──► SweepJob { progress: watch, result: oneshot }
//!                     ▲
//!   tracker task ─────┤ every 250ms: SweepProgress { elapsed, expected, rows_seen }
//!                     │
//!                     └─ batch done ─► cleanup (stop slot, release lease) ─► result
//! ```
//!
//! ## Rules
//! - The lease is released by the tracker after the batch ends, whatever the outcome.
//! - A sweep stopped before completion resolves to [`ControlError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::core::actor::BatchResult;
use crate::core::state::ActorState;
use crate::error::ControlError;
use crate::events::DomainEvent;
use crate::params::SweepParams;
use crate::parsers::{PeakConfig, SweepResult};

/// Bandwidth the scanner covers per hop (Hz).
pub const HOP_BANDWIDTH_HZ: u64 = 2_000_000;

const PROGRESS_TICK: Duration = Duration::from_millis(250);

/// Progress of a running sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SweepProgress {
    /// Time since the scanner started.
    pub elapsed: Duration,
    /// Estimated total duration.
    pub expected: Duration,
    /// CSV rows read so far.
    pub rows_seen: u64,
}

impl SweepProgress {
    /// Estimated completion in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.expected.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.expected.as_secs_f64()).min(1.0)
    }
}

/// Estimated duration of a sweep: one integration period per hop.
pub fn expected_duration(params: &SweepParams) -> Duration {
    let span = params.end_freq.saturating_sub(params.start_freq);
    let hops = span.div_ceil(HOP_BANDWIDTH_HZ).max(1);
    Duration::from_secs(hops.saturating_mul(u64::from(params.integration_secs)))
}

/// Handle to a sweep in progress.
#[derive(Debug)]
pub struct SweepJob {
    progress: watch::Receiver<SweepProgress>,
    result: oneshot::Receiver<Result<SweepResult, ControlError>>,
}

impl SweepJob {
    /// Watches progress; the last value is kept after the sweep ends.
    pub fn progress(&self) -> watch::Receiver<SweepProgress> {
        self.progress.clone()
    }

    /// Waits for the aggregate result.
    pub async fn wait(self) -> Result<SweepResult, ControlError> {
        self.result.await.unwrap_or(Err(ControlError::Cancelled))
    }
}

/// Spawns the tracker of a started batch.
///
/// `cleanup` runs once the batch has ended and must free the slot and the lease.
pub(crate) fn track<F>(
    batch: oneshot::Receiver<BatchResult>,
    state: watch::Receiver<ActorState>,
    expected: Duration,
    peaks: PeakConfig,
    cleanup: F,
) -> SweepJob
where
    F: Future<Output = ()> + Send + 'static,
{
    let (progress_tx, progress) = watch::channel(SweepProgress {
        expected,
        ..SweepProgress::default()
    });
    let (result_tx, result) = oneshot::channel();

    tokio::spawn(async move {
        let started = Instant::now();
        let snapshot = |state: &watch::Receiver<ActorState>| SweepProgress {
            elapsed: started.elapsed(),
            expected,
            rows_seen: state.borrow().lines,
        };

        let mut tick = tokio::time::interval(PROGRESS_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut batch = batch;
        let outcome = loop {
            tokio::select! {
                res = &mut batch => break res,
                _ = tick.tick() => {
                    progress_tx.send_replace(snapshot(&state));
                }
            }
        };
        progress_tx.send_replace(snapshot(&state));
        cleanup.await;

        let result = match outcome {
            Ok(Ok(events)) => {
                let rows = events
                    .into_iter()
                    .filter_map(|ev| match ev {
                        DomainEvent::SpectrumRow(row) => Some(row),
                        _ => None,
                    })
                    .collect();
                Ok(SweepResult::from_rows(rows, &peaks))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ControlError::Cancelled),
        };
        debug!(ok = result.is_ok(), "sweep finished");
        let _ = result_tx.send(result);
    });

    SweepJob { progress, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SupervisorError;
    use crate::events::SpectrumRow;
    use crate::mode::Mode;

    #[test]
    fn test_expected_duration_counts_hops() {
        let p = SweepParams {
            start_freq: 88_000_000,
            end_freq: 108_000_000,
            integration_secs: 2,
            ..SweepParams::default()
        };
        assert_eq!(expected_duration(&p), Duration::from_secs(20));

        let narrow = SweepParams {
            start_freq: 433_000_000,
            end_freq: 434_000_000,
            integration_secs: 1,
            ..SweepParams::default()
        };
        assert_eq!(expected_duration(&narrow), Duration::from_secs(1));
    }

    #[test]
    fn test_fraction_is_capped() {
        let p = SweepProgress {
            elapsed: Duration::from_secs(30),
            expected: Duration::from_secs(10),
            rows_seen: 0,
        };
        assert_eq!(p.fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_track_builds_result_and_runs_cleanup() {
        let (tx, rx) = oneshot::channel();
        let (_state_tx, state) = watch::channel(ActorState::default());
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let job = track(rx, state, Duration::from_secs(1), PeakConfig::default(), async move {
            let _ = done_tx.send(());
        });

        let rows = (0..21)
            .map(|i| {
                DomainEvent::SpectrumRow(SpectrumRow {
                    freq_hz: 100.0 + f64::from(i),
                    power_db: if i == 10 { -20.0 } else { -60.0 },
                })
            })
            .collect();
        tx.send(Ok(rows)).unwrap();

        let result = job.wait().await.unwrap();
        assert_eq!(result.total_points, 21);
        assert_eq!(result.peaks.len(), 1);
        assert_eq!(result.peaks[0].freq_hz, 110.0);
        done_rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_track_maps_failures() {
        let (tx, rx) = oneshot::channel();
        let (_state_tx, state) = watch::channel(ActorState::default());
        let job = track(rx, state, Duration::ZERO, PeakConfig::default(), async {});
        tx.send(Err(SupervisorError::Crashed {
            mode: Mode::ScanSweep,
            code: Some(1),
        }))
        .unwrap();
        let err = job.wait().await.unwrap_err();
        assert_eq!(err.as_label(), "supervisor_process_crashed");

        let (tx, rx) = oneshot::channel::<BatchResult>();
        let (_state_tx, state) = watch::channel(ActorState::default());
        let job = track(rx, state, Duration::ZERO, PeakConfig::default(), async {});
        drop(tx);
        assert_eq!(job.wait().await.unwrap_err(), ControlError::Cancelled);
    }
}
