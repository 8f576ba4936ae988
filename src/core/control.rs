//! # RadioControl: the mode control API.
//!
//! The one entry point embedders use. Every mode change goes through here:
//! arbitrate first, spawn second, release last.
//!
//! ## Architecture
//! ```text
//! start_mode(params)
//!   ├─► params.validated()                    (InvalidParams)
//!   ├─► lock control
//!   │     ├─► mode already running? → Ok(())  (idempotent)
//!   │     ├─► presence.check()                (DeviceUnavailable)
//!   │     ├─► arbiter.acquire(mode)           (Busy{current})
//!   │     └─► supervisor.start(mode, lease)   (Spawn → release lease)
//!   └─► Ok(())
//!
//! stop_mode(mode)
//!   ├─► lock control
//!   ├─► supervisor.stop(mode)                 (SIGTERM → grace → SIGKILL → reap)
//!   └─► arbiter.release(lease)
//!
//! events(filter)  ──► FanoutHub subscription ──► live stream (+ heartbeats)
//! audio_stream()  ──► AudioChunk bytes until the audio mode stops
//! start_sweep()   ──► SweepJob (progress + aggregate result)
//! shutdown()      ──► stop active mode ─► close hub ─► drain sinks
//! ```
//!
//! ## Rules
//! - Mode changes are serialized by one control lock; status reads never take it.
//! - Errors from arbitration and spawn are returned to the caller; crashes and
//!   overflow only show up in status and events.
//! - `stop_mode` does not depend on any subscriber still being connected.
//! - A dropped call never leaves the receiver held without a process: a
//!   lease is released unless the start it was taken for completes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::AudioFormat;
use crate::config::Config;
use crate::core::arbiter::{DeviceArbiter, LeaseToken};
use crate::core::shutdown;
use crate::core::state::ActorState;
use crate::core::sweep::{self, SweepJob};
use crate::core::supervisor::ProcessSupervisor;
use crate::error::{ControlError, SupervisorError};
use crate::events::{
    Category, DomainEvent, EventFilter, FanoutHub, HubStats, StreamItem, Subscription, live_stream,
};
use crate::mode::{Mode, Modulation};
use crate::params::{AudioParams, ModeParams, SweepParams};
use crate::parsers::{ParseStats, SweepResult};
use crate::services::DevicePresence;
use crate::sinks::SinkSet;

/// Extra time allowed on top of the grace period for the forced kill.
const KILL_MARGIN: Duration = Duration::from_secs(2);

/// Per-mode part of [`ControlStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeStatus {
    pub mode: Mode,
    pub running: bool,
    pub process: ActorState,
    pub parse: ParseStats,
}

/// Snapshot returned by [`RadioControl::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlStatus {
    /// Mode holding the receiver, if any.
    pub active_mode: Option<Mode>,
    /// When the current lease was acquired, ms since the Unix epoch.
    pub lease_acquired_at_ms: Option<u64>,
    /// One entry per mode, in [`Mode::ALL`] order.
    pub modes: Vec<ModeStatus>,
    pub hub: HubStats,
}

impl ControlStatus {
    pub fn is_running(&self, mode: Mode) -> bool {
        self.modes.iter().any(|m| m.mode == mode && m.running)
    }
}

/// Lease taken for a start that has not completed yet.
///
/// Released on drop unless [`commit`](Self::commit)ted, so an error return or
/// a cancelled caller both give the receiver back.
struct PendingLease<'a> {
    arbiter: &'a DeviceArbiter,
    token: LeaseToken,
    armed: bool,
}

impl<'a> PendingLease<'a> {
    fn new(arbiter: &'a DeviceArbiter, token: LeaseToken) -> Self {
        Self {
            arbiter,
            token,
            armed: true,
        }
    }

    fn token(&self) -> &LeaseToken {
        &self.token
    }

    /// The process now owns the lease.
    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingLease<'_> {
    fn drop(&mut self) {
        if self.armed && self.arbiter.release(&self.token).is_ok() {
            debug!("pending lease released");
        }
    }
}

/// Keeps audio subscribers attached while a retune swaps the process.
struct RetuneFlag<'a>(&'a AtomicBool);

impl<'a> RetuneFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for RetuneFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Inner {
    cfg: Config,
    arbiter: Arc<DeviceArbiter>,
    supervisor: ProcessSupervisor,
    hub: FanoutHub,
    presence: Arc<dyn DevicePresence>,
    control: Mutex<()>,
    audio: StdMutex<Option<AudioParams>>,
    retuning: AtomicBool,
    sinks: StdMutex<Option<SinkSet>>,
}

/// Mode control facade over the arbiter, the supervisor and the hub.
///
/// Cheap to clone; all clones drive the same receiver.
#[derive(Clone)]
pub struct RadioControl {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RadioControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioControl")
            .field("active_mode", &self.inner.arbiter.status())
            .finish_non_exhaustive()
    }
}

impl RadioControl {
    pub(crate) fn new_internal(
        cfg: Config,
        hub: FanoutHub,
        presence: Arc<dyn DevicePresence>,
        sinks: SinkSet,
    ) -> Self {
        let arbiter = Arc::new(DeviceArbiter::new());
        let supervisor =
            ProcessSupervisor::new(Arc::clone(&arbiter), hub.clone(), cfg.grace, cfg.restart);
        Self {
            inner: Arc::new(Inner {
                cfg,
                arbiter,
                supervisor,
                hub,
                presence,
                control: Mutex::new(()),
                audio: StdMutex::new(None),
                retuning: AtomicBool::new(false),
                sinks: StdMutex::new(Some(sinks)),
            }),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    /// The event hub; publish-side access is for embedders injecting their own events.
    pub fn hub(&self) -> &FanoutHub {
        &self.inner.hub
    }

    /// Starts a mode. Starting the running mode again is a no-op success.
    ///
    /// A sweep started this way runs detached; its rows still reach the hub.
    /// Use [`start_sweep`](Self::start_sweep) to get the aggregate result.
    pub async fn start_mode(&self, params: ModeParams) -> Result<(), ControlError> {
        let params = params.validated()?;
        if let ModeParams::ScanSweep(p) = &params {
            return match self.start_sweep(p.clone()).await {
                Ok(_job) => Ok(()),
                Err(ControlError::Supervisor(SupervisorError::AlreadyRunning { .. })) => Ok(()),
                Err(e) => Err(e),
            };
        }

        let mode = params.mode();
        let _guard = self.inner.control.lock().await;
        if self.inner.supervisor.is_running(mode) {
            debug!(%mode, "start ignored, already running");
            return Ok(());
        }
        self.check_presence().await?;

        let lease = PendingLease::new(&self.inner.arbiter, self.inner.arbiter.acquire(mode)?);
        let launch = params.launch(&self.inner.cfg);
        info!(%mode, command = %launch.command, "starting mode");
        if let Err(e) = self.inner.supervisor.start(mode, lease.token(), launch).await {
            warn!(%mode, error = %e, "start failed");
            return Err(e.into());
        }
        lease.commit();
        if let ModeParams::AudioListen(p) = params {
            *self.audio_params() = Some(p);
        }
        Ok(())
    }

    /// Stops a mode and releases its lease.
    pub async fn stop_mode(&self, mode: Mode) -> Result<(), ControlError> {
        let _guard = self.inner.control.lock().await;
        self.stop_locked(mode).await
    }

    async fn stop_locked(&self, mode: Mode) -> Result<(), ControlError> {
        let outcome = self.inner.supervisor.stop(mode).await.map_err(|e| match e {
            SupervisorError::NotRunning { mode } => ControlError::NotRunning { mode },
            other => other.into(),
        })?;
        if let Some(lease) = outcome.lease {
            if let Err(e) = self.inner.arbiter.release(&lease) {
                warn!(%mode, error = %e, "lease already gone");
            }
        }
        if mode == Mode::AudioListen {
            *self.audio_params() = None;
        }
        Ok(())
    }

    /// Status snapshot; never waits on a mode change in progress.
    pub fn status(&self) -> ControlStatus {
        let lease = self.inner.arbiter.snapshot();
        let sup = &self.inner.supervisor;
        ControlStatus {
            active_mode: lease.mode,
            lease_acquired_at_ms: lease.acquired_at_ms,
            modes: Mode::ALL
                .iter()
                .map(|&mode| ModeStatus {
                    mode,
                    running: sup.is_running(mode),
                    process: sup.info(mode),
                    parse: sup.parse_stats(mode),
                })
                .collect(),
            hub: self.inner.hub.stats(),
        }
    }

    /// True while `mode` has a live process.
    pub fn is_running(&self, mode: Mode) -> bool {
        self.inner.supervisor.is_running(mode)
    }

    /// Raw hub subscription.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.inner.hub.subscribe(filter)
    }

    /// Live event stream with heartbeats every [`Config::heartbeat`] of silence.
    pub fn events(&self, filter: EventFilter) -> impl Stream<Item = StreamItem> + Send + use<> {
        live_stream(self.subscribe(filter), self.inner.cfg.heartbeat_interval())
    }

    /// PCM byte stream of the running audio mode.
    ///
    /// The stream survives [`retune_audio`](Self::retune_audio) and ends when
    /// the audio mode stops or the hub closes. Dropping it unsubscribes.
    pub fn audio_stream(
        &self,
    ) -> Result<(AudioFormat, impl Stream<Item = Bytes> + Send + use<>), ControlError> {
        let sub = self
            .inner
            .hub
            .subscribe(EventFilter::only(&[Category::Audio, Category::Status]));
        let format = self
            .audio_params()
            .as_ref()
            .map(AudioParams::format)
            .filter(|_| self.is_running(Mode::AudioListen))
            .ok_or(ControlError::NotRunning {
                mode: Mode::AudioListen,
            })?;

        let inner = Arc::clone(&self.inner);
        let stream = futures::stream::unfold((sub, inner), |(mut sub, inner)| async move {
            loop {
                let ev = sub.recv().await?;
                match ev.as_ref() {
                    DomainEvent::AudioChunk(chunk) => {
                        return Some((chunk.bytes.clone(), (sub, inner)));
                    }
                    DomainEvent::StatusChange(s) if s.mode == Mode::AudioListen && !s.running => {
                        let retuning = inner.retuning.load(Ordering::Acquire);
                        if !retuning && !inner.supervisor.is_running(Mode::AudioListen) {
                            return None;
                        }
                    }
                    _ => {}
                }
            }
        });
        Ok((format, stream))
    }

    /// Moves the running audio mode to another frequency (and optionally
    /// modulation) without giving up the receiver.
    pub async fn retune_audio(
        &self,
        frequency: u64,
        modulation: Option<Modulation>,
    ) -> Result<(), ControlError> {
        let _guard = self.inner.control.lock().await;
        let current = self
            .audio_params()
            .clone()
            .filter(|_| self.is_running(Mode::AudioListen))
            .ok_or(ControlError::NotRunning {
                mode: Mode::AudioListen,
            })?;
        let next = ModeParams::AudioListen(AudioParams {
            frequency,
            modulation: modulation.unwrap_or(current.modulation),
            ..current
        })
        .validated()?;

        let _retuning = RetuneFlag::raise(&self.inner.retuning);
        self.retune_locked(next).await
    }

    async fn retune_locked(&self, params: ModeParams) -> Result<(), ControlError> {
        let mode = Mode::AudioListen;
        let outcome = self.inner.supervisor.stop(mode).await?;
        let Some(lease) = outcome.lease else {
            *self.audio_params() = None;
            return Err(ControlError::NotRunning { mode });
        };
        let lease = PendingLease::new(&self.inner.arbiter, lease);

        let launch = params.launch(&self.inner.cfg);
        info!(%mode, command = %launch.command, "retuning");
        if let Err(e) = self.inner.supervisor.start(mode, lease.token(), launch).await {
            warn!(%mode, error = %e, "retune failed, receiver released");
            *self.audio_params() = None;
            return Err(e.into());
        }
        lease.commit();
        if let ModeParams::AudioListen(p) = params {
            *self.audio_params() = Some(p);
        }
        Ok(())
    }

    /// Starts a sweep and returns its job handle.
    ///
    /// The lease is released when the sweep ends, successfully or not.
    pub async fn start_sweep(&self, params: SweepParams) -> Result<SweepJob, ControlError> {
        let mode = Mode::ScanSweep;
        let validated = ModeParams::ScanSweep(params.clone()).validated()?;
        let _guard = self.inner.control.lock().await;
        if self.inner.supervisor.is_running(mode) {
            return Err(SupervisorError::AlreadyRunning { mode }.into());
        }
        self.check_presence().await?;

        let lease = PendingLease::new(&self.inner.arbiter, self.inner.arbiter.acquire(mode)?);
        let launch = validated.launch(&self.inner.cfg);
        info!(%mode, command = %launch.command, "starting sweep");
        let batch = match self.inner.supervisor.start_batch(mode, lease.token(), launch).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(%mode, error = %e, "sweep failed to start");
                return Err(e.into());
            }
        };
        lease.commit();

        let control = self.clone();
        let cleanup = async move {
            let _guard = control.inner.control.lock().await;
            match control.stop_locked(mode).await {
                Ok(()) | Err(ControlError::NotRunning { .. }) => {}
                Err(e) => warn!(%mode, error = %e, "sweep cleanup failed"),
            }
        };
        Ok(sweep::track(
            batch,
            self.inner.supervisor.watch(mode),
            sweep::expected_duration(&params),
            self.inner.cfg.peaks,
            cleanup,
        ))
    }

    /// Runs a sweep to completion.
    pub async fn run_sweep(&self, params: SweepParams) -> Result<SweepResult, ControlError> {
        self.start_sweep(params).await?.wait().await
    }

    /// Stops every mode within the grace period, closes the hub and drains sinks.
    ///
    /// Returns `GraceExceeded` with the modes that could not be stopped in time.
    pub async fn shutdown(&self) -> Result<(), ControlError> {
        let grace = self.inner.cfg.grace;
        let guard = self.inner.control.lock().await;
        let mut stuck = Vec::new();
        for mode in Mode::ALL {
            match tokio::time::timeout(grace + KILL_MARGIN, self.stop_locked(mode)).await {
                Ok(Ok(())) => info!(%mode, "stopped for shutdown"),
                Ok(Err(ControlError::NotRunning { .. })) => {}
                Ok(Err(e)) => warn!(%mode, error = %e, "stop failed during shutdown"),
                Err(_) => stuck.push(mode),
            }
        }
        drop(guard);

        self.inner.hub.close();
        let sinks = self
            .inner
            .sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sinks) = sinks {
            sinks.shutdown(grace).await;
        }

        if stuck.is_empty() {
            info!("all modes stopped within grace");
            Ok(())
        } else {
            warn!(?grace, ?stuck, "shutdown grace exceeded");
            Err(ControlError::GraceExceeded { grace, stuck })
        }
    }

    /// Waits for a termination signal, then runs [`shutdown`](Self::shutdown).
    pub async fn run_until_signal(&self) -> Result<(), ControlError> {
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "termination signal received"),
            Err(e) => warn!(error = %e, "signal handlers unavailable, shutting down now"),
        }
        self.shutdown().await
    }

    async fn check_presence(&self) -> Result<(), ControlError> {
        self.inner
            .presence
            .check()
            .await
            .map_err(|e| ControlError::DeviceUnavailable {
                reason: e.to_string(),
            })
    }

    fn audio_params(&self) -> std::sync::MutexGuard<'_, Option<AudioParams>> {
        self.inner.audio.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_lease_released_on_drop() {
        let arbiter = DeviceArbiter::new();
        let lease = PendingLease::new(&arbiter, arbiter.acquire(Mode::Decode).unwrap());
        assert_eq!(arbiter.status(), Some(Mode::Decode));
        drop(lease);
        assert_eq!(arbiter.status(), None);
    }

    #[test]
    fn test_committed_lease_stays_held() {
        let arbiter = DeviceArbiter::new();
        let token = arbiter.acquire(Mode::AudioListen).unwrap();
        PendingLease::new(&arbiter, token.clone()).commit();
        assert!(arbiter.holds(Mode::AudioListen, &token));
    }

    #[test]
    fn test_retune_flag_lowered_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _raised = RetuneFlag::raise(&flag);
            assert!(flag.load(Ordering::Acquire));
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
