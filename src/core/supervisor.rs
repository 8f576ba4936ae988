//! # ProcessSupervisor: zero-or-one process per mode.
//!
//! Owns one slot per [`Mode`]. A slot holds the actor task supervising that
//! mode's process, its stop token and the lease backing it.
//!
//! ## Architecture
//! ```text
//! start(mode, &lease, launch)
//!   ├─► assert!(arbiter.holds(mode, lease))     (programming error otherwise)
//!   ├─► lock slot[mode]
//!   │     ├─► live?  → Ok(())                   (idempotent)
//!   │     └─► finished / in restart backoff? → cancel + reap
//!   ├─► ProcessHandle::spawn(command)           (error → SupervisorError::Spawn)
//!   └─► tokio::spawn(ProcessActor::run(process, stop))
//!
//! stop(mode)
//!   ├─► lock slot[mode], take it
//!   ├─► stop.cancel() ─► actor: SIGTERM → grace → SIGKILL → reap
//!   ├─► tokio::spawn(await actor) ──oneshot──► caller
//!   └─► StopOutcome { exit_code, lease }        (caller releases the lease;
//!                                                 the task does if caller is gone)
//! ```
//!
//! ## Rules
//! - Every mutation of a mode's slot happens under that mode's lock.
//! - `stop` never depends on a subscriber being present.
//! - Dropping a `stop` future never strands a lease.
//! - `is_running` reads a `watch` channel and never waits on a slot lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::actor::{ActorExit, BatchResult, LeaseCell, ProcessActor};
use crate::core::arbiter::{DeviceArbiter, LeaseToken};
use crate::core::process::{ProcessHandle, ProcessStatus};
use crate::core::state::ActorState;
use crate::error::SupervisorError;
use crate::events::FanoutHub;
use crate::mode::Mode;
use crate::params::Launch;
use crate::parsers::{ParseCounters, ParseStats};
use crate::policies::RetryPolicy;

struct Slot {
    stop: CancellationToken,
    handle: JoinHandle<ActorExit>,
    lease: Arc<LeaseCell>,
}

/// Result of a successful [`ProcessSupervisor::stop`].
#[derive(Debug)]
pub struct StopOutcome {
    /// Exit code of the last process (`None` if ended by a signal).
    pub exit_code: Option<i32>,
    /// Lease that backed the process, to be released by the caller.
    /// `None` if crash recovery already released it.
    pub lease: Option<LeaseToken>,
}

/// Per-mode process lifecycle manager.
pub struct ProcessSupervisor {
    arbiter: Arc<DeviceArbiter>,
    hub: FanoutHub,
    grace: Duration,
    restart: RetryPolicy,
    slots: [Mutex<Option<Slot>>; 4],
    states: [Arc<watch::Sender<ActorState>>; 4],
    counters: [Arc<ParseCounters>; 4],
}

impl ProcessSupervisor {
    pub fn new(
        arbiter: Arc<DeviceArbiter>,
        hub: FanoutHub,
        grace: Duration,
        restart: RetryPolicy,
    ) -> Self {
        Self {
            arbiter,
            hub,
            grace,
            restart,
            slots: std::array::from_fn(|_| Mutex::new(None)),
            states: std::array::from_fn(|_| Arc::new(watch::Sender::new(ActorState::default()))),
            counters: std::array::from_fn(|_| Arc::new(ParseCounters::default())),
        }
    }

    /// Starts `mode` under `lease`. Starting a live mode is a no-op success.
    ///
    /// # Panics
    /// If `lease` is not the arbiter's current lease for `mode`, or if `launch`
    /// belongs to another mode.
    pub async fn start(
        &self,
        mode: Mode,
        lease: &LeaseToken,
        launch: Launch,
    ) -> Result<(), SupervisorError> {
        self.check_precondition(mode, lease, &launch);
        let mut slot = self.slots[mode.index()].lock().await;
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) && self.is_running(mode) {
            debug!(%mode, "already running");
            return Ok(());
        }
        self.reap(&mut slot, lease).await;
        *slot = Some(self.spawn(mode, lease, launch, None)?);
        Ok(())
    }

    /// Starts a batch mode and returns a receiver for its result.
    ///
    /// Unlike [`start`](Self::start), a live batch is an error: its result
    /// belongs to the first caller.
    pub async fn start_batch(
        &self,
        mode: Mode,
        lease: &LeaseToken,
        launch: Launch,
    ) -> Result<oneshot::Receiver<BatchResult>, SupervisorError> {
        self.check_precondition(mode, lease, &launch);
        let mut slot = self.slots[mode.index()].lock().await;
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return Err(SupervisorError::AlreadyRunning { mode });
        }
        self.reap(&mut slot, lease).await;
        let (tx, rx) = oneshot::channel();
        *slot = Some(self.spawn(mode, lease, launch, Some(tx))?);
        Ok(rx)
    }

    /// Stops `mode`, waiting for its exit code (bounded by grace + kill).
    ///
    /// Returns `NotRunning` if there is no slot, or if the process already died
    /// and crash recovery released its lease.
    ///
    /// Cancel-safe: the slot is handed to a detached task before anything is
    /// awaited. If the caller goes away, that task still reaps the actor and
    /// releases the lease itself.
    pub async fn stop(&self, mode: Mode) -> Result<StopOutcome, SupervisorError> {
        let slot = {
            let mut guard = self.slots[mode.index()].lock().await;
            guard.take()
        };
        let Some(slot) = slot else {
            return Err(SupervisorError::NotRunning { mode });
        };
        slot.stop.cancel();

        let (tx, rx) = oneshot::channel();
        let arbiter = Arc::clone(&self.arbiter);
        tokio::spawn(async move {
            let outcome = finish(mode, slot).await;
            if let Err(Ok(unclaimed)) = tx.send(outcome) {
                if let Some(token) = unclaimed.lease {
                    warn!(%mode, "stop abandoned by caller, releasing lease");
                    let _ = arbiter.release(&token);
                }
            }
        });
        rx.await.unwrap_or(Err(SupervisorError::NotRunning { mode }))
    }

    /// True while `mode` has a live process.
    pub fn is_running(&self, mode: Mode) -> bool {
        self.states[mode.index()].borrow().is_live()
    }

    /// Current state of `mode`'s process.
    pub fn info(&self, mode: Mode) -> ActorState {
        self.states[mode.index()].borrow().clone()
    }

    /// Watches `mode`'s process state.
    pub fn watch(&self, mode: Mode) -> watch::Receiver<ActorState> {
        self.states[mode.index()].subscribe()
    }

    /// Parse counters of `mode` (cumulative).
    pub fn parse_stats(&self, mode: Mode) -> ParseStats {
        self.counters[mode.index()].snapshot()
    }

    fn check_precondition(&self, mode: Mode, lease: &LeaseToken, launch: &Launch) {
        assert_eq!(launch.mode(), mode, "launch recipe belongs to another mode");
        assert!(
            self.arbiter.holds(mode, lease),
            "start({mode}) requires the lease for {mode}"
        );
    }

    /// Clears a finished slot, or one whose actor is waiting out a restart delay.
    async fn reap(&self, slot: &mut Option<Slot>, current: &LeaseToken) {
        if let Some(stale) = slot.take() {
            stale.stop.cancel();
            let arbiter = Arc::clone(&self.arbiter);
            let current = current.clone();
            // Detached so a dropped `start` still settles the stale lease.
            let settle = tokio::spawn(async move {
                let _ = stale.handle.await;
                if let Some(token) = stale.lease.take().filter(|t| *t != current) {
                    let _ = arbiter.release(&token);
                }
            });
            let _ = settle.await;
        }
    }

    fn spawn(
        &self,
        mode: Mode,
        lease: &LeaseToken,
        launch: Launch,
        completion: Option<oneshot::Sender<BatchResult>>,
    ) -> Result<Slot, SupervisorError> {
        let process = ProcessHandle::spawn(mode, launch.command.clone())?;

        let state = Arc::clone(&self.states[mode.index()]);
        state.send_replace(ActorState {
            status: ProcessStatus::Running,
            pid: process.pid(),
            started_at_ms: Some(process.started_at_ms()),
            ..ActorState::default()
        });

        let stop = CancellationToken::new();
        let lease = Arc::new(LeaseCell::new(lease.clone()));
        let actor = ProcessActor {
            mode,
            launch,
            arbiter: Arc::clone(&self.arbiter),
            hub: self.hub.clone(),
            restart: self.restart,
            grace: self.grace,
            lease: Arc::clone(&lease),
            state,
            counters: Arc::clone(&self.counters[mode.index()]),
            completion,
        };
        let handle = tokio::spawn(actor.run(process, stop.clone()));
        Ok(Slot {
            stop,
            handle,
            lease,
        })
    }
}

/// Awaits a cancelled slot's actor and collects its lease.
async fn finish(mode: Mode, slot: Slot) -> Result<StopOutcome, SupervisorError> {
    let finished = slot.handle.is_finished();
    let exit = match slot.handle.await {
        Ok(exit) => exit,
        Err(e) => {
            error!(%mode, error = %e, "process actor failed");
            ActorExit::Crashed { code: None }
        }
    };
    let lease = slot.lease.take();
    if finished && lease.is_none() {
        return Err(SupervisorError::NotRunning { mode });
    }
    info!(%mode, code = ?exit.code(), "mode stopped");
    Ok(StopOutcome {
        exit_code: exit.code(),
        lease,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::process::CommandSpec;
    use crate::events::{DomainEvent, EventFilter};
    use crate::parsers::ParserSpec;

    fn sh(script: &str) -> Launch {
        Launch {
            command: CommandSpec::new("/bin/sh", ["-c".to_string(), script.to_string()]),
            parser: ParserSpec::Decode { max_line_len: 4096 },
        }
    }

    fn supervisor() -> (ProcessSupervisor, Arc<DeviceArbiter>, FanoutHub) {
        let arbiter = Arc::new(DeviceArbiter::new());
        let hub = FanoutHub::new(64);
        let sup = ProcessSupervisor::new(
            Arc::clone(&arbiter),
            hub.clone(),
            Duration::from_secs(2),
            RetryPolicy::never(),
        );
        (sup, arbiter, hub)
    }

    #[tokio::test]
    #[should_panic(expected = "requires the lease")]
    async fn test_start_without_lease_panics() {
        let (sup, arbiter, _hub) = supervisor();
        let other = arbiter.acquire(Mode::AudioListen).unwrap();
        let _ = sup.start(Mode::Decode, &other, sh("sleep 1")).await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_returns_lease() {
        let (sup, arbiter, _hub) = supervisor();
        let lease = arbiter.acquire(Mode::Decode).unwrap();

        sup.start(Mode::Decode, &lease, sh("exec sleep 30")).await.unwrap();
        sup.start(Mode::Decode, &lease, sh("exec sleep 30")).await.unwrap();
        assert!(sup.is_running(Mode::Decode));

        let out = sup.stop(Mode::Decode).await.unwrap();
        assert_eq!(out.lease, Some(lease.clone()));
        assert!(!sup.is_running(Mode::Decode));
        arbiter.release(&lease).unwrap();

        assert!(matches!(
            sup.stop(Mode::Decode).await,
            Err(SupervisorError::NotRunning { mode: Mode::Decode })
        ));
    }

    #[tokio::test]
    async fn test_output_reaches_hub() {
        let (sup, arbiter, hub) = supervisor();
        let mut sub = hub.subscribe(EventFilter::all());
        let lease = arbiter.acquire(Mode::Decode).unwrap();

        sup.start(
            Mode::Decode,
            &lease,
            sh(r#"echo '{"model":"Nexus-TH","id":7}'; exec sleep 30"#),
        )
        .await
        .unwrap();

        let first = sub.recv().await.unwrap();
        assert!(first.is_status());
        let second = sub.recv().await.unwrap();
        assert!(matches!(second.as_ref(), DomainEvent::Reading(r) if r.model == "Nexus-TH"));

        sup.stop(Mode::Decode).await.unwrap();
        assert_eq!(sup.parse_stats(Mode::Decode).events, 1);
    }

    #[tokio::test]
    async fn test_exit_noticed_while_grandchild_holds_stdout() {
        let (sup, arbiter, hub) = supervisor();
        let mut sub = hub.subscribe(EventFilter::all());
        let lease = arbiter.acquire(Mode::Decode).unwrap();

        sup.start(
            Mode::Decode,
            &lease,
            sh(r#"sleep 30 & echo '{"model":"Nexus-TH","id":7}'; exit 3"#),
        )
        .await
        .unwrap();

        let mut reading = false;
        let code = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match sub.recv().await.unwrap().as_ref() {
                    DomainEvent::Reading(_) => reading = true,
                    DomainEvent::StatusChange(s) if !s.running => break s.exit_code,
                    _ => {}
                }
            }
        })
        .await
        .expect("exit not detected while stdout was still open");

        assert!(reading);
        assert_eq!(code, Some(3));
        assert_eq!(arbiter.status(), None);
    }

    #[tokio::test]
    async fn test_spawn_error_leaves_slot_empty() {
        let (sup, arbiter, _hub) = supervisor();
        let lease = arbiter.acquire(Mode::Decode).unwrap();
        let launch = Launch {
            command: CommandSpec::new("/nonexistent/rtl_433", Vec::new()),
            parser: ParserSpec::Decode { max_line_len: 4096 },
        };
        let err = sup.start(Mode::Decode, &lease, launch).await.unwrap_err();
        assert_eq!(err.as_label(), "supervisor_spawn_failed");
        assert!(!sup.is_running(Mode::Decode));
        assert!(sup.stop(Mode::Decode).await.is_err());
    }
}
