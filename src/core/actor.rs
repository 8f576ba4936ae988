//! # ProcessActor: lifecycle owner of one mode's process.
//!
//! Runs the process through [`run_attempt`], detects unexpected exits, applies
//! crash recovery and the optional restart policy.
//!
//! ## Architecture
//! ```text
//! Supervisor::start ──► ProcessActor::run(process, stop)
//!
//! loop {
//!   ├─► publish StatusChange{running: true}
//!   ├─► run_attempt() ──► Stopped           → publish StatusChange{false} → exit
//!   │                 ├─► Exited(0), batch  → publish StatusChange{false}
//!   │                 │                       → completion.send(Ok(rows)) → exit (lease kept)
//!   │                 └─► Exited(other)     → crash:
//!   │                       ├─► force-release lease
//!   │                       ├─► publish StatusChange{false}   (exactly once)
//!   │                       └─► RetryPolicy::delay_for(n)
//!   │                             ├─► None            → exit
//!   │                             └─► sleep (stop aborts)
//!   │                                   → arbiter.acquire(mode)  (Busy → exit)
//!   │                                   → spawn                   (error → release, exit)
//! }
//! ```
//!
//! ## Rules
//! - A restart goes through the arbiter like any other start; if another mode
//!   claimed the receiver in the meantime, the restart is abandoned.
//! - Batch modes never restart; a failed batch reports `Crashed` to its waiter.
//! - The lease cell is only written by the actor; `stop` reads it after the actor ends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::arbiter::{DeviceArbiter, LeaseToken};
use crate::core::process::{ProcessHandle, ProcessStatus};
use crate::core::runner::{AttemptEnd, run_attempt};
use crate::core::state::ActorState;
use crate::error::SupervisorError;
use crate::events::{DomainEvent, FanoutHub, StatusChange};
use crate::mode::Mode;
use crate::params::Launch;
use crate::parsers::ParseCounters;
use crate::policies::RetryPolicy;

/// Outcome delivered to whoever waits for a batch process.
pub(crate) type BatchResult = Result<Vec<DomainEvent>, SupervisorError>;

/// Lease currently backing a slot's process (`None` after crash recovery).
#[derive(Debug, Default)]
pub(crate) struct LeaseCell(Mutex<Option<LeaseToken>>);

impl LeaseCell {
    pub(crate) fn new(token: LeaseToken) -> Self {
        Self(Mutex::new(Some(token)))
    }

    pub(crate) fn take(&self) -> Option<LeaseToken> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn set(&self, token: LeaseToken) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }
}

/// How the actor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActorExit {
    Stopped { code: Option<i32> },
    Completed { code: Option<i32> },
    Crashed { code: Option<i32> },
}

impl ActorExit {
    pub(crate) fn code(&self) -> Option<i32> {
        match *self {
            ActorExit::Stopped { code }
            | ActorExit::Completed { code }
            | ActorExit::Crashed { code } => code,
        }
    }
}

/// Supervises the process of one mode, across restarts.
pub(crate) struct ProcessActor {
    pub mode: Mode,
    pub launch: Launch,
    pub arbiter: Arc<DeviceArbiter>,
    pub hub: FanoutHub,
    pub restart: RetryPolicy,
    pub grace: Duration,
    pub lease: Arc<LeaseCell>,
    pub state: Arc<watch::Sender<ActorState>>,
    pub counters: Arc<ParseCounters>,
    pub completion: Option<oneshot::Sender<BatchResult>>,
}

impl ProcessActor {
    /// Runs until stopped, completed, or a crash that is not (or cannot be) restarted.
    pub async fn run(mut self, mut process: ProcessHandle, stop: CancellationToken) -> ActorExit {
        let mut restarts: u32 = 0;

        loop {
            self.state.send_modify(|s| {
                s.status = ProcessStatus::Running;
                s.pid = process.pid();
                s.started_at_ms = Some(process.started_at_ms());
                s.restarts = restarts;
            });
            self.hub
                .publish(DomainEvent::StatusChange(StatusChange::started(self.mode)));

            let parser = self.launch.parser.build(Arc::clone(&self.counters));
            let end = run_attempt(
                &mut process,
                parser,
                &self.hub,
                &stop,
                self.grace,
                &self.state,
            )
            .await;

            match end {
                AttemptEnd::Stopped { code } => {
                    self.exited(code);
                    return ActorExit::Stopped { code };
                }
                AttemptEnd::Exited { code, tail } if self.mode.is_batch() && code == Some(0) => {
                    info!(mode = %self.mode, events = tail.len(), "batch completed");
                    self.exited(code);
                    if let Some(tx) = self.completion.take() {
                        let _ = tx.send(Ok(tail));
                    }
                    return ActorExit::Completed { code };
                }
                AttemptEnd::Exited { code, .. } => {
                    error!(
                        mode = %self.mode,
                        ?code,
                        stderr = process.stderr_tail().as_deref().unwrap_or(""),
                        "process exited unexpectedly"
                    );
                    if let Some(token) = self.lease.take() {
                        self.arbiter.force_release(&token);
                    }
                    self.exited(code);

                    if let Some(tx) = self.completion.take() {
                        let _ = tx.send(Err(SupervisorError::Crashed {
                            mode: self.mode,
                            code,
                        }));
                        return ActorExit::Crashed { code };
                    }
                    match self.respawn(restarts, &stop).await {
                        Some(next) => {
                            process = next;
                            restarts += 1;
                        }
                        None => return ActorExit::Crashed { code },
                    }
                }
            }
        }
    }

    /// Records the exit and publishes the single `running: false` event for it.
    fn exited(&self, code: Option<i32>) {
        self.state
            .send_modify(|s| s.status = ProcessStatus::Exited(code));
        self.hub
            .publish(DomainEvent::StatusChange(StatusChange::stopped(self.mode, code)));
    }

    async fn respawn(&self, done: u32, stop: &CancellationToken) -> Option<ProcessHandle> {
        let delay = self.restart.delay_for(done)?;
        info!(mode = %self.mode, attempt = done + 1, ?delay, "restart scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.cancelled() => return None,
        }

        let token = match self.arbiter.acquire(self.mode) {
            Ok(token) => token,
            Err(e) => {
                warn!(mode = %self.mode, error = %e, "restart abandoned");
                return None;
            }
        };
        match ProcessHandle::spawn(self.mode, self.launch.command.clone()) {
            Ok(process) => {
                self.lease.set(token);
                Some(process)
            }
            Err(e) => {
                warn!(mode = %self.mode, error = %e, "restart failed");
                let _ = self.arbiter.release(&token);
                None
            }
        }
    }
}
