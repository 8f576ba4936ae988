//! # ProcessHandle: one invocation of an external tool.
//!
//! Wraps a `tokio::process::Child` with the bookkeeping the supervisor needs:
//! - stdout is piped and handed to the runner as a byte stream,
//! - stderr is drained into `debug!` logs (its last line is kept for crash reports),
//! - exit status is always collected, so no zombie is ever left behind.
//!
//! ## Termination
//! ```text
//! terminate(grace)
//!   ├─► already exited? ──► Exited(code)
//!   ├─► SIGTERM (start_kill on non-unix)
//!   ├─► wait ≤ grace ───► Exited(code)
//!   └─► SIGKILL ──► wait ──► Exited(code)     (unconditional)
//! ```

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::events::now_ms;
use crate::mode::Mode;

/// Program plus argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Lifecycle of a [`ProcessHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "code", rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Stopping,
    /// Exit code, `None` if ended by a signal.
    Exited(Option<i32>),
}

/// A running (or just finished) external process.
pub struct ProcessHandle {
    mode: Mode,
    pid: Option<u32>,
    started_at_ms: u64,
    command: CommandSpec,
    status: ProcessStatus,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_tail: Arc<Mutex<Option<String>>>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("mode", &self.mode)
            .field("pid", &self.pid)
            .field("status", &self.status)
            .field("command", &self.command.to_string())
            .finish()
    }
}

impl ProcessHandle {
    /// Starts `command`. Must be called within a tokio runtime.
    pub fn spawn(mode: Mode, command: CommandSpec) -> Result<Self, SupervisorError> {
        debug!(%mode, command = %command, "spawning");
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Spawn {
                mode,
                program: command.program.display().to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr_tail = Arc::new(Mutex::new(None));
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(%mode, stderr = %line, "process output");
                    if !line.trim().is_empty() {
                        *tail.lock().unwrap_or_else(|e| e.into_inner()) = Some(line);
                    }
                }
            });
        }

        info!(%mode, pid, "process started");
        Ok(Self {
            mode,
            pid,
            started_at_ms: now_ms(),
            command,
            status: ProcessStatus::Running,
            child,
            stdout,
            stderr_tail,
        })
    }

    /// Takes the stdout pipe (once).
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    /// Last non-empty stderr line seen so far.
    pub fn stderr_tail(&self) -> Option<String> {
        self.stderr_tail
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn exited(&mut self, code: Option<i32>) -> Option<i32> {
        self.status = ProcessStatus::Exited(code);
        code
    }

    /// Waits for the process to exit on its own and collects its code.
    pub async fn wait(&mut self) -> Option<i32> {
        if let ProcessStatus::Exited(code) = self.status {
            return code;
        }
        match self.child.wait().await {
            Ok(status) => self.exited(status.code()),
            Err(e) => {
                warn!(mode = %self.mode, error = %e, "failed to collect exit status");
                self.exited(None)
            }
        }
    }

    /// Stops the process: SIGTERM, then SIGKILL after `grace`. Always reaps it.
    pub async fn terminate(&mut self, grace: Duration) -> Option<i32> {
        if let ProcessStatus::Exited(code) = self.status {
            return code;
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            return self.exited(status.code());
        }
        self.status = ProcessStatus::Stopping;
        self.signal_terminate();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(mode = %self.mode, code = ?status.code(), "process stopped");
                self.exited(status.code())
            }
            Ok(Err(e)) => {
                warn!(mode = %self.mode, error = %e, "wait failed after SIGTERM, killing");
                self.kill().await
            }
            Err(_elapsed) => {
                warn!(mode = %self.mode, ?grace, "process ignored SIGTERM, killing");
                self.kill().await
            }
        }
    }

    async fn kill(&mut self) -> Option<i32> {
        if let Err(e) = self.child.kill().await {
            warn!(mode = %self.mode, error = %e, "kill failed");
        }
        match self.child.wait().await {
            Ok(status) => self.exited(status.code()),
            Err(_) => self.exited(None),
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            let _ = self.child.start_kill();
            return;
        };
        // SAFETY: plain kill(2) on a child we own and have not reaped yet.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            debug!(mode = %self.mode, pid, "SIGTERM failed, falling back to kill");
            let _ = self.child.start_kill();
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh", ["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let err = ProcessHandle::spawn(
            Mode::Decode,
            CommandSpec::new("/nonexistent/rtl_433", Vec::new()),
        )
        .unwrap_err();
        assert_eq!(err.as_label(), "supervisor_spawn_failed");
    }

    #[tokio::test]
    async fn test_spawned_handle_is_running() {
        let mut p = ProcessHandle::spawn(Mode::Decode, sh("exec sleep 30")).unwrap();
        assert_eq!(p.status(), ProcessStatus::Running);
        assert!(p.pid().is_some());
        p.terminate(Duration::from_secs(2)).await;
        assert_eq!(
            serde_json::to_value(p.status()).unwrap(),
            serde_json::json!({ "state": "exited", "code": null })
        );
    }

    #[tokio::test]
    async fn test_wait_collects_exit_code() {
        let mut p = ProcessHandle::spawn(Mode::Decode, sh("echo boom >&2; exit 3")).unwrap();
        assert_eq!(p.wait().await, Some(3));
        assert_eq!(p.status(), ProcessStatus::Exited(Some(3)));
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let mut p = ProcessHandle::spawn(Mode::AudioListen, sh("exec sleep 30")).unwrap();
        let code = p.terminate(Duration::from_secs(5)).await;
        // Terminated by SIGTERM: no exit code.
        assert_eq!(code, None);
        assert_eq!(p.status(), ProcessStatus::Exited(None));
    }

    #[tokio::test]
    async fn test_terminate_escalates_when_sigterm_is_ignored() {
        let mut p = ProcessHandle::spawn(
            Mode::LiveSpectrum,
            sh("trap '' TERM; while true; do sleep 0.05; done"),
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        p.terminate(Duration::from_millis(200)).await;
        assert!(matches!(p.status(), ProcessStatus::Exited(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_command_display() {
        let c = CommandSpec::new("rtl_fm", ["-f".to_string(), "101500000".to_string()]);
        assert_eq!(c.to_string(), "rtl_fm -f 101500000");
    }
}
