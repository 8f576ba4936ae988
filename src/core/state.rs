//! Per-mode process state, published through a `watch` channel.
//!
//! The actor owns the sender and updates it on every lifecycle edge; readers
//! (status queries, sweep progress) never take the slot lock.

use serde::{Deserialize, Serialize};

use crate::core::process::ProcessStatus;

/// Snapshot of one mode's process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorState {
    pub status: ProcessStatus,
    /// OS process id of the current process.
    pub pid: Option<u32>,
    /// When the current process started, ms since the Unix epoch.
    pub started_at_ms: Option<u64>,
    /// Restarts performed after crashes since the mode was started.
    pub restarts: u32,
    /// Newlines read from stdout (line-oriented modes only).
    pub lines: u64,
    /// Bytes read from stdout.
    pub bytes: u64,
}

impl Default for ActorState {
    /// Never started: `Exited(None)`, all counters zero.
    fn default() -> Self {
        Self {
            status: ProcessStatus::Exited(None),
            pid: None,
            started_at_ms: None,
            restarts: 0,
            lines: 0,
            bytes: 0,
        }
    }
}

impl ActorState {
    /// True while a process is alive (including while it is being stopped).
    pub fn is_live(&self) -> bool {
        matches!(
            self.status,
            ProcessStatus::Running | ProcessStatus::Stopping
        )
    }
}
