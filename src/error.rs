//! Error types used by the radiovisor runtime.
//!
//! This module defines three error enums:
//!
//! - [`ArbiterError`]: lease acquisition/release failures.
//! - [`SupervisorError`]: subprocess spawn/stop failures.
//! - [`ControlError`]: what the mode control API returns to its callers.
//!
//! Every type provides `as_label` for logs/metrics. Malformed subprocess output
//! and subscriber overflow never surface here; they are counted and logged.

use std::time::Duration;

use thiserror::Error;

use crate::mode::Mode;

/// # Errors produced by the device arbiter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArbiterError {
    /// The receiver is already claimed. Retry after the current mode stops.
    #[error("device busy, currently in mode {current}")]
    Busy {
        /// Mode currently holding the lease.
        current: Mode,
    },

    /// `release` was called with a stale or foreign token. No state changed.
    #[error("lease token does not match the current holder")]
    InvalidToken,
}

impl ArbiterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use radiovisor::{ArbiterError, Mode};
    ///
    /// let err = ArbiterError::Busy { current: Mode::Decode };
    /// assert_eq!(err.as_label(), "arbiter_busy");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ArbiterError::Busy { .. } => "arbiter_busy",
            ArbiterError::InvalidToken => "arbiter_invalid_token",
        }
    }
}

/// # Errors produced by the subprocess supervisor.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// The executable could not be started (missing, permission denied, bad arguments).
    #[error("failed to spawn {program} for {mode}: {reason}")]
    Spawn {
        /// Mode the spawn was attempted for.
        mode: Mode,
        /// Program path as configured.
        program: String,
        /// OS error or validation message.
        reason: String,
    },

    /// A batch run was requested while the same mode is already running.
    #[error("{mode} is already running")]
    AlreadyRunning {
        /// Mode that is running.
        mode: Mode,
    },

    /// `stop` was called for a mode with no live process.
    #[error("{mode} is not running")]
    NotRunning {
        /// Mode that was asked to stop.
        mode: Mode,
    },

    /// The process exited without being asked to.
    #[error("{mode} process exited unexpectedly (code {code:?})")]
    Crashed {
        /// Mode whose process died.
        mode: Mode,
        /// Exit code, `None` if terminated by a signal.
        code: Option<i32>,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Spawn { .. } => "supervisor_spawn_failed",
            SupervisorError::AlreadyRunning { .. } => "supervisor_already_running",
            SupervisorError::NotRunning { .. } => "supervisor_not_running",
            SupervisorError::Crashed { .. } => "supervisor_process_crashed",
        }
    }
}

/// # Errors returned by the mode control API.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Arbitration failed (device busy, or stale token).
    #[error(transparent)]
    Arbiter(#[from] ArbiterError),

    /// Spawn/stop failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Mode parameters failed validation; nothing was started.
    #[error("invalid parameters: {reason}")]
    InvalidParams {
        /// What was wrong.
        reason: String,
    },

    /// The device-presence check failed (unplugged, permissions).
    #[error("receiver unavailable: {reason}")]
    DeviceUnavailable {
        /// Message from the presence check.
        reason: String,
    },

    /// Operation requires a specific mode to be running.
    #[error("{mode} is not running")]
    NotRunning {
        /// Mode the operation needs.
        mode: Mode,
    },

    /// A sweep was stopped before it produced a result.
    #[error("sweep cancelled")]
    Cancelled,

    /// Shutdown did not finish within the grace period.
    #[error("shutdown timeout {grace:?} exceeded; still running: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Modes that were still running.
        stuck: Vec<Mode>,
    },
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::Arbiter(e) => e.as_label(),
            ControlError::Supervisor(e) => e.as_label(),
            ControlError::InvalidParams { .. } => "control_invalid_params",
            ControlError::DeviceUnavailable { .. } => "control_device_unavailable",
            ControlError::NotRunning { .. } => "control_not_running",
            ControlError::Cancelled => "control_cancelled",
            ControlError::GraceExceeded { .. } => "control_grace_exceeded",
        }
    }

    /// Indicates whether retrying the same request later may succeed.
    ///
    /// Returns `true` for a busy device and an unavailable device, `false` otherwise.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControlError::Arbiter(ArbiterError::Busy { .. }) | ControlError::DeviceUnavailable { .. }
        )
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ControlError::InvalidParams {
            reason: reason.into(),
        }
    }
}
