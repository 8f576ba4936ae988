//! Runtime core: receiver arbitration and process lifecycle.
//!
//! The public entry point is [`RadioControl`]; the arbiter and the supervisor
//! are exported for embedders that drive processes themselves.
//!
//! Internal modules:
//! - [`arbiter`]: exclusive lease over the receiver;
//! - [`process`]: one spawned tool with stop escalation;
//! - [`runner`]: pumps one process's stdout through its parser into the hub;
//! - [`actor`]: lifecycle of one mode's process, crash recovery and restart;
//! - [`supervisor`]: zero-or-one process per mode;
//! - [`sweep`]: batch scans with progress;
//! - [`control`]: the mode control API;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod actor;
mod arbiter;
mod builder;
mod control;
mod process;
mod runner;
mod shutdown;
mod state;
mod supervisor;
mod sweep;

pub use arbiter::{DeviceArbiter, LeaseSnapshot, LeaseToken};
pub use builder::RadioControlBuilder;
pub use control::{ControlStatus, ModeStatus, RadioControl};
pub use process::{CommandSpec, ProcessHandle, ProcessStatus};
pub use shutdown::wait_for_shutdown_signal;
pub use state::ActorState;
pub use supervisor::{ProcessSupervisor, StopOutcome};
pub use sweep::{HOP_BANDWIDTH_HZ, SweepJob, SweepProgress, expected_duration};
