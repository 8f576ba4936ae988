//! # Run one process to its end.
//!
//! Pumps the stdout of one [`ProcessHandle`] through its [`Parser`] into the
//! [`FanoutHub`] until the process ends or a stop is requested.
//!
//! ## Flow
//! ```text
//! loop {
//!   select (biased) {
//!     stop.cancelled()  ──► terminate(grace) ──► AttemptEnd::Stopped
//!     stdout.read(buf)  ──► parser.parse_chunk ──► hub.publish(..)
//!                       └─► EOF → break
//!     process.wait()    ──► keep reading for at most DRAIN_GRACE, then break
//!   }
//! }
//! parser.finish() ──► hub.publish(..)       (tail events, e.g. the whole sweep)
//! select (biased) { stop → terminate, wait() → AttemptEnd::Exited }
//! ```
//!
//! ## Rules
//! - A stop request always wins over pending output (`biased` select).
//! - Tail events are only produced on natural end of stream, never on stop.
//! - The process is always reaped before returning.
//! - Exit is noticed even when a grandchild keeps stdout open.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::process::ProcessHandle;
use crate::core::state::ActorState;
use crate::events::{DomainEvent, FanoutHub};
use crate::parsers::Parser;

const READ_CHUNK: usize = 16 * 1024;

/// How long stdout is still read after the process itself has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

enum Step {
    Stop,
    Read(io::Result<usize>),
    Exited,
    DrainExpired,
}

/// How one process run ended.
#[derive(Debug)]
pub(crate) enum AttemptEnd {
    /// Ended by a stop request.
    Stopped { code: Option<i32> },
    /// Ended on its own.
    Exited {
        code: Option<i32>,
        /// Events produced by `finish` (already published).
        tail: Vec<DomainEvent>,
    },
}

/// Runs `process` until it ends or `stop` is cancelled.
pub(crate) async fn run_attempt(
    process: &mut ProcessHandle,
    mut parser: Parser,
    hub: &FanoutHub,
    stop: &CancellationToken,
    grace: Duration,
    state: &Arc<watch::Sender<ActorState>>,
) -> AttemptEnd {
    let mode = process.mode();
    let count_lines = mode.is_line_oriented();

    if let Some(mut stdout) = process.take_stdout() {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut drain_until: Option<Instant> = None;
        loop {
            let step = match drain_until {
                None => tokio::select! {
                    biased;
                    _ = stop.cancelled() => Step::Stop,
                    read = stdout.read(&mut buf) => Step::Read(read),
                    _ = process.wait() => Step::Exited,
                },
                Some(deadline) => tokio::select! {
                    biased;
                    _ = stop.cancelled() => Step::Stop,
                    read = tokio::time::timeout_at(deadline, stdout.read(&mut buf)) => match read {
                        Ok(read) => Step::Read(read),
                        Err(_) => Step::DrainExpired,
                    },
                },
            };

            match step {
                Step::Stop => {
                    let code = process.terminate(grace).await;
                    return AttemptEnd::Stopped { code };
                }
                Step::Exited => drain_until = Some(Instant::now() + DRAIN_GRACE),
                Step::DrainExpired => {
                    debug!(%mode, "stdout held open after exit, giving up on it");
                    break;
                }
                Step::Read(Ok(0)) => break,
                Step::Read(Ok(n)) => {
                    let chunk = &buf[..n];
                    let lines = if count_lines {
                        chunk.iter().filter(|&&b| b == b'\n').count() as u64
                    } else {
                        0
                    };
                    state.send_modify(|s| {
                        s.bytes += n as u64;
                        s.lines += lines;
                    });
                    for ev in parser.parse_chunk(chunk) {
                        hub.publish(ev);
                    }
                }
                Step::Read(Err(e)) => {
                    warn!(%mode, error = %e, "stdout read failed");
                    break;
                }
            }
        }
    }

    debug!(%mode, "stdout closed");
    let tail = parser.finish();
    for ev in &tail {
        hub.publish(ev.clone());
    }

    let stopped = tokio::select! {
        biased;
        _ = stop.cancelled() => true,
        _ = process.wait() => false,
    };
    if stopped {
        let code = process.terminate(grace).await;
        return AttemptEnd::Stopped { code };
    }
    let code = process.wait().await;
    AttemptEnd::Exited { code, tail }
}
