//! # Worker tasks feeding sinks from the hub.
//!
//! Provides [`SinkSet`]: one hub subscription and one worker task per sink.
//!
//! ## Architecture
//! ```text
//! FanoutHub
//!     ├──► [subscription 1] ──► worker 1 ──► sink1.on_event()
//!     │    (bounded, drop-oldest)     └────► panic → error! log, continue
//!     └──► [subscription N] ──► worker N ──► sinkN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-sink ordering**: sink A may process event N while B processes N+5.
//! - **Isolation**: a slow or panicking sink does not affect the others.
//! - **Shutdown**: after the hub is closed, workers drain their queues and exit;
//!   stragglers are cancelled once the grace period runs out.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state
//! inconsistent if a sink panics while holding a lock.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::events::FanoutHub;
use crate::sinks::Sink;

/// Running sink workers.
pub struct SinkSet {
    workers: Vec<(&'static str, JoinHandle<()>)>,
    token: CancellationToken,
}

fn panic_message(err: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = err.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = err.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl SinkSet {
    /// Subscribes every sink to `hub` and spawns its worker.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Sink>>, hub: &FanoutHub) -> Self {
        let token = CancellationToken::new();
        let workers = sinks
            .into_iter()
            .map(|sink| {
                let name = sink.name();
                let mut sub = hub.subscribe_with_capacity(sink.filter(), sink.queue_capacity());
                let token = token.clone();

                let handle = tokio::spawn(async move {
                    loop {
                        let ev = tokio::select! {
                            _ = token.cancelled() => break,
                            ev = sub.recv() => match ev {
                                Some(ev) => ev,
                                None => break,
                            },
                        };
                        let fut = sink.on_event(ev.as_ref());
                        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                            error!(sink = name, info = %panic_message(&*panic), "sink panicked");
                        }
                    }
                    if sub.dropped() > 0 {
                        warn!(sink = name, dropped = sub.dropped(), "sink lost events to overflow");
                    }
                    debug!(sink = name, "sink worker stopped");
                });
                (name, handle)
            })
            .collect();
        Self { workers, token }
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits up to `grace` for workers to drain (the hub must be closed first),
    /// then cancels the rest.
    pub async fn shutdown(self, grace: Duration) {
        let token = self.token.clone();
        let join_all = async {
            for (name, handle) in self.workers {
                if let Err(e) = handle.await {
                    error!(sink = name, error = %e, "sink worker failed");
                }
            }
        };
        tokio::pin!(join_all);
        if tokio::time::timeout(grace, &mut join_all).await.is_err() {
            warn!(?grace, "sink workers did not drain in time, cancelling");
            token.cancel();
            join_all.await;
        }
    }
}
