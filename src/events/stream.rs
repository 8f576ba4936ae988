//! # Live event stream with heartbeats.
//!
//! Turns a [`Subscription`] into a `futures::Stream` suitable for a persistent
//! push connection. When no event arrives for one heartbeat interval, a
//! [`StreamItem::Heartbeat`] is yielded instead so the consumer can tell a quiet
//! feed from a dead one.
//!
//! ```text
//! Subscription ──► recv() ─┐
//!                          ├──► StreamItem::Event(..)
//! interval.tick() ─────────┴──► StreamItem::Heartbeat { at_ms }
//! ```
//!
//! The interval restarts after every delivered event. The stream ends when the
//! hub is closed (or, for audio streams, when the audio mode stops).

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::{Serialize, Serializer};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use super::event::{DomainEvent, now_ms};
use super::hub::Subscription;

/// One item of a live stream.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// A published event.
    Event(Arc<DomainEvent>),
    /// Liveness signal, distinguishable from data.
    Heartbeat {
        /// Wall clock time, ms since the Unix epoch.
        at_ms: u64,
    },
}

impl StreamItem {
    /// True for heartbeats.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, StreamItem::Heartbeat { .. })
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename = "heartbeat")]
struct HeartbeatWire {
    at_ms: u64,
}

impl Serialize for StreamItem {
    /// Events use their own tagged form; heartbeats are `{"type":"heartbeat","at_ms":..}`.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StreamItem::Event(ev) => ev.as_ref().serialize(serializer),
            StreamItem::Heartbeat { at_ms } => HeartbeatWire { at_ms: *at_ms }.serialize(serializer),
        }
    }
}

fn heartbeat_timer(period: Duration) -> Interval {
    let mut iv = interval_at(Instant::now() + period, period);
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    iv
}

/// Wraps a subscription into a stream; `heartbeat = None` disables heartbeats.
pub fn live_stream(
    subscription: Subscription,
    heartbeat: Option<Duration>,
) -> impl Stream<Item = StreamItem> + Send + 'static {
    let timer = heartbeat.filter(|d| !d.is_zero()).map(heartbeat_timer);

    futures::stream::unfold((subscription, timer), |(mut sub, mut timer)| async move {
        let item = match timer.as_mut() {
            Some(iv) => {
                tokio::select! {
                    ev = sub.recv() => {
                        iv.reset();
                        StreamItem::Event(ev?)
                    }
                    _ = iv.tick() => StreamItem::Heartbeat { at_ms: now_ms() },
                }
            }
            None => StreamItem::Event(sub.recv().await?),
        };
        Some((item, (sub, timer)))
    })
}
