//! # Non-blocking fan-out of domain events to many subscribers.
//!
//! Provides [`FanoutHub`], the one structure in the runtime built for concurrent
//! multi-writer/multi-reader access, and [`Subscription`], the consumer handle.
//!
//! ## Architecture
//! ```text
//! publish(event)
//!     │  (wrapped once in Arc, never cloned per subscriber)
//!     ├──► filter? ──► [queue 1] ──► Subscription::recv()
//!     │                 (bounded, drop-oldest)
//!     ├──► filter? ──► [queue 2] ──► Subscription::recv()
//!     └──► filter? ──► [queue N] ──► Subscription::recv()
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `publish` never waits on a consumer.
//! - **Per-subscriber FIFO**: each subscriber sees matching events in publish order.
//! - **No cross-subscriber ordering**: A may be at event N while B is at N+5.
//! - **Overflow**: a full queue drops its *oldest* event, bumps that subscriber's
//!   drop counter and the hub's total; other subscribers are unaffected.
//! - **Disconnect**: dropping a [`Subscription`] marks it closed; the next
//!   `publish` prunes it, so dead subscribers never accumulate.
//! - **Close**: after [`FanoutHub::close`], receivers drain what is queued and
//!   then get `None`; later publishes are discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::event::{DomainEvent, EventFilter};

/// Hub-wide counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Live subscribers.
    pub subscribers: usize,
    /// Events accepted by `publish`.
    pub published: u64,
    /// Events dropped across all subscribers because of overflow.
    pub dropped: u64,
}

struct Queue {
    id: u64,
    filter: EventFilter,
    capacity: usize,
    items: Mutex<VecDeque<Arc<DomainEvent>>>,
    notify: Notify,
    dropped: AtomicU64,
    /// Consumer went away.
    detached: AtomicBool,
    /// Hub was closed; no more events will arrive.
    ended: AtomicBool,
}

impl Queue {
    fn items(&self) -> MutexGuard<'_, VecDeque<Arc<DomainEvent>>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pushes with drop-oldest; returns true if something was evicted.
    fn push(&self, event: Arc<DomainEvent>) -> bool {
        let evicted = {
            let mut items = self.items();
            let evicted = if items.len() >= self.capacity {
                items.pop_front();
                true
            } else {
                false
            };
            items.push_back(event);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    fn end(&self) {
        self.ended.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

struct Inner {
    queues: Mutex<Vec<Arc<Queue>>>,
    default_capacity: usize,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    fn queues(&self) -> MutexGuard<'_, Vec<Arc<Queue>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: u64) {
        self.queues().retain(|q| q.id != id);
    }
}

/// Broadcast hub with per-subscriber bounded, drop-oldest queues.
///
/// Cheap to clone; all clones share the same subscriber set.
///
/// # Example
/// ```rust
/// use radiovisor::{DomainEvent, EventFilter, FanoutHub, Mode, StatusChange};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let hub = FanoutHub::new(8);
/// let mut sub = hub.subscribe(EventFilter::all());
///
/// hub.publish(DomainEvent::StatusChange(StatusChange::started(Mode::Decode)));
/// let ev = sub.recv().await.unwrap();
/// assert!(ev.is_status());
/// # }
/// ```
#[derive(Clone)]
pub struct FanoutHub {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FanoutHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutHub")
            .field("stats", &self.stats())
            .finish()
    }
}

impl FanoutHub {
    /// Creates a hub whose subscribers get `default_capacity` slots each (min 1).
    pub fn new(default_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(Vec::new()),
                default_capacity: default_capacity.max(1),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a subscriber with the default queue capacity.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.subscribe_with_capacity(filter, self.inner.default_capacity)
    }

    /// Registers a subscriber with an explicit queue capacity (min 1).
    pub fn subscribe_with_capacity(&self, filter: EventFilter, capacity: usize) -> Subscription {
        let capacity = capacity.max(1);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(Queue {
            id,
            filter,
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            detached: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        });
        if self.inner.closed.load(Ordering::Acquire) {
            queue.end();
        } else {
            self.inner.queues().push(Arc::clone(&queue));
        }
        debug!(subscriber = id, capacity, "subscriber registered");
        Subscription {
            queue,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscriber. Equivalent to dropping the handle.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Delivers `event` to every matching subscriber; returns how many got it.
    ///
    /// Never blocks on consumers. Closed subscribers found along the way are pruned.
    pub fn publish(&self, event: DomainEvent) -> usize {
        if self.inner.closed.load(Ordering::Acquire) {
            return 0;
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        let event = Arc::new(event);

        let mut queues = self.inner.queues();
        queues.retain(|q| {
            let alive = !q.detached.load(Ordering::Acquire);
            if !alive {
                debug!(subscriber = q.id, "pruned disconnected subscriber");
            }
            alive
        });

        let mut delivered = 0;
        for q in queues.iter().filter(|q| q.filter.matches(&event)) {
            if q.push(Arc::clone(&event)) {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                let total = q.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total == 1 || total.is_power_of_two() {
                    warn!(
                        subscriber = q.id,
                        capacity = q.capacity,
                        dropped = total,
                        "slow subscriber, dropping oldest events"
                    );
                }
            }
            delivered += 1;
        }
        delivered
    }

    /// Snapshot of hub counters.
    pub fn stats(&self) -> HubStats {
        let subscribers = self
            .inner
            .queues()
            .iter()
            .filter(|q| !q.detached.load(Ordering::Acquire))
            .count();
        HubStats {
            subscribers,
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Ends every subscription (after they drain) and refuses further events.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let queues = std::mem::take(&mut *self.inner.queues());
        for q in &queues {
            q.end();
        }
        debug!(subscribers = queues.len(), "hub closed");
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Consumer side of a hub subscription; lifetime = connection lifetime.
pub struct Subscription {
    queue: Arc<Queue>,
    hub: Weak<Inner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.queue.id)
            .field("len", &self.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl Subscription {
    /// Waits for the next event; `None` once the hub is closed and the queue drained.
    pub async fn recv(&mut self) -> Option<Arc<DomainEvent>> {
        loop {
            if let Some(ev) = self.queue.items().pop_front() {
                return Some(ev);
            }
            if self.queue.ended.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<DomainEvent>> {
        self.queue.items().pop_front()
    }

    /// Subscriber id (unique per hub).
    pub fn id(&self) -> u64 {
        self.queue.id
    }

    /// Events currently queued.
    pub fn len(&self) -> usize {
        self.queue.items().len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.queue.capacity
    }

    /// Events dropped for this subscriber because of overflow.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Category filter of this subscription.
    pub fn filter(&self) -> EventFilter {
        self.queue.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.detached.store(true, Ordering::Release);
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.queue.id);
        }
    }
}
