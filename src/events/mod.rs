//! Domain events: data model, fan-out hub and live streams.
//!
//! This module groups the event **data model** produced by the output parsers,
//! the **hub** that distributes it to any number of consumers, and the
//! **stream** adapter used for long-lived push connections.
//!
//! ## Contents
//! - [`DomainEvent`] and its payloads, [`Category`] / [`EventFilter`] for subscriptions
//! - [`FanoutHub`] per-subscriber bounded drop-oldest queues, [`Subscription`]
//! - [`live_stream`] / [`StreamItem`] events interleaved with heartbeats
//!
//! ## Quick reference
//! - **Publishers**: the process runner (parser output) and the process actor
//!   (`StatusChange` on start/exit).
//! - **Consumers**: sink workers (history store, log writer) and any number of
//!   external live connections.
//!
//! See the crate root for the system-level wiring diagram.

mod event;
mod hub;
mod stream;

pub(crate) use event::now_ms;
pub use event::{
    AudioChunk, Category, DomainEvent, EventFilter, Reading, SpectrumFrame, SpectrumRow,
    StatusChange,
};
pub use hub::{FanoutHub, HubStats, Subscription};
pub use stream::{StreamItem, live_stream};
