//! # Event sink trait.
//!
//! Provides [`Sink`], the extension point for in-process consumers of domain
//! events (history persistence, logging, metrics).
//!
//! Each sink gets:
//! - **Its own hub subscription** (capacity via [`Sink::queue_capacity`], categories via [`Sink::filter`])
//! - **A dedicated worker task** (runs independently)
//! - **Panic isolation** (a panic is logged; the worker moves on to the next event)
//!
//! ## Rules
//! - A slow sink only affects its own queue; overflow drops its oldest events.
//! - Events are processed sequentially (FIFO) per sink.
//! - Sinks never block the parsers that publish events.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use radiovisor::{Category, DomainEvent, EventFilter, Sink};
//!
//! struct FrameCounter;
//!
//! #[async_trait]
//! impl Sink for FrameCounter {
//!     async fn on_event(&self, ev: &DomainEvent) {
//!         if let DomainEvent::SpectrumFrame(_) = ev {
//!             // bump a counter, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "frame-counter" }
//!     fn filter(&self) -> EventFilter { EventFilter::only(&[Category::SpectrumFrame]) }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{DomainEvent, EventFilter};

/// In-process consumer of domain events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Processes a single event, in publish order.
    async fn on_event(&self, event: &DomainEvent);

    /// Name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity of this sink's subscription (min 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }

    /// Categories delivered to this sink.
    ///
    /// Default: everything.
    fn filter(&self) -> EventFilter {
        EventFilter::all()
    }
}
