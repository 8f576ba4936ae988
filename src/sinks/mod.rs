//! # In-process event sinks.
//!
//! Sinks consume domain events from the [`FanoutHub`](crate::events::FanoutHub)
//! without touching process supervision.
//!
//! ## Architecture
//! ```text
//! parsers ── publish ──► FanoutHub ──► subscription ──► SinkSet worker ──► Sink::on_event
//!                                          │
//!                                     ┌────┴───────┬────────────┐
//!                                     ▼            ▼            ▼
//!                                HistorySink   LogWriter     custom
//! ```

mod history;
#[cfg(feature = "logging")]
mod log;
mod sink;
mod sink_set;

pub use history::HistorySink;
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use sink::Sink;
pub use sink_set::SinkSet;
