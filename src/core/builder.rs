//! # RadioControlBuilder: wiring of optional collaborators.
//!
//! Collects sinks and the presence check, then builds the hub, spawns the
//! sink workers and hands everything to [`RadioControl`].
//!
//! ```text
//! RadioControl::builder(cfg)
//!   .with_store(store)        ──► HistorySink
//!   .with_sink(sink)          ──► custom Sink
//!   .with_presence(check)     ──► DevicePresence (default AssumePresent)
//!   .build()                  ──► FanoutHub + SinkSet + RadioControl
//! ```

use std::sync::Arc;

use crate::config::Config;
use crate::events::FanoutHub;
use crate::services::{AssumePresent, DevicePresence, ReadingStore};
use crate::sinks::{HistorySink, Sink, SinkSet};

use super::control::RadioControl;

/// Builder for [`RadioControl`] with optional collaborators.
pub struct RadioControlBuilder {
    cfg: Config,
    sinks: Vec<Arc<dyn Sink>>,
    presence: Arc<dyn DevicePresence>,
}

impl RadioControlBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            sinks: Vec::new(),
            presence: Arc::new(AssumePresent),
        }
    }

    /// Sets event sinks (replaces any added before).
    ///
    /// Sinks receive domain events through dedicated workers with bounded queues.
    pub fn with_sinks(mut self, sinks: Vec<Arc<dyn Sink>>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Adds one event sink.
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Persists every decoded reading to `store`.
    pub fn with_store(self, store: Arc<dyn ReadingStore>) -> Self {
        self.with_sink(Arc::new(HistorySink::new(store)))
    }

    /// Sets the hardware presence check run before every start.
    ///
    /// Default: [`AssumePresent`].
    pub fn with_presence(mut self, presence: Arc<dyn DevicePresence>) -> Self {
        self.presence = presence;
        self
    }

    /// Builds the control facade.
    ///
    /// Must be called inside a Tokio runtime: sink workers are spawned here.
    pub fn build(self) -> RadioControl {
        let hub = FanoutHub::new(self.cfg.hub_capacity_clamped());
        let sinks = SinkSet::new(self.sinks, &hub);
        RadioControl::new_internal(self.cfg, hub, self.presence, sinks)
    }
}

impl RadioControl {
    /// Starts building a [`RadioControl`].
    pub fn builder(cfg: Config) -> RadioControlBuilder {
        RadioControlBuilder::new(cfg)
    }
}
