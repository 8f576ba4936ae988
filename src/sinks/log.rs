//! # LogWriter: one log line per domain event.
//!
//! A minimal sink that forwards events to `tracing` under the `radiovisor::events`
//! target. Use it for tests, demos and field debugging.
//!
//! ## Example output
//! ```text
//! [status] mode=decode running=true
//! [reading] device="Acurite-Tower/1234" model="Acurite-Tower"
//! [frame] center=433.920MHz points=1024 max=-31.2dB
//! [status] mode=decode running=false code=Some(0)
//! ```
//!
//! Raw spectrum rows and audio chunks are too frequent to log and are filtered out.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::events::{Category, DomainEvent, EventFilter};
use crate::sinks::Sink;

/// Event writer sink.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for LogWriter {
    async fn on_event(&self, e: &DomainEvent) {
        match e {
            DomainEvent::StatusChange(s) if s.running => {
                info!(target: "radiovisor::events", "[status] mode={} running=true", s.mode);
            }
            DomainEvent::StatusChange(s) => {
                info!(
                    target: "radiovisor::events",
                    "[status] mode={} running=false code={:?}", s.mode, s.exit_code
                );
            }
            DomainEvent::Reading(r) => {
                info!(
                    target: "radiovisor::events",
                    "[reading] device={:?} model={:?}", r.device_key(), r.model
                );
            }
            DomainEvent::SpectrumFrame(f) => {
                debug!(
                    target: "radiovisor::events",
                    "[frame] center={:.3}MHz points={} max={:.1}dB",
                    f.center_freq_mhz,
                    f.power_db.len(),
                    f.max
                );
            }
            DomainEvent::SpectrumRow(_) | DomainEvent::AudioChunk(_) => {}
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }

    fn filter(&self) -> EventFilter {
        EventFilter::only(&[Category::Status, Category::Reading, Category::SpectrumFrame])
    }
}
