//! # HistorySink: persists decoded readings.
//!
//! Subscribes to [`Category::Reading`] only and appends every reading to a
//! [`ReadingStore`]. Store failures are logged and the reading is skipped;
//! the decoder keeps running.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::events::{Category, DomainEvent, EventFilter};
use crate::services::ReadingStore;
use crate::sinks::Sink;

/// Appends readings to a [`ReadingStore`].
pub struct HistorySink {
    store: Arc<dyn ReadingStore>,
}

impl HistorySink {
    #[must_use]
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Sink for HistorySink {
    async fn on_event(&self, event: &DomainEvent) {
        let DomainEvent::Reading(reading) = event else {
            return;
        };
        if let Err(e) = self.store.append(reading).await {
            warn!(device = %reading.device_key(), error = %e, "failed to store reading");
        }
    }

    fn name(&self) -> &'static str {
        "HistorySink"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }

    fn filter(&self) -> EventFilter {
        EventFilter::only(&[Category::Reading])
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::events::{FanoutHub, SpectrumRow, StatusChange};
    use crate::mode::Mode;
    use crate::parsers::parse_reading;
    use crate::services::MemoryStore;
    use crate::sinks::SinkSet;

    #[tokio::test]
    async fn test_history_sink_stores_readings_only() {
        let hub = FanoutHub::new(16);
        let store = Arc::new(MemoryStore::new());
        let set = SinkSet::new(vec![Arc::new(HistorySink::new(store.clone()))], &hub);

        let line = json!({"model": "Acurite-Tower", "id": 1234, "temperature_C": 21.5}).to_string();
        let reading = parse_reading(&line, 5).unwrap();

        hub.publish(DomainEvent::StatusChange(StatusChange::started(Mode::Decode)));
        hub.publish(DomainEvent::Reading(reading));
        hub.publish(DomainEvent::SpectrumRow(SpectrumRow {
            freq_hz: 1.0,
            power_db: 0.0,
        }));
        hub.close();
        set.shutdown(Duration::from_secs(5)).await;

        let stored = store.query(Some("Acurite-Tower/1234"), 0);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].fields["temperature_C"], json!(21.5));
    }
}
