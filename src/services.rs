//! # External collaborators.
//!
//! The runtime calls two services it does not implement:
//! - a [`ReadingStore`]: append-only history of decoded readings,
//! - a [`DevicePresence`] check: is the receiver plugged in and accessible.
//!
//! [`AssumePresent`] and [`MemoryStore`] are minimal implementations for tests
//! and embedders without real backends.

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::Reading;

/// Failure reported by an external service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{service}: {reason}")]
pub struct ServiceError {
    /// Which service failed.
    pub service: &'static str,
    /// Service-provided message.
    pub reason: String,
}

impl ServiceError {
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}

/// Append-only history of readings.
#[async_trait]
pub trait ReadingStore: Send + Sync + 'static {
    /// Persists one reading.
    async fn append(&self, reading: &Reading) -> Result<(), ServiceError>;
}

/// Hardware presence / permission check, run before every start.
#[async_trait]
pub trait DevicePresence: Send + Sync + 'static {
    /// `Ok` if the receiver can be opened.
    async fn check(&self) -> Result<(), ServiceError>;
}

/// Presence check that always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumePresent;

#[async_trait]
impl DevicePresence for AssumePresent {
    async fn check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// In-memory [`ReadingStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: Mutex<Vec<Reading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readings of `device_key` (see [`Reading::device_key`]) received at or after `since_ms`.
    pub fn query(&self, device_key: Option<&str>, since_ms: u64) -> Vec<Reading> {
        self.readings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.received_at_ms >= since_ms)
            .filter(|r| device_key.is_none_or(|k| r.device_key() == k))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.readings.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn append(&self, reading: &Reading) -> Result<(), ServiceError> {
        self.readings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(reading.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;

    fn reading(model: &str, id: &str, at: u64) -> Reading {
        Reading {
            model: model.into(),
            id: Some(id.into()),
            channel: None,
            battery_ok: None,
            time: None,
            received_at_ms: at,
            fields: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_query_by_device_and_time() {
        let store = MemoryStore::new();
        store.append(&reading("LaCrosse-TX141THBv2", "1", 10)).await.unwrap();
        store.append(&reading("LaCrosse-TX141THBv2", "2", 20)).await.unwrap();
        store.append(&reading("LaCrosse-TX141THBv2", "1", 30)).await.unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.query(Some("LaCrosse-TX141THBv2/1"), 0).len(), 2);
        assert_eq!(store.query(None, 15).len(), 2);
        assert_eq!(store.query(Some("LaCrosse-TX141THBv2/1"), 15).len(), 1);
    }
}
