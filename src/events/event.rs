//! # Domain events produced by the output parsers.
//!
//! A [`DomainEvent`] is created per parsed line/frame, is immutable once built,
//! and flows one way: parser → [`FanoutHub`](crate::FanoutHub) → subscribers.
//!
//! The [`Category`] of an event is what subscribers filter on.
//!
//! ## Wire form
//! Events serialize as internally tagged JSON objects:
//! ```text
//! {"type":"reading","model":"Acurite-Tower","id":"1234",...}
//! {"type":"spectrum_frame","center_freq_mhz":433.92,...}
//! {"type":"status_change","mode":"decode","running":false,"exit_code":1}
//! ```
//!
//! ## Example
//! ```rust
//! use radiovisor::{Category, DomainEvent, EventFilter, Mode, StatusChange};
//!
//! let ev = DomainEvent::StatusChange(StatusChange::stopped(Mode::Decode, Some(1)));
//! assert_eq!(ev.category(), Category::Status);
//! assert!(EventFilter::only(&[Category::Status]).matches(&ev));
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mode::Mode;

/// Milliseconds since the Unix epoch (0 if the clock is before 1970).
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

/// One decoded sensor transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Device model reported by the decoder.
    pub model: String,
    /// Device id (numbers are stringified).
    pub id: Option<String>,
    /// Channel (numbers are stringified; some devices use letters).
    pub channel: Option<String>,
    /// Battery state, if reported.
    pub battery_ok: Option<bool>,
    /// Timestamp as printed by the decoder, if any.
    pub time: Option<String>,
    /// When the line was parsed, ms since the Unix epoch.
    pub received_at_ms: u64,
    /// Every other field of the record.
    pub fields: Map<String, Value>,
}

impl Reading {
    /// Key used by the history store: `model/id`, or just `model` without an id.
    pub fn device_key(&self) -> String {
        match &self.id {
            Some(id) => format!("{}/{}", self.model, id),
            None => self.model.clone(),
        }
    }
}

/// One (frequency, power) sample of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRow {
    /// Bin frequency in Hz.
    pub freq_hz: f64,
    /// Power in dB.
    pub power_db: f64,
}

/// One averaged live power spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Tuned center frequency.
    pub center_freq_mhz: f64,
    /// Capture sample rate.
    pub sample_rate_mhz: f64,
    /// Bin frequencies (downsampled), ascending.
    pub freqs_mhz: Vec<f64>,
    /// Bin powers in dB, same length as `freqs_mhz`.
    pub power_db: Vec<f32>,
    /// Minimum power over the full-resolution spectrum.
    pub min: f32,
    /// Maximum power over the full-resolution spectrum.
    pub max: f32,
    /// Mean power over the full-resolution spectrum.
    pub avg: f32,
}

/// One fixed-duration frame of PCM audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Interleaved little-endian samples.
    pub bytes: Bytes,
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Bits per sample.
    pub bit_depth: u16,
}

/// A mode's process started or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Mode concerned.
    pub mode: Mode,
    /// Whether its process is now running.
    pub running: bool,
    /// Exit code when stopping (`None` if killed by a signal or still running).
    pub exit_code: Option<i32>,
}

impl StatusChange {
    /// Process for `mode` is now running.
    pub fn started(mode: Mode) -> Self {
        Self {
            mode,
            running: true,
            exit_code: None,
        }
    }

    /// Process for `mode` has exited.
    pub fn stopped(mode: Mode, exit_code: Option<i32>) -> Self {
        Self {
            mode,
            running: false,
            exit_code,
        }
    }
}

/// Event flowing from parsers to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Decoded sensor record (decode mode).
    Reading(Reading),
    /// Sweep sample (scan mode).
    SpectrumRow(SpectrumRow),
    /// Averaged FFT frame (live spectrum mode).
    SpectrumFrame(SpectrumFrame),
    /// PCM frame (audio mode).
    AudioChunk(AudioChunk),
    /// Process lifecycle change (any mode).
    StatusChange(StatusChange),
}

impl DomainEvent {
    /// Returns the filter category of this event.
    pub fn category(&self) -> Category {
        match self {
            DomainEvent::Reading(_) => Category::Reading,
            DomainEvent::SpectrumRow(_) => Category::SpectrumRow,
            DomainEvent::SpectrumFrame(_) => Category::SpectrumFrame,
            DomainEvent::AudioChunk(_) => Category::Audio,
            DomainEvent::StatusChange(_) => Category::Status,
        }
    }

    #[inline]
    pub fn is_status(&self) -> bool {
        matches!(self, DomainEvent::StatusChange(_))
    }
}

/// Event category used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Reading,
    SpectrumRow,
    SpectrumFrame,
    Audio,
    Status,
}

impl Category {
    #[inline]
    fn bit(self) -> u8 {
        match self {
            Category::Reading => 1 << 0,
            Category::SpectrumRow => 1 << 1,
            Category::SpectrumFrame => 1 << 2,
            Category::Audio => 1 << 3,
            Category::Status => 1 << 4,
        }
    }
}

/// Set of categories a subscriber wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    bits: u8,
}

impl Default for EventFilter {
    /// Returns [`EventFilter::all`].
    fn default() -> Self {
        Self::all()
    }
}

impl EventFilter {
    /// Every category.
    pub fn all() -> Self {
        Self { bits: 0b1_1111 }
    }

    /// Exactly the given categories.
    pub fn only(categories: &[Category]) -> Self {
        Self {
            bits: categories.iter().fold(0, |acc, c| acc | c.bit()),
        }
    }

    /// Adds a category.
    pub fn with(mut self, category: Category) -> Self {
        self.bits |= category.bit();
        self
    }

    /// True if the category is included.
    #[inline]
    pub fn contains(&self, category: Category) -> bool {
        self.bits & category.bit() != 0
    }

    /// True if the event should be delivered.
    #[inline]
    pub fn matches(&self, event: &DomainEvent) -> bool {
        self.contains(event.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_change_serializes_tagged() {
        let ev = DomainEvent::StatusChange(StatusChange::stopped(Mode::AudioListen, None));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "status_change");
        assert_eq!(json["mode"], "audio_listen");
        assert_eq!(json["running"], false);
    }

    #[test]
    fn test_filter_only_excludes_others() {
        let filter = EventFilter::only(&[Category::Audio]).with(Category::Status);
        assert!(filter.contains(Category::Audio));
        assert!(filter.contains(Category::Status));
        assert!(!filter.contains(Category::Reading));
        assert!(!filter.contains(Category::SpectrumFrame));
    }

    #[test]
    fn test_device_key() {
        let mut reading = Reading {
            model: "Acurite-Tower".into(),
            id: Some("1234".into()),
            channel: Some("A".into()),
            battery_ok: Some(true),
            time: None,
            received_at_ms: 0,
            fields: Map::new(),
        };
        assert_eq!(reading.device_key(), "Acurite-Tower/1234");
        reading.id = None;
        assert_eq!(reading.device_key(), "Acurite-Tower");
    }
}
