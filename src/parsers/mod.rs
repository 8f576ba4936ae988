//! # Output parsers, one per mode.
//!
//! A [`Parser`] turns the raw stdout of one external process into
//! [`DomainEvent`]s. The set of modes is closed, so dispatch is a plain enum
//! rather than a trait object:
//!
//! ```text
//! Mode::Decode        ──► DecodeParser    JSON lines      ──► Reading
//! Mode::ScanSweep     ──► SweepParser     CSV, batch      ──► SpectrumRow (on finish)
//! Mode::LiveSpectrum  ──► SpectrumParser  u8 I/Q          ──► SpectrumFrame
//! Mode::AudioListen   ──► AudioParser     s16le PCM       ──► AudioChunk
//! ```
//!
//! ## Rules
//! - `parse_chunk` accepts arbitrary chunk boundaries.
//! - Malformed input is dropped and counted in [`ParseCounters`], never returned as an error.
//! - `finish` is called once at end of stream and flushes whatever is buffered.
//! - A parser is not restartable; the supervisor builds a fresh one from its
//!   [`ParserSpec`] for every process it spawns.

mod audio;
mod decode;
mod peaks;
mod spectrum;
mod sweep;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;
use crate::events::DomainEvent;
use crate::mode::Mode;

pub use audio::AudioParser;
pub use decode::{DecodeParser, parse_reading};
pub use peaks::{Peak, PeakConfig, find_peaks};
pub use spectrum::{SpectrumParser, SpectrumSettings};
pub use sweep::{SweepParser, SweepResult, parse_sweep};

/// Per-mode parse counters, shared between parser and diagnostics.
#[derive(Debug, Default)]
pub struct ParseCounters {
    events: AtomicU64,
    malformed: AtomicU64,
}

/// Snapshot of [`ParseCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Events produced.
    pub events: u64,
    /// Lines/rows dropped as undecodable.
    pub malformed: u64,
}

impl ParseCounters {
    #[inline]
    pub(crate) fn event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn events_n(&self, n: u64) {
        self.events.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn malformed_n(&self, n: u64) {
        self.malformed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ParseStats {
        ParseStats {
            events: self.events.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Recipe for building a fresh parser for each spawned process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParserSpec {
    Decode { max_line_len: usize },
    Sweep,
    Spectrum(SpectrumSettings),
    Audio { format: AudioFormat, frame: Duration },
}

impl ParserSpec {
    /// Mode this parser belongs to.
    pub fn mode(&self) -> Mode {
        match self {
            ParserSpec::Decode { .. } => Mode::Decode,
            ParserSpec::Sweep => Mode::ScanSweep,
            ParserSpec::Spectrum(_) => Mode::LiveSpectrum,
            ParserSpec::Audio { .. } => Mode::AudioListen,
        }
    }

    pub fn build(&self, counters: Arc<ParseCounters>) -> Parser {
        match self {
            ParserSpec::Decode { max_line_len } => {
                Parser::Decode(DecodeParser::new(*max_line_len, counters))
            }
            ParserSpec::Sweep => Parser::Sweep(SweepParser::new(counters)),
            ParserSpec::Spectrum(settings) => {
                Parser::Spectrum(Box::new(SpectrumParser::new(*settings, counters)))
            }
            ParserSpec::Audio { format, frame } => {
                Parser::Audio(AudioParser::new(*format, *frame, counters))
            }
        }
    }
}

/// Tagged dispatch over the fixed parser set.
#[derive(Debug)]
pub enum Parser {
    Decode(DecodeParser),
    Sweep(SweepParser),
    Spectrum(Box<SpectrumParser>),
    Audio(AudioParser),
}

impl Parser {
    /// Feeds one stdout chunk; returns the events it completed.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<DomainEvent> {
        match self {
            Parser::Decode(p) => p.parse_chunk(chunk),
            Parser::Sweep(p) => p.parse_chunk(chunk),
            Parser::Spectrum(p) => p.parse_chunk(chunk),
            Parser::Audio(p) => p.parse_chunk(chunk),
        }
    }

    /// End of stream.
    pub fn finish(&mut self) -> Vec<DomainEvent> {
        match self {
            Parser::Decode(p) => p.finish(),
            Parser::Sweep(p) => p.finish(),
            Parser::Spectrum(p) => p.finish(),
            Parser::Audio(p) => p.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builds_matching_parser() {
        let counters = Arc::new(ParseCounters::default());
        let spec = ParserSpec::Decode { max_line_len: 1024 };
        assert_eq!(spec.mode(), Mode::Decode);

        let mut parser = spec.build(Arc::clone(&counters));
        let events = parser.parse_chunk(b"{\"model\":\"Oregon-THGR122N\",\"id\":12}\nnoise\n");
        assert_eq!(events.len(), 1);
        assert_eq!(
            counters.snapshot(),
            ParseStats {
                events: 1,
                malformed: 1
            }
        );
    }
}
