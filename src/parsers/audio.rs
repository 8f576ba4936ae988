//! # Audio-mode parser.
//!
//! `rtl_fm` stdout is raw PCM; nothing is interpreted, the bytes are only cut
//! into fixed-duration frames by the [`AudioFramer`].

use std::sync::Arc;
use std::time::Duration;

use super::ParseCounters;
use crate::audio::{AudioFormat, AudioFramer};
use crate::events::{AudioChunk, DomainEvent};

#[derive(Debug)]
pub struct AudioParser {
    format: AudioFormat,
    framer: AudioFramer,
    counters: Arc<ParseCounters>,
}

impl AudioParser {
    pub fn new(format: AudioFormat, frame: Duration, counters: Arc<ParseCounters>) -> Self {
        Self {
            format,
            framer: AudioFramer::new(format, frame),
            counters,
        }
    }

    fn chunk(&self, bytes: bytes::Bytes) -> DomainEvent {
        self.counters.event();
        DomainEvent::AudioChunk(AudioChunk {
            bytes,
            sample_rate: self.format.sample_rate,
            channels: self.format.channels,
            bit_depth: self.format.bit_depth,
        })
    }

    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<DomainEvent> {
        self.framer.push(chunk);
        let mut out = Vec::new();
        while let Some(frame) = self.framer.next_frame() {
            out.push(self.chunk(frame));
        }
        out
    }

    /// End of stream: the only place a short frame is emitted.
    pub fn finish(&mut self) -> Vec<DomainEvent> {
        self.framer
            .flush()
            .map(|tail| self.chunk(tail))
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_carry_format() {
        let mut p = AudioParser::new(
            AudioFormat::default(),
            Duration::from_millis(10),
            Arc::default(),
        );
        // 10 ms at 48 kHz s16 mono = 960 bytes
        let events = p.parse_chunk(&[0u8; 2000]);
        assert_eq!(events.len(), 2);
        let DomainEvent::AudioChunk(chunk) = &events[0] else {
            panic!("expected audio");
        };
        assert_eq!(chunk.bytes.len(), 960);
        assert_eq!(chunk.sample_rate, 48_000);
        assert_eq!(chunk.bit_depth, 16);

        let tail = p.finish();
        assert_eq!(tail.len(), 1);
        assert!(p.finish().is_empty());
    }
}
