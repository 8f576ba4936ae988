//! # Fixed-duration PCM framing.
//!
//! [`AudioFramer`] accumulates raw PCM bytes as they arrive from the demodulator
//! and hands them out as frames of exactly `frame_len` bytes.
//!
//! ```text
//! push(137 B) push(4 KiB) push(9 B) ...
//!        │         │         │
//!        ▼         ▼         ▼
//!   [ accumulator (BytesMut) ] ──► next_frame() ──► Bytes (frame_len)
//!                              └─► flush()      ──► Bytes (< frame_len, end of stream only)
//! ```
//!
//! ## Rules
//! - Only complete frames are emitted; trailing bytes wait for the next push.
//! - Byte order is preserved regardless of how the input was chunked.
//! - A short frame appears only through [`AudioFramer::flush`].

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// PCM stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Samples per second per channel.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Bits per sample (16 for s16le).
    pub bit_depth: u16,
}

impl Default for AudioFormat {
    /// 48 kHz, mono, 16-bit signed little-endian.
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            bit_depth: 16,
        }
    }
}

impl AudioFormat {
    /// Bytes per sample frame (all channels).
    #[inline]
    pub fn block_align(&self) -> usize {
        usize::from(self.channels.max(1)) * usize::from(self.bit_depth.max(8)).div_ceil(8)
    }

    /// Bytes needed for `duration` of audio, rounded down to whole sample frames
    /// and never less than one sample frame.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let align = self.block_align();
        let per_sec = self.sample_rate as f64 * align as f64;
        let raw = (per_sec * duration.as_secs_f64()) as usize;
        (raw / align).max(1) * align
    }
}

/// Accumulates PCM bytes and emits fixed-size frames.
#[derive(Debug)]
pub struct AudioFramer {
    frame_len: usize,
    buf: BytesMut,
}

impl AudioFramer {
    /// Frames of `duration` of audio in `format`.
    pub fn new(format: AudioFormat, duration: Duration) -> Self {
        Self::with_frame_len(format.bytes_for(duration))
    }

    /// Frames of exactly `frame_len` bytes (min 1).
    pub fn with_frame_len(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            buf: BytesMut::with_capacity(frame_len * 2),
        }
    }

    /// Frame size in bytes.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Bytes waiting for a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Appends raw bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Takes one complete frame, if available.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        (self.buf.len() >= self.frame_len).then(|| self.buf.split_to(self.frame_len).freeze())
    }

    /// End of stream: returns the trailing partial frame, if any.
    pub fn flush(&mut self) -> Option<Bytes> {
        (!self.buf.is_empty()).then(|| self.buf.split().freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut AudioFramer) -> Vec<Bytes> {
        std::iter::from_fn(|| framer.next_frame()).collect()
    }

    fn frame_all(data: &[u8], chunks: &[usize], frame_len: usize) -> (Vec<Bytes>, Option<Bytes>) {
        let mut framer = AudioFramer::with_frame_len(frame_len);
        let mut frames = Vec::new();
        let mut rest = data;
        let mut i = 0;
        while !rest.is_empty() {
            let n = chunks[i % chunks.len()].min(rest.len());
            framer.push(&rest[..n]);
            frames.extend(drain(&mut framer));
            rest = &rest[n..];
            i += 1;
        }
        let tail = framer.flush();
        (frames, tail)
    }

    #[test]
    fn test_default_format_frame_size() {
        let fmt = AudioFormat::default();
        assert_eq!(fmt.block_align(), 2);
        // 48 kHz * 2 B * 100 ms
        assert_eq!(fmt.bytes_for(Duration::from_millis(100)), 9_600);
        assert_eq!(fmt.bytes_for(Duration::ZERO), 2);
    }

    #[test]
    fn test_only_complete_frames_until_flush() {
        let mut framer = AudioFramer::with_frame_len(4);
        framer.push(&[1, 2, 3]);
        assert!(framer.next_frame().is_none());
        framer.push(&[4, 5]);
        assert_eq!(framer.next_frame().unwrap().as_ref(), &[1, 2, 3, 4]);
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.pending(), 1);
        assert_eq!(framer.flush().unwrap().as_ref(), &[5]);
        assert!(framer.flush().is_none());
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let data: Vec<u8> = (0..10_007u32).map(|i| (i % 251) as u8).collect();
        let reference = frame_all(&data, &[data.len()], 960);

        for chunks in [&[1usize][..], &[7, 3], &[959, 961, 2], &[4096], &[13, 1000, 1]] {
            let got = frame_all(&data, chunks, 960);
            assert_eq!(got, reference, "chunks {chunks:?}");
        }

        let (frames, tail) = reference;
        assert!(frames.iter().all(|f| f.len() == 960));
        let joined: Vec<u8> = frames
            .iter()
            .flat_map(|f| f.iter().copied())
            .chain(tail.iter().flat_map(|t| t.iter().copied()))
            .collect();
        assert_eq!(joined, data);
    }
}
