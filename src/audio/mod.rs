//! Audio framing for the audio-listen mode.
//!
//! The demodulator writes an unbounded stream of raw PCM; this module only cuts
//! it into fixed-duration frames matching the playback buffer of consumers.

mod framer;

pub use framer::{AudioFormat, AudioFramer};
