//! # Receiver modes.
//!
//! A [`Mode`] names one of the mutually exclusive ways the receiver can be used.
//! Exactly one mode may own the hardware at a time; the
//! [`DeviceArbiter`](crate::DeviceArbiter) enforces this.
//!
//! | Mode            | External tool | Output shape                      |
//! |-----------------|---------------|-----------------------------------|
//! | `Decode`        | `rtl_433`     | JSON lines, continuous            |
//! | `ScanSweep`     | `rtl_power`   | CSV rows, one batch then exit     |
//! | `LiveSpectrum`  | `rtl_sdr`     | raw 8-bit I/Q, continuous         |
//! | `AudioListen`   | `rtl_fm`      | raw s16le mono PCM, continuous    |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Mutually exclusive receiver usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Continuous protocol decoding.
    Decode,
    /// Wide-band power scan (runs to completion).
    ScanSweep,
    /// Live FFT display.
    LiveSpectrum,
    /// Demodulated audio listening.
    AudioListen,
}

impl Mode {
    /// All modes, in declaration order.
    pub const ALL: [Mode; 4] = [
        Mode::Decode,
        Mode::ScanSweep,
        Mode::LiveSpectrum,
        Mode::AudioListen,
    ];

    /// Returns a short stable label (snake_case) for logs and wire formats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Decode => "decode",
            Mode::ScanSweep => "scan_sweep",
            Mode::LiveSpectrum => "live_spectrum",
            Mode::AudioListen => "audio_listen",
        }
    }

    /// Position in [`Mode::ALL`]; used to index per-mode tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Mode::Decode => 0,
            Mode::ScanSweep => 1,
            Mode::LiveSpectrum => 2,
            Mode::AudioListen => 3,
        }
    }

    /// True for modes whose process runs once and exits with a result.
    ///
    /// A batch exit with status 0 is a completion, not a crash.
    #[inline]
    pub fn is_batch(&self) -> bool {
        matches!(self, Mode::ScanSweep)
    }

    /// True for modes whose stdout is newline-delimited text.
    #[inline]
    pub fn is_line_oriented(&self) -> bool {
        matches!(self, Mode::Decode | Mode::ScanSweep)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Demodulation passed to `rtl_fm -M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modulation {
    /// Wideband FM (broadcast radio).
    #[default]
    Wbfm,
    /// Narrow FM (two-way radio, amateur, FRS/GMRS).
    Fm,
    /// AM (aircraft, CB, shortwave).
    Am,
    /// Upper sideband.
    Usb,
    /// Lower sideband.
    Lsb,
    /// Unprocessed samples.
    Raw,
}

impl Modulation {
    /// Value passed on the `rtl_fm` command line.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Modulation::Wbfm => "wbfm",
            Modulation::Fm => "fm",
            Modulation::Am => "am",
            Modulation::Usb => "usb",
            Modulation::Lsb => "lsb",
            Modulation::Raw => "raw",
        }
    }

    /// Capture sample rate `rtl_fm` needs for this demodulation.
    pub fn capture_rate(&self) -> u32 {
        match self {
            Modulation::Wbfm => 200_000,
            _ => 48_000,
        }
    }

    /// Parses a modulation name; unknown names fall back to narrow FM.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "wbfm" => Modulation::Wbfm,
            "am" => Modulation::Am,
            "usb" => Modulation::Usb,
            "lsb" => Modulation::Lsb,
            "raw" => Modulation::Raw,
            _ => Modulation::Fm,
        }
    }
}
