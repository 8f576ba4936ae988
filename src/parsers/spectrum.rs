//! # Live-spectrum parser (raw 8-bit I/Q → averaged power spectra).
//!
//! `rtl_sdr` writes interleaved unsigned 8-bit I/Q pairs. Every `fft_size` pairs
//! form one FFT frame:
//!
//! ```text
//! u8 I,Q ──► (x − 127.5) ──► Hann window ──► FFT ──► fftshift ──► 20·log10(|X| + 1e-10)
//!                                                                     │
//!                     sum over `averaging` frames ◄───────────────────┘
//!                                 │
//!                                 ▼
//!         SpectrumFrame { freqs, power (downsampled), min, max, avg }
//! ```
//!
//! ## Rules
//! - One frame is emitted per `averaging` FFT frames (block average).
//! - `min`/`max`/`avg` are computed over the full-resolution average.
//! - Output is downsampled with a fixed stride so at most `max_points` remain.
//! - Within `interval` of the last emitted frame, incoming raw frames are
//!   discarded without running the FFT.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::ParseCounters;
use crate::events::{DomainEvent, SpectrumFrame};

/// Settings of one live-spectrum session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumSettings {
    /// Tuned center frequency, Hz.
    pub center_freq_hz: u64,
    /// Capture sample rate, Hz.
    pub sample_rate_hz: u32,
    /// FFT length (I/Q pairs per frame).
    pub fft_size: usize,
    /// Frames averaged per emitted spectrum.
    pub averaging: usize,
    /// Maximum points per emitted spectrum.
    pub max_points: usize,
    /// Minimum spacing between emitted spectra.
    pub interval: Duration,
}

/// Hann window, symmetric form (`0.5 − 0.5·cos(2πn/(N−1))`).
fn hann(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1) as f32).cos()))
        .collect()
}

/// Index into an unshifted FFT output for shifted position `j`.
#[inline]
fn unshift(j: usize, n: usize) -> usize {
    (j + n - n / 2) % n
}

/// Frequency offset (Hz) of unshifted bin `k`, as numpy's `fftfreq`.
#[inline]
fn bin_offset(k: usize, n: usize, rate: f64) -> f64 {
    let k = if k < n.div_ceil(2) {
        k as f64
    } else {
        k as f64 - n as f64
    };
    k * rate / n as f64
}

/// Stateful FFT averager.
pub struct SpectrumParser {
    settings: SpectrumSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    raw: BytesMut,
    acc: Vec<f32>,
    acc_frames: usize,
    freqs_mhz: Vec<f64>,
    stride: usize,
    last_emit: Option<Instant>,
    counters: Arc<ParseCounters>,
}

impl std::fmt::Debug for SpectrumParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumParser")
            .field("settings", &self.settings)
            .field("acc_frames", &self.acc_frames)
            .finish()
    }
}

impl SpectrumParser {
    pub fn new(settings: SpectrumSettings, counters: Arc<ParseCounters>) -> Self {
        let n = settings.fft_size.max(2);
        let settings = SpectrumSettings {
            fft_size: n,
            averaging: settings.averaging.max(1),
            max_points: settings.max_points.max(1),
            ..settings
        };
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);

        let stride = (n / settings.max_points).max(1);
        let center_mhz = settings.center_freq_hz as f64 / 1e6;
        let rate = f64::from(settings.sample_rate_hz);
        let freqs_mhz = (0..n)
            .step_by(stride)
            .map(|j| center_mhz + bin_offset(unshift(j, n), n, rate) / 1e6)
            .collect();

        Self {
            settings,
            scratch: vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()],
            fft,
            window: hann(n),
            raw: BytesMut::with_capacity(n * 4),
            acc: vec![0.0; n],
            acc_frames: 0,
            freqs_mhz,
            stride,
            last_emit: None,
            counters,
        }
    }

    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<DomainEvent> {
        self.raw.extend_from_slice(chunk);
        let frame_bytes = self.settings.fft_size * 2;
        let mut out = Vec::new();

        while self.raw.len() >= frame_bytes {
            if self.throttled() {
                self.raw.advance(frame_bytes);
                continue;
            }
            let frame = self.raw.split_to(frame_bytes);
            self.accumulate(&frame);
            if self.acc_frames >= self.settings.averaging {
                out.push(DomainEvent::SpectrumFrame(self.emit()));
                self.counters.event();
            }
        }
        out
    }

    /// Trailing partial I/Q data is not a spectrum; nothing to emit.
    pub fn finish(&mut self) -> Vec<DomainEvent> {
        self.raw.clear();
        Vec::new()
    }

    fn throttled(&self) -> bool {
        self.acc_frames == 0
            && !self.settings.interval.is_zero()
            && self
                .last_emit
                .is_some_and(|t| t.elapsed() < self.settings.interval)
    }

    fn accumulate(&mut self, frame: &[u8]) {
        let n = self.settings.fft_size;
        let mut buf: Vec<Complex<f32>> = frame
            .chunks_exact(2)
            .zip(&self.window)
            .map(|(iq, w)| {
                Complex::new(
                    (f32::from(iq[0]) - 127.5) * w,
                    (f32::from(iq[1]) - 127.5) * w,
                )
            })
            .collect();
        self.fft.process_with_scratch(&mut buf, &mut self.scratch);

        for (j, acc) in self.acc.iter_mut().enumerate() {
            *acc += 20.0 * (buf[unshift(j, n)].norm() + 1e-10).log10();
        }
        self.acc_frames += 1;
    }

    fn emit(&mut self) -> SpectrumFrame {
        let frames = self.acc_frames as f32;
        let avg: Vec<f32> = self.acc.iter().map(|p| p / frames).collect();
        self.acc.iter_mut().for_each(|p| *p = 0.0);
        self.acc_frames = 0;
        self.last_emit = Some(Instant::now());

        let (min, max, sum) = avg.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY, 0.0f64),
            |(lo, hi, s), &p| (lo.min(p), hi.max(p), s + f64::from(p)),
        );

        SpectrumFrame {
            center_freq_mhz: self.settings.center_freq_hz as f64 / 1e6,
            sample_rate_mhz: f64::from(self.settings.sample_rate_hz) / 1e6,
            freqs_mhz: self.freqs_mhz.clone(),
            power_db: avg.iter().step_by(self.stride).copied().collect(),
            min,
            max,
            avg: (sum / avg.len() as f64) as f32,
        }
    }
}
