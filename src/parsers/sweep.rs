//! # Sweep-mode parser (`rtl_power` CSV, batch).
//!
//! `rtl_power -1` scans the requested range once and exits. Each CSV row covers
//! one tuner hop:
//!
//! ```text
//! date,       time,     Hz low,    Hz high,   Hz step, samples, dB,    dB,    ...
//! 2024-01-15, 10:30:00, 88000000,  90000000,  10000,   4096,    -52.1, -51.8, ...
//! ```
//!
//! The output is buffered until the process exits; [`SweepParser::finish`] then
//! emits every bin as a [`SpectrumRow`], ordered by frequency.

use std::sync::Arc;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ParseCounters;
use super::peaks::{Peak, PeakConfig, find_peaks, power_stats};
use crate::events::{DomainEvent, SpectrumRow};

/// Aggregate result of one sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    /// All bins, ascending frequency.
    pub rows: Vec<SpectrumRow>,
    /// Detected peaks, strongest first.
    pub peaks: Vec<Peak>,
    /// Mean power over all bins (`NaN`-free; `0` if no bins).
    pub average_power: f64,
    /// Number of bins.
    pub total_points: usize,
}

impl SweepResult {
    /// Builds the result (peaks, average) from ordered rows.
    pub fn from_rows(rows: Vec<SpectrumRow>, peaks: &PeakConfig) -> Self {
        let average_power = power_stats(&rows).map_or(0.0, |(mean, _)| mean);
        Self {
            peaks: find_peaks(&rows, peaks),
            average_power,
            total_points: rows.len(),
            rows,
        }
    }
}

/// Parses one CSV row into its bins; `None` if the row is not a data row.
fn parse_row(line: &str) -> Option<Vec<SpectrumRow>> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 7 {
        return None;
    }
    let low: f64 = fields[2].parse().ok()?;
    let high: f64 = fields[3].parse().ok()?;
    let mut step: f64 = fields[4].parse().ok()?;
    let bins = &fields[6..];
    if !(low.is_finite() && high.is_finite() && high >= low) {
        return None;
    }
    if !(step.is_finite() && step > 0.0) {
        step = (high - low) / bins.len() as f64;
    }

    Some(
        bins.iter()
            .enumerate()
            .filter_map(|(i, v)| {
                let power: f64 = v.parse().ok()?;
                power.is_finite().then_some(SpectrumRow {
                    freq_hz: low + i as f64 * step,
                    power_db: power,
                })
            })
            .collect(),
    )
}

/// Parses a complete `rtl_power` output; returns rows by ascending frequency
/// and the number of rejected lines.
pub fn parse_sweep(text: &str) -> (Vec<SpectrumRow>, u64) {
    let mut rows = Vec::new();
    let mut rejected = 0;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_row(line) {
            Some(bins) => rows.extend(bins),
            None => rejected += 1,
        }
    }
    rows.sort_by(|a, b| a.freq_hz.total_cmp(&b.freq_hz));
    (rows, rejected)
}

/// Batch parser: buffers everything, parses on [`finish`](Self::finish).
#[derive(Debug)]
pub struct SweepParser {
    buf: BytesMut,
    counters: Arc<ParseCounters>,
}

impl SweepParser {
    pub fn new(counters: Arc<ParseCounters>) -> Self {
        Self {
            buf: BytesMut::new(),
            counters,
        }
    }

    /// Buffers output; never emits before the batch is complete.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<DomainEvent> {
        self.buf.extend_from_slice(chunk);
        Vec::new()
    }

    pub fn finish(&mut self) -> Vec<DomainEvent> {
        let raw = self.buf.split();
        let text = String::from_utf8_lossy(&raw);
        let (rows, rejected) = parse_sweep(&text);
        if rejected > 0 {
            self.counters.malformed_n(rejected);
            debug!(rejected, "skipped unparsable sweep rows");
        }
        self.counters.events_n(rows.len() as u64);
        rows.into_iter().map(DomainEvent::SpectrumRow).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
2024-01-15, 10:30:00, 90000000, 92000000, 500000, 4096, -40.0, -41.0, -42.0, -43.0
2024-01-15, 10:30:00, 88000000, 90000000, 500000, 4096, -50.0, -51.0, nan, -53.0
warning: something odd
";

    #[test]
    fn test_rows_are_sorted_and_nan_skipped() {
        let (rows, rejected) = parse_sweep(CSV);
        assert_eq!(rejected, 1);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].freq_hz, 88_000_000.0);
        assert_eq!(rows[0].power_db, -50.0);
        assert!(rows.windows(2).all(|w| w[0].freq_hz <= w[1].freq_hz));
        assert_eq!(rows.last().unwrap().freq_hz, 91_500_000.0);
    }

    #[test]
    fn test_parser_emits_only_on_finish() {
        let counters = Arc::new(ParseCounters::default());
        let mut p = SweepParser::new(Arc::clone(&counters));
        let (a, b) = CSV.split_at(30);
        assert!(p.parse_chunk(a.as_bytes()).is_empty());
        assert!(p.parse_chunk(b.as_bytes()).is_empty());

        let events = p.finish();
        assert_eq!(events.len(), 7);
        assert_eq!(counters.snapshot().malformed, 1);
        assert!(p.finish().is_empty());
    }

    #[test]
    fn test_result_summary() {
        let (rows, _) = parse_sweep(CSV);
        let result = SweepResult::from_rows(rows, &PeakConfig::default());
        assert_eq!(result.total_points, 7);
        let expected = (-40.0 - 41.0 - 42.0 - 43.0 - 50.0 - 51.0 - 53.0) / 7.0;
        assert!((result.average_power - expected).abs() < 1e-9);
    }
}
