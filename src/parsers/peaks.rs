//! # Peak detection over a power-vs-frequency series.
//!
//! A sample is a peak when:
//! - it is an interior point (both neighbours exist),
//! - it exceeds both neighbours by at least `min_prominence_db`,
//! - it exceeds the floor `mean + floor_k · stddev` of all *other* samples.
//!
//! The candidate is left out of its own floor, otherwise a lone strong signal
//! inflates the deviation enough to hide itself on short series.
//!
//! Peaks are returned strongest first, at most `max_peaks` of them.

use serde::{Deserialize, Serialize};

use crate::events::SpectrumRow;

/// Thresholds for [`find_peaks`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Minimum excess over both neighbours, dB.
    pub min_prominence_db: f64,
    /// Floor multiplier `k` in `mean + k·stddev`.
    pub floor_k: f64,
    /// Maximum number of peaks reported.
    pub max_peaks: usize,
}

impl Default for PeakConfig {
    /// `min_prominence_db = 3.0`, `floor_k = 2.0`, `max_peaks = 10`.
    fn default() -> Self {
        Self {
            min_prominence_db: 3.0,
            floor_k: 2.0,
            max_peaks: 10,
        }
    }
}

/// A detected local maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Frequency in Hz.
    pub freq_hz: f64,
    /// Power in dB.
    pub power_db: f64,
    /// Excess over the higher neighbour, dB.
    pub prominence_db: f64,
}

/// Mean and population standard deviation of the powers.
pub fn power_stats(rows: &[SpectrumRow]) -> Option<(f64, f64)> {
    if rows.is_empty() {
        return None;
    }
    let n = rows.len() as f64;
    let mean = rows.iter().map(|r| r.power_db).sum::<f64>() / n;
    let var = rows.iter().map(|r| (r.power_db - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

/// Floor of one candidate from sums of deviations around the series mean.
struct Floor {
    mean: f64,
    sum: f64,
    sum_sq: f64,
    others: f64,
    k: f64,
}

impl Floor {
    fn new(rows: &[SpectrumRow], mean: f64, k: f64) -> Self {
        let (sum, sum_sq) = rows.iter().fold((0.0, 0.0), |(s, ss), r| {
            let d = r.power_db - mean;
            (s + d, ss + d * d)
        });
        Self {
            mean,
            sum,
            sum_sq,
            others: rows.len().saturating_sub(1).max(1) as f64,
            k,
        }
    }

    /// `mean + k·stddev` of every sample except `power_db`.
    fn without(&self, power_db: f64) -> f64 {
        let d = power_db - self.mean;
        let shift = (self.sum - d) / self.others;
        let var = ((self.sum_sq - d * d) / self.others - shift * shift).max(0.0);
        self.mean + shift + self.k * var.sqrt()
    }
}

/// Finds peaks in `rows` (ordered by frequency).
pub fn find_peaks(rows: &[SpectrumRow], cfg: &PeakConfig) -> Vec<Peak> {
    let Some((mean, _)) = power_stats(rows) else {
        return Vec::new();
    };
    let floor = Floor::new(rows, mean, cfg.floor_k);

    let mut peaks: Vec<Peak> = rows
        .windows(3)
        .filter_map(|w| {
            let (left, mid, right) = (w[0].power_db, w[1], w[2].power_db);
            let prominence = mid.power_db - left.max(right);
            (prominence >= cfg.min_prominence_db && mid.power_db > floor.without(mid.power_db))
                .then_some(Peak {
                freq_hz: mid.freq_hz,
                power_db: mid.power_db,
                prominence_db: prominence,
            })
        })
        .collect();

    peaks.sort_by(|a, b| b.power_db.total_cmp(&a.power_db));
    peaks.truncate(cfg.max_peaks);
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(powers: &[f64]) -> Vec<SpectrumRow> {
        powers
            .iter()
            .enumerate()
            .map(|(i, &p)| SpectrumRow {
                freq_hz: 100e6 + i as f64 * 1e3,
                power_db: p,
            })
            .collect()
    }

    #[test]
    fn test_single_isolated_maximum() {
        let mut powers = vec![-60.0; 41];
        powers[20] = -20.0;
        let peaks = find_peaks(&series(&powers), &PeakConfig::default());

        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].freq_hz, 100e6 + 20.0 * 1e3);
        assert_eq!(peaks[0].power_db, -20.0);
        assert_eq!(peaks[0].prominence_db, 40.0);
    }

    #[test]
    fn test_isolated_maximum_on_short_series() {
        for powers in [&[-60.0, -20.0, -60.0][..], &[-60.0, -60.0, -20.0, -60.0, -60.0]] {
            let peaks = find_peaks(&series(powers), &PeakConfig::default());
            assert_eq!(peaks.len(), 1, "{powers:?}");
            assert_eq!(peaks[0].power_db, -20.0);
            assert_eq!(peaks[0].prominence_db, 40.0);
        }
    }

    #[test]
    fn test_floor_still_rejects_ripple_in_noise() {
        // Small bumps inside a noisy series stay under mean + 2σ of the rest.
        let powers = [-60.0, -40.0, -62.0, -45.0, -58.0, -41.0, -61.0, -44.0, -60.0];
        let rows = series(&powers);
        let peaks = find_peaks(&rows, &PeakConfig::default());
        assert!(peaks.is_empty(), "{peaks:?}");
    }

    #[test]
    fn test_flat_series_has_no_peaks() {
        assert!(find_peaks(&series(&[-50.0; 16]), &PeakConfig::default()).is_empty());
        assert!(find_peaks(&[], &PeakConfig::default()).is_empty());
    }

    #[test]
    fn test_edges_are_not_peaks() {
        let mut powers = vec![-60.0; 10];
        powers[0] = -10.0;
        powers[9] = -10.0;
        assert!(find_peaks(&series(&powers), &PeakConfig::default()).is_empty());
    }

    #[test]
    fn test_sorted_descending_and_capped() {
        let mut powers = vec![-80.0; 60];
        for (i, p) in [(10, -30.0), (25, -10.0), (40, -20.0)] {
            powers[i] = p;
        }
        let cfg = PeakConfig {
            max_peaks: 2,
            floor_k: 1.0,
            ..PeakConfig::default()
        };
        let peaks = find_peaks(&series(&powers), &cfg);
        let got: Vec<f64> = peaks.iter().map(|p| p.power_db).collect();
        assert_eq!(got, vec![-10.0, -20.0]);
    }
}
