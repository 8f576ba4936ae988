//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the radiovisor runtime:
//! where the external tools live, how long `stop` waits before escalating,
//! how deep each subscriber queue is and how often heartbeats go out.
//!
//! ## Sentinel values
//! - `heartbeat = 0s` → no heartbeats on live streams
//! - `restart.max_attempts = 0` → crashed processes are never restarted
//! - `spectrum_interval = 0s` → every averaged window is emitted
//!
//! ## Environment overlay
//! [`Config::from_env`] starts from [`Config::default`] and applies any
//! `RADIOVISOR_*` variable that is set:
//!
//! | Variable                        | Field                   |
//! |---------------------------------|-------------------------|
//! | `RADIOVISOR_DECODE_BIN`         | `decode_bin`            |
//! | `RADIOVISOR_DECODE_CONF`        | `decode_conf`           |
//! | `RADIOVISOR_SWEEP_BIN`          | `sweep_bin`             |
//! | `RADIOVISOR_SPECTRUM_BIN`       | `spectrum_bin`          |
//! | `RADIOVISOR_AUDIO_BIN`          | `audio_bin`             |
//! | `RADIOVISOR_GRACE_MS`           | `grace`                 |
//! | `RADIOVISOR_HEARTBEAT_SECS`     | `heartbeat`             |
//! | `RADIOVISOR_HUB_QUEUE`          | `hub_queue_capacity`    |
//! | `RADIOVISOR_RESTART_ATTEMPTS`   | `restart.max_attempts`  |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::parsers::PeakConfig;
use crate::policies::RetryPolicy;

const ENV_PREFIX: &str = "RADIOVISOR_";

/// Global configuration for the radiovisor runtime.
///
/// ## Field semantics
/// - `*_bin`: executable for each mode (looked up on `PATH` when relative)
/// - `grace`: how long `stop` waits after SIGTERM before SIGKILL
/// - `hub_queue_capacity`: per-subscriber queue depth (min 1)
/// - `heartbeat`: liveness interval on live streams (`0s` = off)
/// - `restart`: what happens after an unexpected exit
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `rtl_433` executable used by [`Mode::Decode`](crate::Mode::Decode).
    pub decode_bin: PathBuf,
    /// Optional `rtl_433` configuration file; replaces frequency/rate/gain flags when set.
    pub decode_conf: Option<PathBuf>,
    /// `rtl_power` executable used by [`Mode::ScanSweep`](crate::Mode::ScanSweep).
    pub sweep_bin: PathBuf,
    /// `rtl_sdr` executable used by [`Mode::LiveSpectrum`](crate::Mode::LiveSpectrum).
    pub spectrum_bin: PathBuf,
    /// `rtl_fm` executable used by [`Mode::AudioListen`](crate::Mode::AudioListen).
    pub audio_bin: PathBuf,

    /// Grace period between SIGTERM and SIGKILL when stopping a process.
    ///
    /// Escalation is unconditional: after `grace` the process is killed.
    pub grace: Duration,

    /// Capacity of each subscriber's delivery queue.
    ///
    /// When full, the oldest queued event is dropped for that subscriber only.
    pub hub_queue_capacity: usize,

    /// Interval of heartbeat items on live event streams.
    pub heartbeat: Duration,

    /// Restart policy applied after a process exits without `stop`.
    pub restart: RetryPolicy,

    /// Longest accepted line of line-oriented output; longer lines are discarded.
    pub max_line_len: usize,

    /// Duration of audio covered by one PCM frame.
    pub audio_frame: Duration,

    /// Minimum spacing between two live spectrum frames.
    pub spectrum_interval: Duration,

    /// Maximum number of points per live spectrum frame (downsampled).
    pub spectrum_points: usize,

    /// Peak detection thresholds used for sweep results.
    pub peaks: PeakConfig,
}

impl Config {
    /// Returns the heartbeat interval as an `Option`.
    ///
    /// - `None` → heartbeats disabled
    /// - `Some(d)` → one heartbeat every `d` of silence
    #[inline]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat > Duration::ZERO).then_some(self.heartbeat)
    }

    /// Returns the hub queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn hub_capacity_clamped(&self) -> usize {
        self.hub_queue_capacity.max(1)
    }

    /// Returns the max line length clamped to a sane minimum.
    #[inline]
    pub fn max_line_len_clamped(&self) -> usize {
        self.max_line_len.max(256)
    }

    /// Defaults overlaid with `RADIOVISOR_*` environment variables.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`Config::from_env`] over an explicit variable list.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "DECODE_BIN" => cfg.decode_bin = PathBuf::from(value),
                "DECODE_CONF" => {
                    cfg.decode_conf = (!value.is_empty()).then(|| PathBuf::from(value))
                }
                "SWEEP_BIN" => cfg.sweep_bin = PathBuf::from(value),
                "SPECTRUM_BIN" => cfg.spectrum_bin = PathBuf::from(value),
                "AUDIO_BIN" => cfg.audio_bin = PathBuf::from(value),
                "GRACE_MS" => {
                    if let Some(ms) = parse_var::<u64>(name, value) {
                        cfg.grace = Duration::from_millis(ms);
                    }
                }
                "HEARTBEAT_SECS" => {
                    if let Some(secs) = parse_var::<u64>(name, value) {
                        cfg.heartbeat = Duration::from_secs(secs);
                    }
                }
                "HUB_QUEUE" => {
                    if let Some(n) = parse_var::<usize>(name, value) {
                        cfg.hub_queue_capacity = n;
                    }
                }
                "RESTART_ATTEMPTS" => {
                    if let Some(n) = parse_var::<u32>(name, value) {
                        cfg.restart.max_attempts = n;
                    }
                }
                _ => warn!(variable = %key.as_ref(), "unknown configuration variable"),
            }
        }
        cfg
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Option<T> {
    match value.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = %format!("{ENV_PREFIX}{name}"), value, "ignoring unparsable value");
            None
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - tools resolved from `PATH` (`rtl_433`, `rtl_power`, `rtl_sdr`, `rtl_fm`)
    /// - `grace = 5s`
    /// - `hub_queue_capacity = 64`
    /// - `heartbeat = 30s`
    /// - `restart = RetryPolicy::never()`
    /// - `max_line_len = 64 KiB`
    /// - `audio_frame = 100ms`
    /// - `spectrum_interval = 50ms`, `spectrum_points = 256`
    fn default() -> Self {
        Self {
            decode_bin: PathBuf::from("rtl_433"),
            decode_conf: None,
            sweep_bin: PathBuf::from("rtl_power"),
            spectrum_bin: PathBuf::from("rtl_sdr"),
            audio_bin: PathBuf::from("rtl_fm"),
            grace: Duration::from_secs(5),
            hub_queue_capacity: 64,
            heartbeat: Duration::from_secs(30),
            restart: RetryPolicy::never(),
            max_line_len: 64 * 1024,
            audio_frame: Duration::from_millis(100),
            spectrum_interval: Duration::from_millis(50),
            spectrum_points: 256,
            peaks: PeakConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_restart() {
        let cfg = Config::default();
        assert!(!cfg.restart.is_enabled());
        assert_eq!(cfg.heartbeat_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_vars_overlays_known_keys() {
        let cfg = Config::from_vars([
            ("RADIOVISOR_DECODE_BIN", "/opt/rtl_433/bin/rtl_433"),
            ("RADIOVISOR_GRACE_MS", "750"),
            ("RADIOVISOR_HEARTBEAT_SECS", "0"),
            ("RADIOVISOR_RESTART_ATTEMPTS", "3"),
            ("PATH", "/usr/bin"),
        ]);
        assert_eq!(cfg.decode_bin, PathBuf::from("/opt/rtl_433/bin/rtl_433"));
        assert_eq!(cfg.grace, Duration::from_millis(750));
        assert_eq!(cfg.heartbeat_interval(), None);
        assert_eq!(cfg.restart.max_attempts, 3);
    }

    #[test]
    fn test_from_vars_ignores_garbage() {
        let cfg = Config::from_vars([("RADIOVISOR_HUB_QUEUE", "lots")]);
        assert_eq!(cfg.hub_queue_capacity, 64);
    }

    #[test]
    fn test_capacity_is_clamped() {
        let cfg = Config {
            hub_queue_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.hub_capacity_clamped(), 1);
    }
}
