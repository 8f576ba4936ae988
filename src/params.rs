//! # Mode parameters and command building.
//!
//! [`ModeParams`] carries what a caller may choose when starting a mode. Each
//! variant validates itself and turns into a [`Launch`]: the argv of the
//! external tool plus the recipe of the parser that reads its output.
//!
//! ```text
//! ModeParams ──validated()──► ModeParams (normalized)
//!            ──launch(&Config)──► Launch { command: CommandSpec, parser: ParserSpec }
//! ```
//!
//! ## Normalization vs rejection
//! - `fft_size` is rounded down to a power of two and clamped to `[256, 4096]`.
//! - `averaging` is clamped to `[1, 16]`.
//! - Gain outside `[0, 50]` dB, zero/out-of-range frequencies, an empty sweep
//!   span and zero sample rates are rejected with
//!   [`ControlError::InvalidParams`].

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;
use crate::config::Config;
use crate::core::CommandSpec;
use crate::error::ControlError;
use crate::mode::{Mode, Modulation};
use crate::parsers::{ParserSpec, SpectrumSettings};

/// Lowest frequency accepted anywhere (Hz).
pub const MIN_FREQ_HZ: u64 = 100_000;
/// Highest frequency accepted anywhere (Hz).
pub const MAX_FREQ_HZ: u64 = 2_200_000_000;
/// Highest tuner gain accepted (dB).
pub const MAX_GAIN_DB: u32 = 50;

const FFT_MIN: usize = 256;
const FFT_MAX: usize = 4096;
const AVG_MAX: usize = 16;
const MAX_SAMPLE_RATE: u32 = 3_200_000;

/// Parses `"433.92M"`, `"1024k"`, `"1.2G"` or plain `"100000"` into Hz.
///
/// # Example
/// ```
/// use radiovisor::parse_frequency;
///
/// assert_eq!(parse_frequency("433.92M").unwrap(), 433_920_000);
/// assert_eq!(parse_frequency(" 1024k ").unwrap(), 1_024_000);
/// assert!(parse_frequency("fast").is_err());
/// ```
pub fn parse_frequency(s: &str) -> Result<u64, ControlError> {
    let upper = s.trim().to_ascii_uppercase();
    let (num, mult) = match upper.chars().last() {
        Some('K') => (&upper[..upper.len() - 1], 1e3),
        Some('M') => (&upper[..upper.len() - 1], 1e6),
        Some('G') => (&upper[..upper.len() - 1], 1e9),
        _ => (upper.as_str(), 1.0),
    };
    let value: f64 = num
        .trim()
        .parse()
        .map_err(|_| ControlError::invalid(format!("not a frequency: {s:?}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ControlError::invalid(format!("not a frequency: {s:?}")));
    }
    Ok((value * mult).round() as u64)
}

fn check_freq(name: &str, hz: u64) -> Result<(), ControlError> {
    if (MIN_FREQ_HZ..=MAX_FREQ_HZ).contains(&hz) {
        Ok(())
    } else {
        Err(ControlError::invalid(format!(
            "{name} {hz} Hz outside {MIN_FREQ_HZ}..={MAX_FREQ_HZ} Hz"
        )))
    }
}

fn check_gain(gain: u32) -> Result<(), ControlError> {
    if gain <= MAX_GAIN_DB {
        Ok(())
    } else {
        Err(ControlError::invalid(format!(
            "gain {gain} dB outside 0..={MAX_GAIN_DB}"
        )))
    }
}

fn check_rate(rate: u32) -> Result<(), ControlError> {
    if (1..=MAX_SAMPLE_RATE).contains(&rate) {
        Ok(())
    } else {
        Err(ControlError::invalid(format!(
            "sample rate {rate} outside 1..={MAX_SAMPLE_RATE}"
        )))
    }
}

/// Rounds down to a power of two and clamps to `[256, 4096]`.
pub fn normalize_fft_size(n: usize) -> usize {
    let pow2 = if n == 0 { 1 } else { 1usize << n.ilog2() };
    pow2.clamp(FFT_MIN, FFT_MAX)
}

/// Parameters of [`Mode::Decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// Hz.
    pub frequency: u64,
    /// Hz.
    pub sample_rate: u32,
    /// dB.
    pub gain: u32,
    /// Decoder protocol numbers (`-R`); empty = decoder defaults.
    pub protocols: Vec<u32>,
}

impl Default for DecodeParams {
    /// 433.92 MHz, 1024 kS/s, 40 dB.
    fn default() -> Self {
        Self {
            frequency: 433_920_000,
            sample_rate: 1_024_000,
            gain: 40,
            protocols: Vec::new(),
        }
    }
}

/// Parameters of [`Mode::ScanSweep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepParams {
    /// Hz.
    pub start_freq: u64,
    /// Hz.
    pub end_freq: u64,
    /// Hz per bin.
    pub bin_size: u32,
    /// Seconds of integration per hop.
    pub integration_secs: u32,
    /// dB.
    pub gain: u32,
}

impl Default for SweepParams {
    /// FM broadcast band, 10 kHz bins, 1 s integration, 40 dB.
    fn default() -> Self {
        Self {
            start_freq: 88_000_000,
            end_freq: 108_000_000,
            bin_size: 10_000,
            integration_secs: 1,
            gain: 40,
        }
    }
}

/// Parameters of [`Mode::LiveSpectrum`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumParams {
    /// Hz.
    pub center_freq: u64,
    /// Hz.
    pub sample_rate: u32,
    /// FFT length.
    pub fft_size: usize,
    /// dB.
    pub gain: u32,
    /// FFT frames per emitted spectrum.
    pub averaging: usize,
}

impl Default for SpectrumParams {
    /// 433.92 MHz, 2.048 MS/s, 1024-point FFT, 40 dB, 4 frames averaged.
    fn default() -> Self {
        Self {
            center_freq: 433_920_000,
            sample_rate: 2_048_000,
            fft_size: 1024,
            gain: 40,
            averaging: 4,
        }
    }
}

/// Parameters of [`Mode::AudioListen`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioParams {
    /// Hz.
    pub frequency: u64,
    pub modulation: Modulation,
    /// dB.
    pub gain: u32,
    /// Squelch level; 0 = open.
    pub squelch: u32,
    /// Frequency correction, ppm.
    pub ppm: i32,
    /// PCM output rate, Hz.
    pub output_rate: u32,
}

impl Default for AudioParams {
    /// 101.5 MHz wideband FM, 40 dB, open squelch, 48 kHz output.
    fn default() -> Self {
        Self {
            frequency: 101_500_000,
            modulation: Modulation::Wbfm,
            gain: 40,
            squelch: 0,
            ppm: 0,
            output_rate: 48_000,
        }
    }
}

impl AudioParams {
    /// Output PCM format (mono s16le at `output_rate`).
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.output_rate,
            ..AudioFormat::default()
        }
    }
}

/// What the external tool and its parser need to run one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    pub command: CommandSpec,
    pub parser: ParserSpec,
}

impl Launch {
    pub fn mode(&self) -> Mode {
        self.parser.mode()
    }
}

/// Start request for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeParams {
    Decode(DecodeParams),
    ScanSweep(SweepParams),
    LiveSpectrum(SpectrumParams),
    AudioListen(AudioParams),
}

impl ModeParams {
    /// Default parameters for `mode`.
    pub fn default_for(mode: Mode) -> Self {
        match mode {
            Mode::Decode => ModeParams::Decode(DecodeParams::default()),
            Mode::ScanSweep => ModeParams::ScanSweep(SweepParams::default()),
            Mode::LiveSpectrum => ModeParams::LiveSpectrum(SpectrumParams::default()),
            Mode::AudioListen => ModeParams::AudioListen(AudioParams::default()),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            ModeParams::Decode(_) => Mode::Decode,
            ModeParams::ScanSweep(_) => Mode::ScanSweep,
            ModeParams::LiveSpectrum(_) => Mode::LiveSpectrum,
            ModeParams::AudioListen(_) => Mode::AudioListen,
        }
    }

    /// Validates and returns the normalized parameters.
    pub fn validated(&self) -> Result<Self, ControlError> {
        match self {
            ModeParams::Decode(p) => {
                check_freq("frequency", p.frequency)?;
                check_rate(p.sample_rate)?;
                check_gain(p.gain)?;
                Ok(self.clone())
            }
            ModeParams::ScanSweep(p) => {
                check_freq("start_freq", p.start_freq)?;
                check_freq("end_freq", p.end_freq)?;
                if p.end_freq <= p.start_freq {
                    return Err(ControlError::invalid("end_freq must be above start_freq"));
                }
                if p.bin_size == 0 {
                    return Err(ControlError::invalid("bin_size must be positive"));
                }
                if p.integration_secs == 0 {
                    return Err(ControlError::invalid("integration_secs must be positive"));
                }
                check_gain(p.gain)?;
                Ok(self.clone())
            }
            ModeParams::LiveSpectrum(p) => {
                check_freq("center_freq", p.center_freq)?;
                check_rate(p.sample_rate)?;
                check_gain(p.gain)?;
                Ok(ModeParams::LiveSpectrum(SpectrumParams {
                    fft_size: normalize_fft_size(p.fft_size),
                    averaging: p.averaging.clamp(1, AVG_MAX),
                    ..p.clone()
                }))
            }
            ModeParams::AudioListen(p) => {
                check_freq("frequency", p.frequency)?;
                check_rate(p.output_rate)?;
                check_gain(p.gain)?;
                Ok(self.clone())
            }
        }
    }

    /// Builds argv and parser recipe. Call on validated parameters.
    pub fn launch(&self, cfg: &Config) -> Launch {
        match self {
            ModeParams::Decode(p) => {
                let mut args: Vec<String> = match &cfg.decode_conf {
                    Some(conf) => vec!["-c".into(), conf.display().to_string()],
                    None => vec![
                        "-f".into(),
                        p.frequency.to_string(),
                        "-s".into(),
                        p.sample_rate.to_string(),
                        "-g".into(),
                        p.gain.to_string(),
                    ],
                };
                for proto in &p.protocols {
                    args.extend(["-R".into(), proto.to_string()]);
                }
                args.extend(["-F".into(), "json".into()]);
                Launch {
                    command: CommandSpec::new(&cfg.decode_bin, args),
                    parser: ParserSpec::Decode {
                        max_line_len: cfg.max_line_len_clamped(),
                    },
                }
            }
            ModeParams::ScanSweep(p) => Launch {
                command: CommandSpec::new(
                    &cfg.sweep_bin,
                    [
                        "-f".into(),
                        format!("{}:{}:{}", p.start_freq, p.end_freq, p.bin_size),
                        "-i".into(),
                        p.integration_secs.to_string(),
                        "-g".into(),
                        p.gain.to_string(),
                        "-1".into(),
                        "-".into(),
                    ],
                ),
                parser: ParserSpec::Sweep,
            },
            ModeParams::LiveSpectrum(p) => Launch {
                command: CommandSpec::new(
                    &cfg.spectrum_bin,
                    [
                        "-f".into(),
                        p.center_freq.to_string(),
                        "-s".into(),
                        p.sample_rate.to_string(),
                        "-g".into(),
                        p.gain.to_string(),
                        "-".into(),
                    ],
                ),
                parser: ParserSpec::Spectrum(SpectrumSettings {
                    center_freq_hz: p.center_freq,
                    sample_rate_hz: p.sample_rate,
                    fft_size: p.fft_size,
                    averaging: p.averaging,
                    max_points: cfg.spectrum_points,
                    interval: cfg.spectrum_interval,
                }),
            },
            ModeParams::AudioListen(p) => {
                let mut args: Vec<String> = vec![
                    "-f".into(),
                    p.frequency.to_string(),
                    "-M".into(),
                    p.modulation.as_arg().into(),
                    "-s".into(),
                    p.modulation.capture_rate().to_string(),
                    "-r".into(),
                    p.output_rate.to_string(),
                    "-g".into(),
                    p.gain.to_string(),
                ];
                if p.squelch > 0 {
                    args.extend(["-l".into(), p.squelch.to_string()]);
                }
                if p.ppm != 0 {
                    args.extend(["-p".into(), p.ppm.to_string()]);
                }
                args.push("-".into());
                Launch {
                    command: CommandSpec::new(&cfg.audio_bin, args),
                    parser: ParserSpec::Audio {
                        format: p.format(),
                        frame: cfg.audio_frame,
                    },
                }
            }
        }
    }
}

/// How a preset is tuned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tuning {
    /// One frequency, Hz.
    Single { frequency: u64 },
    /// A band scanned in steps, Hz.
    Band { start: u64, end: u64, step: u64 },
    /// A fixed channel list, Hz.
    Channels { frequencies: &'static [u64] },
}

/// A well-known listening target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Preset {
    pub name: &'static str,
    pub modulation: Modulation,
    pub tuning: Tuning,
}

const NOAA_WX: [u64; 7] = [
    162_400_000,
    162_425_000,
    162_450_000,
    162_475_000,
    162_500_000,
    162_525_000,
    162_550_000,
];

const PRESETS: [Preset; 13] = [
    Preset {
        name: "FM Broadcast Band",
        modulation: Modulation::Wbfm,
        tuning: Tuning::Band {
            start: 87_500_000,
            end: 108_000_000,
            step: 100_000,
        },
    },
    Preset {
        name: "Air Band",
        modulation: Modulation::Am,
        tuning: Tuning::Band {
            start: 118_000_000,
            end: 137_000_000,
            step: 25_000,
        },
    },
    Preset {
        name: "Weather Radio (US)",
        modulation: Modulation::Fm,
        tuning: Tuning::Channels {
            frequencies: &NOAA_WX,
        },
    },
    Preset {
        name: "Marine VHF",
        modulation: Modulation::Fm,
        tuning: Tuning::Band {
            start: 156_000_000,
            end: 162_000_000,
            step: 25_000,
        },
    },
    Preset {
        name: "2m Amateur",
        modulation: Modulation::Fm,
        tuning: Tuning::Band {
            start: 144_000_000,
            end: 148_000_000,
            step: 5_000,
        },
    },
    Preset {
        name: "70cm Amateur",
        modulation: Modulation::Fm,
        tuning: Tuning::Band {
            start: 420_000_000,
            end: 450_000_000,
            step: 25_000,
        },
    },
    Preset {
        name: "433 MHz ISM",
        modulation: Modulation::Am,
        tuning: Tuning::Single {
            frequency: 433_920_000,
        },
    },
    Preset {
        name: "315 MHz (US)",
        modulation: Modulation::Am,
        tuning: Tuning::Single {
            frequency: 315_000_000,
        },
    },
    Preset {
        name: "868 MHz (EU)",
        modulation: Modulation::Am,
        tuning: Tuning::Single {
            frequency: 868_000_000,
        },
    },
    Preset {
        name: "915 MHz (US)",
        modulation: Modulation::Am,
        tuning: Tuning::Single {
            frequency: 915_000_000,
        },
    },
    Preset {
        name: "FRS/GMRS Ch1",
        modulation: Modulation::Fm,
        tuning: Tuning::Single {
            frequency: 462_562_500,
        },
    },
    Preset {
        name: "FRS/GMRS Ch8",
        modulation: Modulation::Fm,
        tuning: Tuning::Single {
            frequency: 467_562_500,
        },
    },
    Preset {
        name: "PMR446 Ch1",
        modulation: Modulation::Fm,
        tuning: Tuning::Single {
            frequency: 446_006_250,
        },
    },
];

/// Common listening presets.
pub fn presets() -> &'static [Preset] {
    &PRESETS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(launch: &Launch) -> Vec<&str> {
        launch.command.args.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_parse_frequency_suffixes() {
        assert_eq!(parse_frequency("433.92M").unwrap(), 433_920_000);
        assert_eq!(parse_frequency("1.2g").unwrap(), 1_200_000_000);
        assert_eq!(parse_frequency("25k").unwrap(), 25_000);
        assert_eq!(parse_frequency("446.00625M").unwrap(), 446_006_250);
        assert_eq!(parse_frequency("100000").unwrap(), 100_000);
        assert!(parse_frequency("").is_err());
        assert!(parse_frequency("-5M").is_err());
        assert!(parse_frequency("M").is_err());
    }

    #[test]
    fn test_fft_size_normalization() {
        assert_eq!(normalize_fft_size(1000), 512);
        assert_eq!(normalize_fft_size(1024), 1024);
        assert_eq!(normalize_fft_size(10), 256);
        assert_eq!(normalize_fft_size(0), 256);
        assert_eq!(normalize_fft_size(100_000), 4096);
    }

    #[test]
    fn test_spectrum_params_are_normalized() {
        let p = ModeParams::LiveSpectrum(SpectrumParams {
            fft_size: 3000,
            averaging: 99,
            ..SpectrumParams::default()
        });
        let ModeParams::LiveSpectrum(v) = p.validated().unwrap() else {
            panic!("mode changed");
        };
        assert_eq!(v.fft_size, 2048);
        assert_eq!(v.averaging, 16);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let gain = ModeParams::Decode(DecodeParams {
            gain: 51,
            ..DecodeParams::default()
        });
        assert_eq!(gain.validated().unwrap_err().as_label(), "control_invalid_params");

        let span = ModeParams::ScanSweep(SweepParams {
            start_freq: 100_000_000,
            end_freq: 90_000_000,
            ..SweepParams::default()
        });
        assert!(span.validated().is_err());

        let freq = ModeParams::AudioListen(AudioParams {
            frequency: 0,
            ..AudioParams::default()
        });
        assert!(freq.validated().is_err());
    }

    #[test]
    fn test_decode_command_with_and_without_conf() {
        let params = ModeParams::Decode(DecodeParams {
            protocols: vec![40],
            ..DecodeParams::default()
        });
        let launch = params.launch(&Config::default());
        assert_eq!(launch.command.program, std::path::PathBuf::from("rtl_433"));
        assert_eq!(
            args(&launch),
            ["-f", "433920000", "-s", "1024000", "-g", "40", "-R", "40", "-F", "json"]
        );

        let cfg = Config {
            decode_conf: Some("/etc/rtl_433.conf".into()),
            ..Config::default()
        };
        let launch = params.launch(&cfg);
        assert_eq!(args(&launch), ["-c", "/etc/rtl_433.conf", "-R", "40", "-F", "json"]);
    }

    #[test]
    fn test_sweep_command_is_single_shot() {
        let launch = ModeParams::default_for(Mode::ScanSweep).launch(&Config::default());
        assert_eq!(
            args(&launch),
            ["-f", "88000000:108000000:10000", "-i", "1", "-g", "40", "-1", "-"]
        );
        assert_eq!(launch.mode(), Mode::ScanSweep);
    }

    #[test]
    fn test_audio_command_capture_rate_follows_modulation() {
        let params = ModeParams::AudioListen(AudioParams {
            modulation: Modulation::Am,
            squelch: 20,
            ppm: -3,
            ..AudioParams::default()
        });
        let launch = params.launch(&Config::default());
        assert_eq!(
            args(&launch),
            [
                "-f", "101500000", "-M", "am", "-s", "48000", "-r", "48000", "-g", "40", "-l",
                "20", "-p", "-3", "-"
            ]
        );
    }

    #[test]
    fn test_params_serde_tagged_by_mode() {
        let json = r#"{"mode":"live_spectrum","center_freq":100000000,"fft_size":512}"#;
        let params: ModeParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.mode(), Mode::LiveSpectrum);
        let ModeParams::LiveSpectrum(p) = params else {
            unreachable!()
        };
        assert_eq!(p.fft_size, 512);
        assert_eq!(p.averaging, 4);
    }

    #[test]
    fn test_presets_are_in_range() {
        for preset in presets() {
            match preset.tuning {
                Tuning::Single { frequency } => check_freq(preset.name, frequency).unwrap(),
                Tuning::Band { start, end, .. } => assert!(start < end),
                Tuning::Channels { frequencies } => assert!(!frequencies.is_empty()),
            }
        }
    }
}
