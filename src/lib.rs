//! # radiovisor
//!
//! **Radiovisor** shares one RTL-SDR receiver between mutually exclusive
//! analysis modes, each realized by an external tool:
//!
//! | Mode                    | Tool        | Output                  | Events             |
//! |-------------------------|-------------|-------------------------|--------------------|
//! | [`Mode::Decode`]        | `rtl_433`   | JSON lines              | `Reading`          |
//! | [`Mode::ScanSweep`]     | `rtl_power` | CSV, one batch          | `SpectrumRow`      |
//! | [`Mode::LiveSpectrum`]  | `rtl_sdr`   | raw u8 I/Q samples      | `SpectrumFrame`    |
//! | [`Mode::AudioListen`]   | `rtl_fm`    | raw s16le PCM           | `AudioChunk`       |
//!
//! The crate arbitrates ownership of the receiver, supervises the tool's
//! process, parses its output and fans typed events out to any number of
//! consumers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   start_mode / stop_mode / retune_audio / run_sweep
//!                 │
//!                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  RadioControl (control lock: one mode change at a time)          │
//! │    ├─ DevicePresence::check()                                    │
//! │    ├─ DeviceArbiter   Free ──acquire──► Held(mode) ──release──►  │
//! │    └─ ProcessSupervisor   slot per mode: zero or one process     │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                ▼
//!                  ┌───────────────────────────┐
//!                  │  ProcessActor (per mode)  │  crash → force-release lease
//!                  │   ProcessHandle (tool)    │        → StatusChange{false}
//!                  │   stdout ──► Parser       │        → optional restart
//!                  └─────────────┬─────────────┘
//!                                │ publish(DomainEvent)
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  FanoutHub: bounded drop-oldest queue per subscriber             │
//! └──────┬────────────────────┬───────────────────────┬──────────────┘
//!        ▼                    ▼                       ▼
//!   SinkSet workers      events() streams        audio_stream()
//!   (HistorySink,        (+ heartbeats)          (PCM frames)
//!    LogWriter, ...)
//! ```
//!
//! ### Mode change
//! ```text
//! start_mode(params)
//!   ├─► validate params
//!   ├─► arbiter.acquire(mode)      Busy{current} if another mode holds the receiver
//!   ├─► supervisor.start(mode)     Spawn error → lease released
//!   └─► StatusChange{mode, running: true}
//!
//! stop_mode(mode)
//!   ├─► SIGTERM ─► grace ─► SIGKILL ─► reap
//!   ├─► StatusChange{mode, running: false}
//!   └─► arbiter.release(lease)
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                        |
//! |-------------------|-----------------------------------------------------------|-------------------------------------------|
//! | **Control**       | Start/stop/retune modes, status, sweeps.                  | [`RadioControl`], [`ModeParams`]          |
//! | **Arbitration**   | Exclusive lease over the receiver.                        | [`DeviceArbiter`], [`LeaseToken`]         |
//! | **Supervision**   | Per-mode process lifecycle with stop escalation.          | [`ProcessSupervisor`], [`ProcessHandle`]  |
//! | **Events**        | Typed events, fan-out, live streams with heartbeats.      | [`DomainEvent`], [`FanoutHub`]            |
//! | **Sinks**         | In-process consumers (history store, logging).            | [`Sink`], [`HistorySink`]                 |
//! | **Policies**      | Optional restart after crashes.                           | [`RetryPolicy`], [`BackoffPolicy`]        |
//! | **Errors**        | Typed errors with stable labels.                          | [`ControlError`], [`ArbiterError`]        |
//! | **Configuration** | Tool paths, grace period, queue sizes.                    | [`Config`]                                |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] sink printing events through `tracing`.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use radiovisor::{Config, MemoryStore, ModeParams, Mode, RadioControl};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let control = RadioControl::builder(Config::from_env())
//!         .with_store(store.clone())
//!         .build();
//!
//!     control.start_mode(ModeParams::default_for(Mode::Decode)).await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     control.stop_mode(Mode::Decode).await?;
//!
//!     println!("{} readings", store.len());
//!     control.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod audio;
mod config;
mod core;
mod error;
mod events;
mod mode;
mod params;
mod parsers;
mod policies;
mod services;
mod sinks;

// ---- Public re-exports ----

pub use audio::{AudioFormat, AudioFramer};
pub use config::Config;
pub use core::{
    ActorState, CommandSpec, ControlStatus, DeviceArbiter, HOP_BANDWIDTH_HZ, LeaseSnapshot,
    LeaseToken, ModeStatus, ProcessHandle, ProcessStatus, ProcessSupervisor, RadioControl,
    RadioControlBuilder, StopOutcome, SweepJob, SweepProgress, expected_duration,
    wait_for_shutdown_signal,
};
pub use error::{ArbiterError, ControlError, SupervisorError};
pub use events::{
    AudioChunk, Category, DomainEvent, EventFilter, FanoutHub, HubStats, Reading, SpectrumFrame,
    SpectrumRow, StatusChange, StreamItem, Subscription, live_stream,
};
pub use mode::{Mode, Modulation};
pub use params::{
    AudioParams, DecodeParams, Launch, MAX_FREQ_HZ, MAX_GAIN_DB, MIN_FREQ_HZ, ModeParams, Preset,
    SpectrumParams, SweepParams, Tuning, normalize_fft_size, parse_frequency, presets,
};
pub use parsers::{
    AudioParser, DecodeParser, ParseCounters, ParseStats, Parser, ParserSpec, Peak, PeakConfig,
    SpectrumParser, SpectrumSettings, SweepParser, SweepResult, find_peaks, parse_reading,
    parse_sweep,
};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use services::{AssumePresent, DevicePresence, MemoryStore, ReadingStore, ServiceError};
pub use sinks::{HistorySink, Sink, SinkSet};

// Optional: a simple built-in logger sink (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use sinks::LogWriter;
