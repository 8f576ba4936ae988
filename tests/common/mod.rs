//! Fake receiver tools for integration tests.
//!
//! Every tool is a `/bin/sh` script that ignores its arguments. All scripts are
//! written once, before any test spawns a process, so no script is ever
//! executed while a write handle to it may still be inherited by a fork.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use radiovisor::{Config, Subscription};

pub struct Tools {
    /// Prints one reading, then runs until stopped.
    pub decoder: PathBuf,
    /// Prints one reading, then exits with code 3.
    pub crashing: PathBuf,
    /// Ignores SIGTERM.
    pub stubborn: PathBuf,
    /// Prints two 100 ms frames of silence (48 kHz s16le mono), then idles.
    pub audio: PathBuf,
    /// Prints a two-hop sweep with one strong signal at 90.8 MHz, then exits.
    pub sweep: PathBuf,
    /// Scanner that fails.
    pub sweep_failing: PathBuf,
}

const DECODER: &str = r#"echo '{"model":"Acurite-Tower","id":1234,"temperature_C":21.5}'
exec sleep 30"#;

const CRASHING: &str = r#"echo '{"model":"Acurite-Tower","id":1234}'
sleep 0.2
exit 3"#;

const STUBBORN: &str = r#"trap '' TERM
echo '{"model":"Stubborn"}'
while true; do sleep 1; done"#;

const AUDIO: &str = r#"sleep 0.3
head -c 19200 /dev/zero
exec sleep 30"#;

const SWEEP: &str = r#"echo '2024-05-01, 12:00:00, 88000000, 90000000, 400000, 10, -60.0, -60.0, -60.0, -60.0, -60.0'
echo '2024-05-01, 12:00:01, 90000000, 92000000, 400000, 10, -60.0, -60.0, -20.0, -60.0, -60.0'
exit 0"#;

const SWEEP_FAILING: &str = r#"echo 'usb_claim_interface error -6' >&2
exit 1"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(format!("{name}.sh"));
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perm = fs::metadata(&path).unwrap().permissions();
    perm.set_mode(0o755);
    fs::set_permissions(&path, perm).unwrap();
    path
}

pub fn tools() -> &'static Tools {
    static TOOLS: OnceLock<Tools> = OnceLock::new();
    TOOLS.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("radiovisor-tools-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        Tools {
            decoder: write_script(&dir, "decoder", DECODER),
            crashing: write_script(&dir, "crashing", CRASHING),
            stubborn: write_script(&dir, "stubborn", STUBBORN),
            audio: write_script(&dir, "audio", AUDIO),
            sweep: write_script(&dir, "sweep", SWEEP),
            sweep_failing: write_script(&dir, "sweep_failing", SWEEP_FAILING),
        }
    })
}

/// Config wired to the fake tools, with short timings.
pub fn config() -> Config {
    let t = tools();
    Config {
        decode_bin: t.decoder.clone(),
        sweep_bin: t.sweep.clone(),
        spectrum_bin: t.decoder.clone(),
        audio_bin: t.audio.clone(),
        grace: Duration::from_millis(300),
        heartbeat: Duration::ZERO,
        ..Config::default()
    }
}

/// Receives the next event or fails after `secs`.
pub async fn next_event(sub: &mut Subscription, secs: u64) -> std::sync::Arc<radiovisor::DomainEvent> {
    tokio::time::timeout(Duration::from_secs(secs), sub.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("hub closed")
}
