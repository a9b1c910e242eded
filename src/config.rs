use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{OutputFormat, ToneConfig};
use crate::session::SessionConfig;

/// Prefix for environment overrides, e.g. `VOICE_MEMO__RECORDER__FORMAT=float32`
const ENV_PREFIX: &str = "VOICE_MEMO";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub recorder: RecorderConfig,
    pub tone: ToneConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Where session outputs and segments are written; `~` is expanded
    pub recordings_path: String,
    pub format: OutputFormat,
    pub tick_interval_ms: u64,
    pub event_capacity: usize,
}

impl Config {
    /// Load defaults, then the optional file at `path` (extension inferred),
    /// then `VOICE_MEMO__` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let tone = ToneConfig::default();

        let settings = config::Config::builder()
            .set_default("recorder.recordings_path", "~/.voice-memo/recordings")?
            .set_default("recorder.format", OutputFormat::default().to_string())?
            .set_default("recorder.tick_interval_ms", 10)?
            .set_default("recorder.event_capacity", 1024)?
            .set_default("tone.sample_rate", tone.sample_rate)?
            .set_default("tone.channels", tone.channels as u32)?
            .set_default("tone.frequency_hz", tone.frequency_hz as f64)?
            .set_default("tone.amplitude", tone.amplitude as f64)?
            .set_default("tone.buffer_duration_ms", tone.buffer_duration_ms)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    pub fn recordings_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.recorder.recordings_path).into_owned())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            recordings_dir: self.recordings_dir(),
            format: self.recorder.format,
            tick_interval: Duration::from_millis(self.recorder.tick_interval_ms),
            event_capacity: self.recorder.event_capacity,
            ..SessionConfig::default()
        }
    }

    pub fn tone_config(&self) -> ToneConfig {
        self.tone.clone()
    }
}
