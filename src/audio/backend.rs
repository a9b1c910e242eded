use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the segment started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// RMS level of the frame in dBFS (0 = full scale, -160 = silence)
    pub fn level_db(&self) -> f32 {
        if self.samples.is_empty() {
            return SILENCE_DB;
        }

        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let x = s as f64 / i16::MAX as f64;
                x * x
            })
            .sum();
        let rms = (sum / self.samples.len() as f64).sqrt();

        if rms <= 0.0 {
            SILENCE_DB
        } else {
            (20.0 * rms.log10()).max(SILENCE_DB as f64) as f32
        }
    }
}

/// Floor reported by meters for digital silence
pub const SILENCE_DB: f32 = -160.0;

/// Errors reported by capture and playback devices
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("Failed to configure capture: {0}")]
    CaptureConfiguration(String),

    #[error("Failed to configure playback: {0}")]
    PlaybackConfiguration(String),

    #[error("Error encoding audio: {0}")]
    Encode(String),

    #[error("Error decoding audio for playback: {0}")]
    Decode(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

/// Asynchronous outcomes a device reports back to the session that owns it
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    EncodeFailed(String),
    DecodeFailed(String),
    PlaybackFinished,
}

/// Handle a device uses to report asynchronous outcomes
///
/// Sends are dropped silently once the owning session has ended.
#[derive(Debug, Clone)]
pub struct DeviceNotifier {
    tx: mpsc::UnboundedSender<DeviceEvent>,
}

impl DeviceNotifier {
    pub fn new(tx: mpsc::UnboundedSender<DeviceEvent>) -> Self {
        Self { tx }
    }

    pub fn encode_failed(&self, message: impl Into<String>) {
        let _ = self.tx.send(DeviceEvent::EncodeFailed(message.into()));
    }

    pub fn decode_failed(&self, message: impl Into<String>) {
        let _ = self.tx.send(DeviceEvent::DecodeFailed(message.into()));
    }

    /// Playback reached the end of the track on its own
    pub fn playback_finished(&self) {
        let _ = self.tx.send(DeviceEvent::PlaybackFinished);
    }
}

/// Audio capture device
///
/// Implementations:
/// - `ToneCapture`: synthetic test tone written to WAV in real time
/// - platform microphones live outside this crate
#[async_trait::async_trait]
pub trait CaptureDevice: Send {
    /// Prepare to record into `output_path` (replaces any previous target)
    async fn configure(&mut self, output_path: &Path) -> Result<(), DeviceError>;

    /// Start writing audio to the configured path
    async fn start(&mut self) -> Result<(), DeviceError>;

    /// Stop capturing and finalize the file
    async fn stop(&mut self) -> Result<(), DeviceError>;

    /// Delete whatever has been written to the configured path
    async fn discard_current_recording(&mut self) -> Result<(), DeviceError>;

    /// Check if device is currently capturing
    fn is_recording(&self) -> bool;

    /// Path the device is configured to write to
    fn current_path(&self) -> Option<&Path>;

    /// Average input power in dBFS since the last query
    fn average_power(&mut self) -> f32;

    /// Register where asynchronous failures are reported
    fn set_notifier(&mut self, _notifier: DeviceNotifier) {}

    /// Get device name for logging
    fn name(&self) -> &str;
}

/// Audio playback device
#[async_trait::async_trait]
pub trait PlaybackDevice: Send {
    /// Load `source_path`, replacing any loaded track; position resets to zero
    async fn configure(&mut self, source_path: &Path) -> Result<(), DeviceError>;

    async fn play(&mut self) -> Result<(), DeviceError>;

    async fn pause(&mut self);

    /// Stop playback and rewind
    async fn stop(&mut self);

    fn seek(&mut self, position: Duration);

    fn position(&self) -> Duration;

    fn is_playing(&self) -> bool;

    /// Whether a track has been loaded with `configure`
    fn is_loaded(&self) -> bool;

    /// Register where end-of-track and decode failures are reported
    fn set_notifier(&mut self, _notifier: DeviceNotifier) {}

    fn name(&self) -> &str;
}
