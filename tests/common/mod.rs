// Test doubles for the capture and playback devices
//
// Both record every call into shared state so tests can inspect them after
// the devices have been moved into a session.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use voice_memo::{CaptureDevice, DeviceError, DeviceNotifier, PlaybackDevice};

pub const SAMPLE_RATE: u32 = 8000;

/// Frames written per recorded segment (100ms)
pub const SEGMENT_FRAMES: usize = 800;

/// Write a mono 16-bit WAV holding `frames` copies of `value`
pub fn write_wav(path: &Path, sample_rate: u32, frames: usize, value: i16) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..frames {
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn read_wav(path: &Path) -> anyhow::Result<Vec<i16>> {
    let mut reader = hound::WavReader::open(path)?;
    Ok(reader.samples::<i16>().collect::<Result<_, _>>()?)
}

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
pub struct CaptureState {
    pub calls: Vec<String>,
    pub configured: Vec<PathBuf>,
    pub fail_configure: bool,
    pub recording: bool,
    pub segments_written: usize,
    pub power_db: f32,
    /// Frames and rate of the next segments written on stop
    pub segment_frames: usize,
    pub sample_rate: u32,
    pub notifier: Option<DeviceNotifier>,
}

/// Writes one segment per start/stop cycle (`SEGMENT_FRAMES` frames unless
/// overridden); the n-th segment is filled with the value `n * 1000`
pub struct MockCapture {
    shared: Arc<Mutex<CaptureState>>,
    path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct CaptureSpy(Arc<Mutex<CaptureState>>);

impl CaptureSpy {
    pub fn state(&self) -> MutexGuard<'_, CaptureState> {
        lock(&self.0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn encode_failed(&self, message: &str) {
        if let Some(notifier) = &self.state().notifier {
            notifier.encode_failed(message);
        }
    }
}

impl MockCapture {
    pub fn new() -> (Self, CaptureSpy) {
        let shared = Arc::new(Mutex::new(CaptureState {
            power_db: -20.0,
            segment_frames: SEGMENT_FRAMES,
            sample_rate: SAMPLE_RATE,
            ..CaptureState::default()
        }));
        (
            Self {
                shared: Arc::clone(&shared),
                path: None,
            },
            CaptureSpy(shared),
        )
    }

    fn state(&self) -> MutexGuard<'_, CaptureState> {
        lock(&self.shared)
    }
}

#[async_trait]
impl CaptureDevice for MockCapture {
    async fn configure(&mut self, output_path: &Path) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.push("configure".to_string());
        if state.fail_configure {
            return Err(DeviceError::CaptureConfiguration(
                "microphone unavailable".to_string(),
            ));
        }
        state.configured.push(output_path.to_path_buf());
        drop(state);

        self.path = Some(output_path.to_path_buf());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.push("start".to_string());
        state.recording = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.push("stop".to_string());
        if !state.recording {
            return Ok(());
        }
        state.recording = false;
        state.segments_written += 1;
        let value = (state.segments_written * 1000) as i16;
        let (frames, sample_rate) = (state.segment_frames, state.sample_rate);
        drop(state);

        let path = self
            .path
            .clone()
            .ok_or_else(|| DeviceError::Capture("not configured".to_string()))?;
        write_wav(&path, sample_rate, frames, value)
            .map_err(|e| DeviceError::Encode(e.to_string()))
    }

    async fn discard_current_recording(&mut self) -> Result<(), DeviceError> {
        self.state().calls.push("discard".to_string());
        if let Some(path) = &self.path {
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| DeviceError::Capture(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.state().recording
    }

    fn current_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn average_power(&mut self) -> f32 {
        self.state().power_db
    }

    fn set_notifier(&mut self, notifier: DeviceNotifier) {
        self.state().notifier = Some(notifier);
    }

    fn name(&self) -> &str {
        "mock-capture"
    }
}

#[derive(Debug, Default)]
pub struct PlaybackState {
    pub calls: Vec<String>,
    pub loaded: Option<PathBuf>,
    pub position: Duration,
    pub playing: bool,
    pub notifier: Option<DeviceNotifier>,
}

/// Player whose position only moves when a test sets it
pub struct MockPlayback {
    shared: Arc<Mutex<PlaybackState>>,
}

#[derive(Clone)]
pub struct PlaybackSpy(Arc<Mutex<PlaybackState>>);

impl PlaybackSpy {
    pub fn state(&self) -> MutexGuard<'_, PlaybackState> {
        lock(&self.0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn set_position(&self, position: Duration) {
        self.state().position = position;
    }

    /// Act as if the track played to its end
    pub fn finish(&self) {
        let mut state = self.state();
        state.playing = false;
        state.position = Duration::ZERO;
        if let Some(notifier) = &state.notifier {
            notifier.playback_finished();
        }
    }

    pub fn decode_failed(&self, message: &str) {
        if let Some(notifier) = &self.state().notifier {
            notifier.decode_failed(message);
        }
    }
}

impl MockPlayback {
    pub fn new() -> (Self, PlaybackSpy) {
        let shared = Arc::new(Mutex::new(PlaybackState::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            PlaybackSpy(shared),
        )
    }

    fn state(&self) -> MutexGuard<'_, PlaybackState> {
        lock(&self.shared)
    }
}

#[async_trait]
impl PlaybackDevice for MockPlayback {
    async fn configure(&mut self, source_path: &Path) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.push(format!("configure {}", source_path.display()));
        if !source_path.exists() {
            return Err(DeviceError::PlaybackConfiguration(format!(
                "No such file: {}",
                source_path.display()
            )));
        }
        state.loaded = Some(source_path.to_path_buf());
        state.position = Duration::ZERO;
        state.playing = false;
        Ok(())
    }

    async fn play(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.push("play".to_string());
        state.playing = true;
        Ok(())
    }

    async fn pause(&mut self) {
        let mut state = self.state();
        state.calls.push("pause".to_string());
        state.playing = false;
    }

    async fn stop(&mut self) {
        let mut state = self.state();
        state.calls.push("stop".to_string());
        state.playing = false;
        state.position = Duration::ZERO;
    }

    fn seek(&mut self, position: Duration) {
        self.state().position = position;
    }

    fn position(&self) -> Duration {
        self.state().position
    }

    fn is_playing(&self) -> bool {
        self.state().playing
    }

    fn is_loaded(&self) -> bool {
        self.state().loaded.is_some()
    }

    fn set_notifier(&mut self, notifier: DeviceNotifier) {
        self.state().notifier = Some(notifier);
    }

    fn name(&self) -> &str {
        "mock-playback"
    }
}
