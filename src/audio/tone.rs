// Synthetic capture device
//
// Generates a test tone in fixed-size frames on a tokio interval and writes
// them to the configured WAV path as they are produced, metering the level of
// each frame. Used by the demo binary and tests in place of a microphone.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureDevice, DeviceError, DeviceNotifier, SILENCE_DB};

/// Test tone configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (the tone is duplicated across them)
    pub channels: u16,

    /// Tone pitch
    pub frequency_hz: f32,

    /// Peak amplitude, 0.0 to 1.0
    pub amplitude: f32,

    /// Frame size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            frequency_hz: 440.0,
            amplitude: 0.5,
            buffer_duration_ms: 100,
        }
    }
}

/// What a finished segment contains
#[derive(Debug, Clone)]
pub struct SegmentSummary {
    pub file_path: PathBuf,
    pub end_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: usize,
}

/// Writes a single segment to disk as WAV file
pub struct SegmentWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    summary: SegmentSummary,
}

impl SegmentWriter {
    pub fn create(file_path: PathBuf, sample_rate: u32, channels: u16) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        Ok(Self {
            writer: Some(writer),
            summary: SegmentSummary {
                file_path,
                end_ms: 0,
                sample_rate,
                channels,
                sample_count: 0,
            },
        })
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }

            self.summary.end_ms = frame.timestamp_ms;
            self.summary.sample_count += frame.samples.len();
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<SegmentSummary> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }

        Ok(self.summary.clone())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

/// Produces consecutive tone frames with a slow speech-like envelope
struct ToneGenerator {
    config: ToneConfig,
    frame_index: u64,
}

impl ToneGenerator {
    fn new(config: ToneConfig) -> Self {
        Self {
            config,
            frame_index: 0,
        }
    }

    fn frames_per_buffer(&self) -> usize {
        (self.config.sample_rate as u64 * self.config.buffer_duration_ms / 1000) as usize
    }

    fn next_frame(&mut self) -> AudioFrame {
        let rate = self.config.sample_rate as f32;
        let count = self.frames_per_buffer();
        let channels = self.config.channels.max(1) as usize;
        let start = self.frame_index * count as u64;

        let mut samples = Vec::with_capacity(count * channels);
        for n in 0..count as u64 {
            let t = (start + n) as f32 / rate;
            let envelope = 0.5 + 0.5 * (2.0 * PI * 2.0 * t).sin();
            let value = self.config.amplitude * envelope * (2.0 * PI * self.config.frequency_hz * t).sin();
            let sample = (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            samples.extend(std::iter::repeat(sample).take(channels));
        }

        let frame = AudioFrame {
            samples,
            sample_rate: self.config.sample_rate,
            channels: channels as u16,
            timestamp_ms: self.frame_index * self.config.buffer_duration_ms,
        };
        self.frame_index += 1;
        frame
    }
}

struct ActiveCapture {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<Result<SegmentSummary>>,
}

/// Capture device that records a generated tone
pub struct ToneCapture {
    config: ToneConfig,
    path: Option<PathBuf>,
    level_bits: Arc<AtomicU32>,
    active: Option<ActiveCapture>,
    notifier: Option<DeviceNotifier>,
}

impl ToneCapture {
    pub fn new(config: ToneConfig) -> Self {
        info!(
            "Tone capture initialized ({}Hz, {} channels, {}Hz tone)",
            config.sample_rate, config.channels, config.frequency_hz
        );

        Self {
            config,
            path: None,
            level_bits: Arc::new(AtomicU32::new(SILENCE_DB.to_bits())),
            active: None,
            notifier: None,
        }
    }

    async fn finish_active(&mut self) -> Result<Option<SegmentSummary>, DeviceError> {
        let Some(active) = self.active.take() else {
            return Ok(None);
        };

        let _ = active.stop_tx.send(());
        self.level_bits.store(SILENCE_DB.to_bits(), Ordering::Relaxed);

        match active.task.await {
            Ok(Ok(summary)) => Ok(Some(summary)),
            Ok(Err(e)) => Err(DeviceError::Encode(format!("{:#}", e))),
            Err(e) => Err(DeviceError::Capture(format!("Capture task failed: {}", e))),
        }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for ToneCapture {
    async fn configure(&mut self, output_path: &Path) -> Result<(), DeviceError> {
        if self.active.is_some() {
            warn!("Reconfiguring tone capture while active, finishing current segment");
            if let Err(e) = self.finish_active().await {
                warn!("Previous segment did not finish cleanly: {}", e);
            }
        }

        let parent = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !parent.is_dir() {
            return Err(DeviceError::CaptureConfiguration(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }

        debug!("Tone capture configured at {}", output_path.display());
        self.path = Some(output_path.to_path_buf());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), DeviceError> {
        if self.is_recording() {
            return Ok(());
        }
        // A task that ended on its own (encode failure) is reaped here
        if let Some(active) = self.active.take() {
            active.task.abort();
        }

        let path = self.path.clone().ok_or_else(|| {
            DeviceError::CaptureConfiguration("No output path configured".to_string())
        })?;

        let mut writer =
            SegmentWriter::create(path.clone(), self.config.sample_rate, self.config.channels)
                .map_err(|e| DeviceError::CaptureConfiguration(format!("{:#}", e)))?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let mut generator = ToneGenerator::new(self.config.clone());
        let level_bits = Arc::clone(&self.level_bits);
        let notifier = self.notifier.clone();
        let period = Duration::from_millis(self.config.buffer_duration_ms.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let frame = generator.next_frame();
                        level_bits.store(frame.level_db().to_bits(), Ordering::Relaxed);

                        if let Err(e) = writer.write_frame(&frame) {
                            if let Some(notifier) = &notifier {
                                notifier.encode_failed(format!("{:#}", e));
                            }
                            return Err(e);
                        }
                    }
                }
            }

            writer.finish()
        });

        info!("Tone capture started: {}", path.display());
        self.active = Some(ActiveCapture { stop_tx, task });
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(summary) = self.finish_active().await? {
            info!(
                "Tone capture stopped: {} ({} samples, {:.1}s)",
                summary.file_path.display(),
                summary.sample_count,
                summary.sample_count as f64
                    / (summary.sample_rate as f64 * summary.channels.max(1) as f64)
            );
        }
        Ok(())
    }

    async fn discard_current_recording(&mut self) -> Result<(), DeviceError> {
        if let Err(e) = self.finish_active().await {
            warn!("Discarding a segment that did not finish cleanly: {}", e);
        }

        if let Some(path) = &self.path {
            if path.exists() {
                fs::remove_file(path).map_err(|e| {
                    DeviceError::Capture(format!("Failed to delete {}: {}", path.display(), e))
                })?;
                debug!("Discarded recording at {}", path.display());
            }
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| !active.task.is_finished())
            .unwrap_or(false)
    }

    fn current_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn average_power(&mut self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    fn set_notifier(&mut self, notifier: DeviceNotifier) {
        self.notifier = Some(notifier);
    }

    fn name(&self) -> &str {
        "tone"
    }
}
