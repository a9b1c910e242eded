use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Track};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info};

/// A decoded audio file: interleaved f32 samples plus format metadata
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    /// Probe and decode the first audio track of `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let track = AudioTrack::probe(path)?;
        let audio = track.decode()?;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            audio.duration_seconds,
            audio.sample_rate,
            audio.channels,
            audio.samples.len()
        );

        Ok(audio)
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds)
    }
}

/// An opened container whose audio track has been located but not decoded
///
/// Probing only reads the container header, so it is cheap enough to run
/// before any asynchronous work starts.
pub struct AudioTrack {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    track: Track,
}

impl AudioTrack {
    /// Open `path` and find its first decodable audio track
    pub fn probe(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let file = File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .with_context(|| format!("Failed to probe format: {}", path.display()))?;

        let reader = probed.format;
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .cloned()
            .ok_or_else(|| anyhow!("No audio tracks found in {}", path.display()))?;

        debug!(
            "Probed {}: track {} ({:?}Hz)",
            path.display(),
            track.id,
            track.codec_params.sample_rate
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            track,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.track.codec_params.sample_rate
    }

    pub fn channels(&self) -> Option<u16> {
        self.track.codec_params.channels.map(|c| c.count() as u16)
    }

    /// Decode the whole track into memory
    pub fn decode(self) -> Result<AudioFile> {
        let Self {
            path,
            mut reader,
            track,
        } = self;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Failed to create decoder")?;

        let mut sample_rate = track.codec_params.sample_rate;
        let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Error reading packet from {}", path.display()))
                }
            };

            if packet.track_id() != track.id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!("Skipping undecodable packet in {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => return Err(e).context("Decode error"),
            };

            let spec = *decoded.spec();
            sample_rate.get_or_insert(spec.rate);
            channels.get_or_insert(spec.channels.count() as u16);

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        let sample_rate = sample_rate
            .ok_or_else(|| anyhow!("Unknown sample rate for {}", path.display()))?;
        let channels =
            channels.ok_or_else(|| anyhow!("Unknown channel count for {}", path.display()))?;

        let duration_seconds = if sample_rate == 0 || channels == 0 {
            0.0
        } else {
            samples.len() as f64 / (sample_rate as f64 * channels as f64)
        };

        Ok(AudioFile {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        })
    }
}
