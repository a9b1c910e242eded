// Segment merger
//
// Joins two audio files end to end: everything in the destination first,
// then everything in the source. Validation (distinct paths, an audio track in
// each input) happens inside `merge` before it returns; decoding and writing
// run on tokio's blocking pool and resolve through `PendingMerge`.

use anyhow::{anyhow, Context as _};
use serde::Serialize;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::file::{AudioFile, AudioTrack};
use super::format::OutputFormat;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Source and destination are the same file")]
    PathsNotUnique,

    #[error("No audio track in destination {}: {reason}", .path.display())]
    DestinationTrack { path: PathBuf, reason: String },

    #[error("No audio track in merging track {}: {reason}", .path.display())]
    MergingTrack { path: PathBuf, reason: String },

    #[error("Could not start export: {0}")]
    ExportSessionCreation(String),

    #[error("Export failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("Export was cancelled")]
    Cancelled,
}

/// Lifecycle of an export once validation has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Exporting,
    Completed,
    Failed,
    Cancelled,
}

/// Requests cancellation of a running export
///
/// Cancellation is observed until the inputs are deleted; from then on the
/// export runs to completion.
#[derive(Debug, Clone, Default)]
pub struct ExportAbort {
    flag: Arc<AtomicBool>,
}

impl ExportAbort {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An export in progress; resolves exactly once with the final output path
#[derive(Debug)]
pub struct PendingMerge {
    handle: JoinHandle<Result<PathBuf, MergeError>>,
    status: watch::Receiver<MergeStatus>,
    abort: ExportAbort,
}

impl PendingMerge {
    pub fn status(&self) -> MergeStatus {
        *self.status.borrow()
    }

    pub fn abort_handle(&self) -> ExportAbort {
        self.abort.clone()
    }
}

impl Future for PendingMerge {
    type Output = Result<PathBuf, MergeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(MergeError::Cancelled),
            Err(e) => Err(MergeError::Failed(anyhow!("Export task panicked: {}", e))),
        })
    }
}

/// Stateless joiner of audio files
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentMerger;

impl SegmentMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge `source` onto the end of `destination`, overwriting the
    /// destination in place and deleting the source afterwards
    pub fn merge_into(
        &self,
        source: &Path,
        destination: &Path,
        format: OutputFormat,
    ) -> Result<PendingMerge, MergeError> {
        self.merge(source, destination, None, true, format)
    }

    /// Append `source` to `destination`
    ///
    /// Writes to `output_path` when given, otherwise replaces `destination`.
    /// With `delete_source` the source file is removed once both inputs are
    /// decoded. Errors returned directly are validation failures; export
    /// outcomes arrive through the returned future.
    pub fn merge(
        &self,
        source: &Path,
        destination: &Path,
        output_path: Option<&Path>,
        delete_source: bool,
        format: OutputFormat,
    ) -> Result<PendingMerge, MergeError> {
        if source == destination {
            return Err(MergeError::PathsNotUnique);
        }

        let destination_track =
            AudioTrack::probe(destination).map_err(|e| MergeError::DestinationTrack {
                path: destination.to_path_buf(),
                reason: format!("{:#}", e),
            })?;

        let source_track = AudioTrack::probe(source).map_err(|e| MergeError::MergingTrack {
            path: source.to_path_buf(),
            reason: format!("{:#}", e),
        })?;

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MergeError::ExportSessionCreation(e.to_string()))?;

        let job = ExportJob {
            destination: destination_track,
            source: source_track,
            output_path: output_path.map(Path::to_path_buf),
            delete_source,
            format,
        };

        info!(
            "Merging {} into {} ({})",
            source.display(),
            job.output().display(),
            format
        );

        let (status_tx, status_rx) = watch::channel(MergeStatus::Exporting);
        let abort = ExportAbort::default();
        let export_abort = abort.clone();

        let handle = runtime.spawn_blocking(move || {
            let result = job.run(&export_abort);
            let status = match &result {
                Ok(path) => {
                    info!("Merge complete: {}", path.display());
                    MergeStatus::Completed
                }
                Err(MergeError::Cancelled) => {
                    warn!("Merge cancelled");
                    MergeStatus::Cancelled
                }
                Err(e) => {
                    warn!("Merge failed: {}", e);
                    MergeStatus::Failed
                }
            };
            status_tx.send_replace(status);
            result
        });

        Ok(PendingMerge {
            handle,
            status: status_rx,
            abort,
        })
    }
}

/// Everything an export needs, moved onto the blocking pool
struct ExportJob {
    destination: AudioTrack,
    source: AudioTrack,
    output_path: Option<PathBuf>,
    delete_source: bool,
    format: OutputFormat,
}

impl ExportJob {
    fn output(&self) -> &Path {
        self.output_path
            .as_deref()
            .unwrap_or_else(|| self.destination.path())
    }

    fn run(self, abort: &ExportAbort) -> Result<PathBuf, MergeError> {
        let output = self.output().to_path_buf();
        let destination_path = self.destination.path().to_path_buf();
        let source_path = self.source.path().to_path_buf();
        let delete_source = self.delete_source;

        let head = self.destination.decode().map_err(MergeError::Failed)?;
        if abort.is_aborted() {
            return Err(cancelled(&source_path, delete_source));
        }

        let tail = self.source.decode().map_err(MergeError::Failed)?;
        if abort.is_aborted() {
            return Err(cancelled(&source_path, delete_source));
        }

        if head.sample_rate != tail.sample_rate || head.channels != tail.channels {
            return Err(MergeError::Failed(anyhow!(
                "Cannot join {}Hz/{}ch audio with {}Hz/{}ch audio",
                head.sample_rate,
                head.channels,
                tail.sample_rate,
                tail.channels
            )));
        }

        if self.output_path.is_none() {
            remove_existing(&destination_path);
        }
        if delete_source {
            remove_existing(&source_path);
        }

        write_joined(&output, self.format, &head, &tail).map_err(MergeError::Failed)?;

        debug!(
            "Wrote {} + {} frames to {}",
            head.frames(),
            tail.frames(),
            output.display()
        );

        Ok(output)
    }
}

fn write_joined(
    output: &Path,
    format: OutputFormat,
    head: &AudioFile,
    tail: &AudioFile,
) -> anyhow::Result<()> {
    let spec = format.wav_spec(head.sample_rate, head.channels);
    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("Failed to create WAV file: {}", output.display()))?;

    for &sample in head.samples.iter().chain(tail.samples.iter()) {
        let written = match format {
            OutputFormat::Pcm16 => writer.write_sample(to_i16(sample)),
            OutputFormat::Float32 => writer.write_sample(sample),
        };
        written.context("Failed to write sample to WAV")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// An aborted export leaves the destination alone but still gives up the
/// source it was asked to consume
fn cancelled(source: &Path, delete_source: bool) -> MergeError {
    if delete_source {
        remove_existing(source);
    }
    MergeError::Cancelled
}

fn remove_existing(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
