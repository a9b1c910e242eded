pub mod backend;
pub mod file;
pub mod format;
pub mod merger;
pub mod paths;
pub mod player;
pub mod tone;

pub use backend::{
    AudioFrame, CaptureDevice, DeviceError, DeviceEvent, DeviceNotifier, PlaybackDevice,
    SILENCE_DB,
};
pub use file::{AudioFile, AudioTrack};
pub use format::OutputFormat;
pub use merger::{ExportAbort, MergeError, MergeStatus, PendingMerge, SegmentMerger};
pub use paths::SegmentPaths;
pub use player::SilentPlayer;
pub use tone::{SegmentSummary, SegmentWriter, ToneCapture, ToneConfig};
