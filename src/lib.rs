pub mod audio;
pub mod config;
pub mod session;

pub use audio::{
    AudioFile, AudioFrame, AudioTrack, CaptureDevice, DeviceError, DeviceEvent, DeviceNotifier,
    MergeError, MergeStatus, OutputFormat, PendingMerge, PlaybackDevice, SegmentMerger,
    SegmentPaths, SilentPlayer, ToneCapture, ToneConfig,
};
pub use config::Config;
pub use session::{RecordingSession, SessionConfig, SessionEvent, SessionSnapshot, State};
