use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::state::State;

/// Point-in-time view of a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current state
    pub state: State,

    /// State before the last transition
    pub previous_state: State,

    /// Time spent recording since the last fresh start
    pub recording_elapsed: Duration,

    /// Time spent playing since playback last started from the beginning
    pub playback_elapsed: Duration,

    /// Merged session output, once configured
    pub output_path: Option<PathBuf>,

    /// File the capture device is writing (or last wrote)
    pub active_segment_path: Option<PathBuf>,

    /// Last amplitude sample emitted while recording
    pub latest_amplitude_sample: f32,

    /// Segments started since the session was configured
    pub segments_recorded: usize,

    /// Exports still running
    pub merges_in_flight: usize,
}
