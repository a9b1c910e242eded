use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::OutputFormat;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier, used in logs (e.g., "memo-<uuid>")
    pub session_id: String,

    /// Directory holding the session output and its transient segments
    pub recordings_dir: PathBuf,

    /// Encoding of merged output and extension of generated paths
    pub format: OutputFormat,

    /// Cadence of the recording and playback timers
    /// Default: 10ms
    pub tick_interval: Duration,

    /// Events buffered per subscriber before the slowest one starts lagging
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("memo-{}", uuid::Uuid::new_v4()),
            recordings_dir: std::env::temp_dir().join("voice-memo"),
            format: OutputFormat::Pcm16,
            tick_interval: Duration::from_millis(10),
            event_capacity: 1024,
        }
    }
}
