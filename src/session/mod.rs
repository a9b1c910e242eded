//! Recording session management
//!
//! This module provides the `RecordingSession` state machine that manages:
//! - Capture start/stop and segment paths across pause/resume cycles
//! - Merging finished segments into the session output
//! - Playback of the merged recording
//! - Recording/playback timers and amplitude metering
//! - Event delivery to subscribers

mod config;
mod session;
mod state;
mod stats;
mod timer;

pub use config::SessionConfig;
pub use session::RecordingSession;
pub use state::{amplitude_from_decibels, SessionEvent, State};
pub use stats::SessionSnapshot;
