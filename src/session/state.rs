use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Observable state of a recording session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum State {
    #[default]
    Empty,
    Recording,
    Paused,
    Playing,
    Error {
        message: String,
    },
}

impl State {
    pub fn error(message: impl Into<String>) -> Self {
        State::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, State::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            State::Empty => "empty",
            State::Recording => "recording",
            State::Paused => "paused",
            State::Playing => "playing",
            State::Error { .. } => "error",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Error { message } => write!(f, "error ({})", message),
            other => f.write_str(other.name()),
        }
    }
}

/// Side effect selected by a `(previous, target)` state pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    StartRecording,
    ResumeRecording,
    PauseRecording,
    /// Resume or start fresh, depending on the player position
    Play,
    PausePlaying,
    None,
}

impl Transition {
    pub(crate) fn between(from: &State, to: &State) -> Self {
        match (from, to) {
            (_, State::Empty) => Transition::None,
            (State::Empty, State::Recording) => Transition::StartRecording,
            (State::Paused, State::Recording) => Transition::ResumeRecording,
            (State::Recording, State::Paused) => Transition::PauseRecording,
            (State::Paused, State::Playing) => Transition::Play,
            (State::Playing, State::Paused) => Transition::PausePlaying,
            (_, State::Error { .. }) => Transition::None,
            _ => Transition::None,
        }
    }
}

/// Events delivered to subscribers, in the order the session produced them
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent after the transition's side effects have run
    StateChanged { state: State },

    /// Elapsed recording or playback time, whichever is active
    TimestampTick { elapsed: Duration },

    /// Input amplitude in [0, 1], recording only
    AmplitudeSample { sample: f32 },

    /// The player has been loaded with the latest recording
    PlaybackReady { path: PathBuf },
}

/// Map a meter reading in dBFS to the waveform sample the UI draws
pub fn amplitude_from_decibels(db: f32) -> f32 {
    (1.0 - 10f32.powf(db / 20.0)).clamp(0.0, 1.0)
}
