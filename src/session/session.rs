use super::config::SessionConfig;
use super::state::{amplitude_from_decibels, SessionEvent, State, Transition};
use super::stats::SessionSnapshot;
use super::timer::TickTimer;
use crate::audio::{
    CaptureDevice, DeviceError, DeviceEvent, DeviceNotifier, ExportAbort, MergeError,
    PendingMerge, PlaybackDevice, SegmentMerger, SegmentPaths,
};
use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Commands buffered between handles and the session task
const COMMAND_BUFFER: usize = 32;

enum Command {
    Configure {
        reply: oneshot::Sender<Result<PathBuf>>,
    },
    ChangeState {
        target: State,
        reply: oneshot::Sender<State>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Deinitialize {
        reply: oneshot::Sender<()>,
    },
}

/// Result of an export, forwarded back onto the session task
struct MergeOutcome {
    id: u64,
    segment: PathBuf,
    result: Result<PathBuf, MergeError>,
}

/// Handle to a recording session
///
/// The session itself runs on a dedicated tokio task that owns all state;
/// handles only send it commands. Cloning a handle is cheap. When the last
/// handle is dropped the session tears itself down.
#[derive(Clone)]
pub struct RecordingSession {
    session_id: String,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl RecordingSession {
    /// Start a session task driving `capture` and `playback`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: SessionConfig,
        mut capture: Box<dyn CaptureDevice>,
        mut playback: Box<dyn PlaybackDevice>,
    ) -> Self {
        info!(
            "Creating recording session: {} (capture: {}, playback: {})",
            config.session_id,
            capture.name(),
            playback.name()
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (device_tx, device_rx) = mpsc::unbounded_channel();

        capture.set_notifier(DeviceNotifier::new(device_tx.clone()));
        playback.set_notifier(DeviceNotifier::new(device_tx));

        let session_id = config.session_id.clone();
        let span = info_span!("session", id = %session_id);
        let worker = SessionWorker::new(config, capture, playback, events.clone(), command_rx, device_rx);
        tokio::spawn(worker.run().instrument(span));

        Self {
            session_id,
            commands: command_tx,
            events,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Assign a fresh output path, point the capture device at it and reset
    /// the session to `Empty`
    ///
    /// Also the way back out of `Error`.
    pub async fn configure(&self) -> Result<PathBuf> {
        self.request(|reply| Command::Configure { reply }).await?
    }

    /// Request a transition to `target`
    ///
    /// Returns once the side effects have run and the state event has been
    /// emitted, with the resulting state (`Error` if a side effect failed).
    pub async fn change_state(&self, target: State) -> Result<State> {
        self.request(|reply| Command::ChangeState { target, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn state(&self) -> Result<State> {
        Ok(self.snapshot().await?.state)
    }

    /// Stop capture and playback, cancel timers and pending exports, and end
    /// the session task. Safe to call more than once.
    pub async fn deinitialize(&self) -> Result<()> {
        if self
            .request(|reply| Command::Deinitialize { reply })
            .await
            .is_err()
        {
            debug!("Session {} already torn down", self.session_id);
        }
        Ok(())
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| anyhow!("Recording session {} is no longer running", self.session_id))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("Recording session {} ended before replying", self.session_id))
    }
}

struct ActiveMerge {
    id: u64,
    abort: ExportAbort,
}

/// The single owner of all session state
struct SessionWorker {
    config: SessionConfig,
    capture: Box<dyn CaptureDevice>,
    playback: Box<dyn PlaybackDevice>,
    merger: SegmentMerger,
    paths: SegmentPaths,

    events: broadcast::Sender<SessionEvent>,
    commands: mpsc::Receiver<Command>,
    device_events: mpsc::UnboundedReceiver<DeviceEvent>,
    merge_tx: mpsc::UnboundedSender<MergeOutcome>,
    merge_rx: mpsc::UnboundedReceiver<MergeOutcome>,

    state: State,
    previous_state: State,
    recording_elapsed: Duration,
    playback_elapsed: Duration,
    output_path: Option<PathBuf>,
    active_segment_path: Option<PathBuf>,
    latest_amplitude_sample: f32,
    segments_recorded: usize,

    /// The one export writing the output; outcomes for any other id are stale
    active_merge: Option<ActiveMerge>,
    /// Finished segments waiting for the active export to land, oldest first
    queued_segments: VecDeque<PathBuf>,
    next_merge_id: u64,
    /// Fresh playback requested while an export was still writing the output
    playback_deferred: bool,

    recording_timer: TickTimer,
    playback_timer: TickTimer,
}

impl SessionWorker {
    fn new(
        config: SessionConfig,
        capture: Box<dyn CaptureDevice>,
        playback: Box<dyn PlaybackDevice>,
        events: broadcast::Sender<SessionEvent>,
        commands: mpsc::Receiver<Command>,
        device_events: mpsc::UnboundedReceiver<DeviceEvent>,
    ) -> Self {
        let (merge_tx, merge_rx) = mpsc::unbounded_channel();
        let paths = SegmentPaths::new(&config.recordings_dir, config.format);
        let tick = config.tick_interval;

        Self {
            config,
            capture,
            playback,
            merger: SegmentMerger::new(),
            paths,
            events,
            commands,
            device_events,
            merge_tx,
            merge_rx,
            state: State::Empty,
            previous_state: State::Empty,
            recording_elapsed: Duration::ZERO,
            playback_elapsed: Duration::ZERO,
            output_path: None,
            active_segment_path: None,
            latest_amplitude_sample: 0.0,
            segments_recorded: 0,
            active_merge: None,
            queued_segments: VecDeque::new(),
            next_merge_id: 0,
            playback_deferred: false,
            recording_timer: TickTimer::new(tick),
            playback_timer: TickTimer::new(tick),
        }
    }

    async fn run(mut self) {
        info!("Session task started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Deinitialize { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All session handles dropped");
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = self.device_events.recv() => self.handle_device_event(event).await,
                Some(outcome) = self.merge_rx.recv() => self.handle_merge_outcome(outcome).await,
                _ = self.recording_timer.tick() => self.on_recording_tick(),
                _ = self.playback_timer.tick() => self.on_playback_tick(),
            }
        }

        info!("Session task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Configure { reply } => {
                let result = self.configure().await;
                let _ = reply.send(result);
            }
            Command::ChangeState { target, reply } => {
                self.change_state(target).await;
                let _ = reply.send(self.state.clone());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Deinitialize { reply } => {
                // Handled by the run loop
                let _ = reply.send(());
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            previous_state: self.previous_state.clone(),
            recording_elapsed: self.recording_elapsed,
            playback_elapsed: self.playback_elapsed,
            output_path: self.output_path.clone(),
            active_segment_path: self.active_segment_path.clone(),
            latest_amplitude_sample: self.latest_amplitude_sample,
            segments_recorded: self.segments_recorded,
            merges_in_flight: self.merges_in_flight(),
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ---- configuration -------------------------------------------------

    async fn configure(&mut self) -> Result<PathBuf> {
        match self.prepare_output().await {
            Ok(output) => {
                self.set_recording_elapsed(Duration::ZERO);
                self.set_playback_elapsed(Duration::ZERO);
                self.change_state(State::Empty).await;
                info!("Session output: {}", output.display());
                Ok(output)
            }
            Err(e) => {
                self.change_state(State::error(format!("{:#}", e))).await;
                Err(e)
            }
        }
    }

    async fn prepare_output(&mut self) -> Result<PathBuf> {
        self.stop_devices().await;
        self.abandon_merges();

        self.paths.ensure_dir().with_context(|| {
            format!(
                "Failed to create recordings directory {}",
                self.paths.dir().display()
            )
        })?;

        let output = self.paths.next_path();
        self.capture.configure(&output).await?;

        self.output_path = Some(output.clone());
        self.active_segment_path = None;
        self.segments_recorded = 0;
        self.latest_amplitude_sample = 0.0;
        Ok(output)
    }

    // ---- state machine -------------------------------------------------

    async fn change_state(&mut self, target: State) {
        self.previous_state = std::mem::replace(&mut self.state, target);
        let transition = Transition::between(&self.previous_state, &self.state);

        if let Err(e) = self.apply(transition).await {
            let message = format!("{:#}", e);
            error!("{:?} failed: {}", transition, message);
            self.previous_state = std::mem::replace(&mut self.state, State::error(message));
        }

        info!("State: {} -> {}", self.previous_state, self.state);
        self.emit(SessionEvent::StateChanged {
            state: self.state.clone(),
        });
    }

    async fn apply(&mut self, transition: Transition) -> Result<()> {
        match transition {
            Transition::None => Ok(()),
            Transition::StartRecording => self.start_recording().await,
            Transition::ResumeRecording => self.resume_recording().await,
            Transition::PauseRecording => self.pause_recording().await,
            Transition::Play => {
                if self.playback.is_loaded() && self.playback.position() > Duration::ZERO {
                    self.resume_playing().await
                } else {
                    self.start_playing().await
                }
            }
            Transition::PausePlaying => {
                self.pause_playing().await;
                Ok(())
            }
        }
    }

    // ---- recording -----------------------------------------------------

    /// First segment of a configuration: written straight to the output path
    async fn start_recording(&mut self) -> Result<()> {
        let output = self.output_path()?;

        self.capture.configure(&output).await?;
        self.capture.discard_current_recording().await?;
        self.active_segment_path = Some(output);

        self.set_recording_elapsed(Duration::ZERO);
        self.start_recording_timer_and_capture().await
    }

    /// Every later segment gets its own freshly generated path
    async fn resume_recording(&mut self) -> Result<()> {
        let segment = self.paths.next_path();

        self.capture.configure(&segment).await?;
        self.active_segment_path = Some(segment);

        self.start_recording_timer_and_capture().await
    }

    async fn start_recording_timer_and_capture(&mut self) -> Result<()> {
        self.recording_timer.stop();
        self.capture.start().await?;
        self.recording_timer.start();
        self.segments_recorded += 1;

        if let Some(segment) = &self.active_segment_path {
            info!("Recording segment {}: {}", self.segments_recorded, segment.display());
        }
        Ok(())
    }

    async fn pause_recording(&mut self) -> Result<()> {
        self.recording_timer.stop();

        if !self.capture.is_recording() {
            return Ok(());
        }
        self.capture.stop().await?;

        let segment = self
            .active_segment_path
            .clone()
            .context("No active segment to merge")?;
        let output = self.output_path()?;

        // Exports rewrite the output in place, so they run one at a time
        self.queued_segments.push_back(segment);
        self.start_next_merge(&output).await
    }

    /// Start exporting the oldest queued segment unless one is already running
    async fn start_next_merge(&mut self, output: &Path) -> Result<()> {
        while self.active_merge.is_none() {
            let Some(segment) = self.queued_segments.pop_front() else {
                break;
            };

            match self.merger.merge_into(&segment, output, self.config.format) {
                Ok(pending) => self.track_merge(segment, pending),
                Err(MergeError::PathsNotUnique) => {
                    debug!("Segment is the session output, nothing to merge");
                    self.load_player(&segment).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn merges_in_flight(&self) -> usize {
        self.queued_segments.len() + usize::from(self.active_merge.is_some())
    }

    fn track_merge(&mut self, segment: PathBuf, pending: PendingMerge) {
        let id = self.next_merge_id;
        self.next_merge_id += 1;
        self.active_merge = Some(ActiveMerge {
            id,
            abort: pending.abort_handle(),
        });

        // Weak, so a finished session is not kept alive by its exports
        let merge_tx = self.merge_tx.downgrade();

        tokio::spawn(async move {
            let result = pending.await;

            match merge_tx.upgrade() {
                Some(tx) => {
                    let _ = tx.send(MergeOutcome {
                        id,
                        segment,
                        result,
                    });
                }
                None => debug!("Session gone, dropping merge outcome"),
            }
        });
    }

    async fn handle_merge_outcome(&mut self, outcome: MergeOutcome) {
        if self.active_merge.as_ref().map(|active| active.id) != Some(outcome.id) {
            debug!("Ignoring outcome of abandoned merge {}", outcome.id);
            return;
        }
        self.active_merge = None;

        let settled = match outcome.result {
            Ok(path) => self.load_player(&path).await,
            Err(MergeError::PathsNotUnique) => self.load_player(&outcome.segment).await,
            Err(e) => Err(e.into()),
        };
        let settled = match (settled, self.output_path()) {
            (Ok(()), Ok(output)) => self.start_next_merge(&output).await,
            (Ok(()), Err(e)) | (Err(e), _) => Err(e),
        };

        if let Err(e) = settled {
            self.abandon_merges();
            self.change_state(State::error(format!("{:#}", e))).await;
            return;
        }

        if self.playback_deferred && self.merges_in_flight() == 0 {
            self.playback_deferred = false;
            if self.state == State::Playing {
                if let Err(e) = self.start_playing_now().await {
                    self.change_state(State::error(format!("{:#}", e))).await;
                }
            }
        }
    }

    /// Cancel the running export and drop queued segments along with their files
    fn abandon_merges(&mut self) {
        if let Some(active) = self.active_merge.take() {
            debug!("Cancelling merge {}", active.id);
            active.abort.abort();
        }

        for segment in self.queued_segments.drain(..) {
            debug!("Discarding unmerged segment {}", segment.display());
            if let Err(e) = std::fs::remove_file(&segment) {
                warn!("Failed to remove {}: {}", segment.display(), e);
            }
        }
        self.playback_deferred = false;
    }

    // ---- playback ------------------------------------------------------

    async fn load_player(&mut self, path: &Path) -> Result<()> {
        self.playback.configure(path).await?;
        self.emit(SessionEvent::PlaybackReady {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn start_playing(&mut self) -> Result<()> {
        if self.merges_in_flight() > 0 {
            info!("Playback will start once pending merges complete");
            self.playback_deferred = true;
            return Ok(());
        }

        self.start_playing_now().await
    }

    async fn start_playing_now(&mut self) -> Result<()> {
        let output = self.output_path()?;

        self.playback.configure(&output).await?;
        self.set_playback_elapsed(Duration::ZERO);
        self.playback.seek(Duration::ZERO);
        self.playback.play().await?;
        self.playback_timer.start();

        info!("Playing {}", output.display());
        Ok(())
    }

    async fn resume_playing(&mut self) -> Result<()> {
        self.playback.play().await?;
        self.playback_timer.start();

        info!("Playback resumed at {:.2}s", self.playback.position().as_secs_f64());
        Ok(())
    }

    async fn pause_playing(&mut self) {
        self.playback_timer.stop();
        self.playback_deferred = false;

        if self.playback.is_playing() {
            self.playback.pause().await;
        }
    }

    // ---- timers --------------------------------------------------------

    fn on_recording_tick(&mut self) {
        if self.state != State::Recording {
            self.recording_timer.stop();
            return;
        }

        let elapsed = self.recording_elapsed + self.recording_timer.period();
        self.set_recording_elapsed(elapsed);

        let sample = amplitude_from_decibels(self.capture.average_power());
        self.latest_amplitude_sample = sample;
        self.emit(SessionEvent::AmplitudeSample { sample });
    }

    fn on_playback_tick(&mut self) {
        if self.state != State::Playing {
            self.playback_timer.stop();
            return;
        }

        let elapsed = self.playback_elapsed + self.playback_timer.period();
        self.set_playback_elapsed(elapsed);
    }

    fn set_recording_elapsed(&mut self, elapsed: Duration) {
        self.recording_elapsed = elapsed;
        self.emit(SessionEvent::TimestampTick { elapsed });
    }

    fn set_playback_elapsed(&mut self, elapsed: Duration) {
        self.playback_elapsed = elapsed;
        self.emit(SessionEvent::TimestampTick { elapsed });
    }

    // ---- device notifications ------------------------------------------

    async fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::EncodeFailed(message) => {
                self.fail_from_device(DeviceError::Encode(message)).await
            }
            DeviceEvent::DecodeFailed(message) => {
                self.fail_from_device(DeviceError::Decode(message)).await
            }
            DeviceEvent::PlaybackFinished => {
                if self.state == State::Playing {
                    self.change_state(State::Paused).await;
                } else {
                    debug!("Ignoring end of track in state {}", self.state);
                }
            }
        }
    }

    async fn fail_from_device(&mut self, err: DeviceError) {
        if self.state.is_error() {
            warn!("Already in error state, dropping: {}", err);
            return;
        }
        self.change_state(State::error(err.to_string())).await;
    }

    // ---- teardown ------------------------------------------------------

    async fn stop_devices(&mut self) {
        self.recording_timer.stop();
        if self.capture.is_recording() {
            if let Err(e) = self.capture.stop().await {
                warn!("Failed to stop capture: {}", e);
            }
        }

        self.playback_timer.stop();
        self.playback.stop().await;
    }

    async fn teardown(&mut self) {
        info!("Tearing down recording session: {}", self.config.session_id);
        self.recording_timer.stop();
        self.playback_timer.stop();

        if let Err(e) = self.capture.stop().await {
            warn!("Failed to stop capture: {}", e);
        }
        self.playback.stop().await;
        self.abandon_merges();
    }

    fn output_path(&self) -> Result<PathBuf> {
        self.output_path
            .clone()
            .context("Session output is not configured")
    }
}
