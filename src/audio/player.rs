// Silent transport player
//
// Loads a file to learn its duration and then runs a transport clock over it:
// play, pause, seek and natural end of track behave like a real player, but no
// output device is opened.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::backend::{DeviceError, DeviceNotifier, PlaybackDevice};
use super::file::AudioFile;

#[derive(Debug, Default)]
struct Transport {
    loaded: Option<PathBuf>,
    duration: Duration,
    offset: Duration,
    started_at: Option<Instant>,
    /// Bumped on every transport change so a stale end-of-track timer is ignored
    generation: u64,
}

impl Transport {
    fn position(&self) -> Duration {
        let position = match self.started_at {
            Some(started_at) => self.offset + started_at.elapsed(),
            None => self.offset,
        };
        position.min(self.duration)
    }

    fn halt(&mut self, offset: Duration) {
        self.offset = offset.min(self.duration);
        self.started_at = None;
        self.generation += 1;
    }
}

pub struct SilentPlayer {
    transport: Arc<Mutex<Transport>>,
    finish_task: Option<JoinHandle<()>>,
    notifier: Option<DeviceNotifier>,
}

impl SilentPlayer {
    pub fn new() -> Self {
        Self {
            transport: Arc::new(Mutex::new(Transport::default())),
            finish_task: None,
            notifier: None,
        }
    }

    /// Duration of the loaded track
    pub fn duration(&self) -> Duration {
        self.lock().duration
    }

    fn lock(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_finish(&mut self) {
        if let Some(task) = self.finish_task.take() {
            task.abort();
        }
    }

    /// Start the transport clock and arm the end-of-track timer
    fn run_from_offset(&mut self) {
        self.cancel_finish();

        let (remaining, generation) = {
            let mut transport = self.lock();
            transport.generation += 1;
            transport.started_at = Some(Instant::now());
            (transport.duration.saturating_sub(transport.offset), transport.generation)
        };

        let transport = Arc::clone(&self.transport);
        let notifier = self.notifier.clone();

        self.finish_task = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;

            {
                let mut transport = transport.lock().unwrap_or_else(|e| e.into_inner());
                if transport.generation != generation {
                    return;
                }
                transport.halt(Duration::ZERO);
            }

            debug!("Playback reached end of track");
            if let Some(notifier) = notifier {
                notifier.playback_finished();
            }
        }));
    }
}

impl Default for SilentPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PlaybackDevice for SilentPlayer {
    async fn configure(&mut self, source_path: &Path) -> Result<(), DeviceError> {
        self.cancel_finish();

        let path = source_path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| DeviceError::PlaybackConfiguration(e.to_string()))?
            .map_err(|e| DeviceError::PlaybackConfiguration(format!("{:#}", e)))?;

        let duration = audio.duration();
        {
            let mut transport = self.lock();
            transport.loaded = Some(source_path.to_path_buf());
            transport.duration = duration;
            transport.halt(Duration::ZERO);
        }

        info!(
            "Player loaded {} ({:.2}s)",
            source_path.display(),
            duration.as_secs_f64()
        );
        Ok(())
    }

    async fn play(&mut self) -> Result<(), DeviceError> {
        {
            let transport = self.lock();
            if transport.loaded.is_none() {
                return Err(DeviceError::Playback("No track loaded".to_string()));
            }
            if transport.started_at.is_some() {
                return Ok(());
            }
        }

        self.run_from_offset();
        Ok(())
    }

    async fn pause(&mut self) {
        self.cancel_finish();
        let mut transport = self.lock();
        let position = transport.position();
        transport.halt(position);
    }

    async fn stop(&mut self) {
        self.cancel_finish();
        self.lock().halt(Duration::ZERO);
    }

    fn seek(&mut self, position: Duration) {
        let playing = {
            let mut transport = self.lock();
            let playing = transport.started_at.is_some();
            transport.halt(position);
            playing
        };

        if playing {
            self.run_from_offset();
        } else {
            self.cancel_finish();
        }
    }

    fn position(&self) -> Duration {
        self.lock().position()
    }

    fn is_playing(&self) -> bool {
        self.lock().started_at.is_some()
    }

    fn is_loaded(&self) -> bool {
        self.lock().loaded.is_some()
    }

    fn set_notifier(&mut self, notifier: DeviceNotifier) {
        self.notifier = Some(notifier);
    }

    fn name(&self) -> &str {
        "silent"
    }
}

impl Drop for SilentPlayer {
    fn drop(&mut self) {
        self.cancel_finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::DeviceEvent;
    use tokio::sync::mpsc;

    fn loaded_player(duration: Duration) -> SilentPlayer {
        let player = SilentPlayer::new();
        {
            let mut transport = player.lock();
            transport.loaded = Some(PathBuf::from("memo.wav"));
            transport.duration = duration;
        }
        player
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_advances_while_playing() {
        let mut player = loaded_player(Duration::from_secs(10));
        player.play().await.unwrap();
        assert!(player.is_playing());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(player.position(), Duration::from_secs(3));

        player.pause().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!player.is_playing());
        assert_eq!(player.position(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_track_notifies_and_rewinds() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = loaded_player(Duration::from_secs(2));
        player.set_notifier(DeviceNotifier::new(tx));

        player.play().await.unwrap();
        let event = rx.recv().await.unwrap();

        assert_eq!(event, DeviceEvent::PlaybackFinished);
        assert!(!player.is_playing());
        assert_eq!(player.position(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_disarms_end_of_track() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut player = loaded_player(Duration::from_secs(2));
        player.set_notifier(DeviceNotifier::new(tx));

        player.play().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        player.pause().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_play_without_track_fails() {
        let mut player = SilentPlayer::new();
        assert!(player.play().await.is_err());
        assert!(!player.is_loaded());
    }

    #[tokio::test]
    async fn test_configure_missing_file_fails() {
        let mut player = SilentPlayer::new();
        let err = player
            .configure(Path::new("/nonexistent/memo.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::PlaybackConfiguration(_)));
    }
}
