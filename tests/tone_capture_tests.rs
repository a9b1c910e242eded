// Integration tests for the synthetic devices
//
// ToneCapture writes real WAV segments on a tokio interval and SilentPlayer
// runs a transport clock over decoded files, so together they drive a full
// session without audio hardware.

use anyhow::Result;
use std::time::Duration;
use tempfile::TempDir;
use voice_memo::audio::{
    AudioFile, CaptureDevice, OutputFormat, SegmentMerger, SilentPlayer, ToneCapture, ToneConfig,
    SILENCE_DB,
};
use voice_memo::{RecordingSession, SessionConfig, State};

fn tone_config() -> ToneConfig {
    ToneConfig {
        sample_rate: 16000,
        channels: 1,
        buffer_duration_ms: 20,
        ..ToneConfig::default()
    }
}

#[tokio::test]
async fn test_tone_capture_writes_segment() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("segment.wav");

    let mut capture = ToneCapture::new(tone_config());
    capture.configure(&path).await?;
    assert_eq!(capture.current_path(), Some(path.as_path()));
    assert_eq!(capture.average_power(), SILENCE_DB);

    capture.start().await?;
    assert!(capture.is_recording());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(capture.average_power() > SILENCE_DB);

    capture.stop().await?;
    assert!(!capture.is_recording());
    assert_eq!(capture.average_power(), SILENCE_DB);

    let audio = AudioFile::open(&path)?;
    assert_eq!(audio.sample_rate, 16000);
    // Whole 20ms frames only
    assert!(audio.frames() >= 320);
    assert_eq!(audio.frames() % 320, 0);

    Ok(())
}

#[tokio::test]
async fn test_discard_removes_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("segment.wav");

    let mut capture = ToneCapture::new(tone_config());
    capture.configure(&path).await?;
    capture.start().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    capture.discard_current_recording().await?;
    assert!(!capture.is_recording());
    assert!(!path.exists());

    // Nothing to discard is fine
    capture.discard_current_recording().await?;
    Ok(())
}

#[tokio::test]
async fn test_tone_segments_merge() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let first = temp_dir.path().join("first.wav");
    let second = temp_dir.path().join("second.wav");

    let mut capture = ToneCapture::new(tone_config());
    for path in [&first, &second] {
        capture.configure(path).await?;
        capture.start().await?;
        tokio::time::sleep(Duration::from_millis(60)).await;
        capture.stop().await?;
    }

    let first_frames = AudioFile::open(&first)?.frames();
    let second_frames = AudioFile::open(&second)?.frames();

    let merged = SegmentMerger::new()
        .merge_into(&second, &first, OutputFormat::Pcm16)?
        .await?;
    assert_eq!(AudioFile::open(&merged)?.frames(), first_frames + second_frames);
    assert!(!second.exists());

    Ok(())
}

#[tokio::test]
async fn test_session_with_synthetic_devices() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig {
        recordings_dir: temp_dir.path().join("memos"),
        ..SessionConfig::default()
    };

    let session = RecordingSession::spawn(
        config,
        Box::new(ToneCapture::new(tone_config())),
        Box::new(SilentPlayer::new()),
    );

    let output = session.configure().await?;
    for _ in 0..2 {
        assert_eq!(session.change_state(State::Recording).await?, State::Recording);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.change_state(State::Paused).await?, State::Paused);
    }
    while session.snapshot().await?.merges_in_flight > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let merged = AudioFile::open(&output)?;
    assert!(merged.duration() >= Duration::from_millis(120));

    // The silent player reaches the end of the track and pauses the session
    assert_eq!(session.change_state(State::Playing).await?, State::Playing);
    let deadline = tokio::time::Instant::now() + merged.duration() + Duration::from_secs(2);
    while session.state().await? == State::Playing {
        assert!(tokio::time::Instant::now() < deadline, "playback never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(session.state().await?, State::Paused);

    let snapshot = session.snapshot().await?;
    assert!(snapshot.playback_elapsed > Duration::ZERO);
    assert_eq!(snapshot.segments_recorded, 2);

    session.deinitialize().await?;
    Ok(())
}
