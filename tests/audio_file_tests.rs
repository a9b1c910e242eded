// Integration tests for audio file processing
//
// These tests verify that we can read WAV files and extract audio data correctly.

mod common;

use anyhow::Result;
use common::write_wav;
use std::path::PathBuf;
use tempfile::TempDir;
use voice_memo::audio::{AudioFile, AudioTrack};

fn stereo_fixture(dir: &TempDir, frames: usize) -> Result<PathBuf> {
    let path = dir.path().join("stereo.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for _ in 0..frames {
        writer.write_sample(8192i16)?;
        writer.write_sample(-8192i16)?;
    }
    writer.finalize()?;
    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("memo.wav");
    write_wav(&path, 16000, 16000, 0)?;

    let audio = AudioFile::open(&path)?;

    // Verify basic properties
    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-6);

    // Verify path is stored
    assert!(audio.path.ends_with("memo.wav"));

    Ok(())
}

#[test]
fn test_audio_file_interleaved_channels() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = stereo_fixture(&temp_dir, 4800)?;
    let audio = AudioFile::open(&path)?;

    // For stereo (2 channels), samples should be interleaved [L, R, L, R, ...]
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 9600);
    assert_eq!(audio.frames(), 4800);
    assert!((audio.samples[0] - 0.25).abs() < 1e-4);
    assert!((audio.samples[1] + 0.25).abs() < 1e-4);
    assert!((audio.duration().as_secs_f64() - 0.1).abs() < 1e-6);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_probe_reads_header_only() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = stereo_fixture(&temp_dir, 480)?;

    let track = AudioTrack::probe(&path)?;
    assert_eq!(track.path(), path.as_path());
    assert_eq!(track.sample_rate(), Some(48000));
    assert_eq!(track.channels(), Some(2));

    let audio = track.decode()?;
    assert_eq!(audio.frames(), 480);

    Ok(())
}

#[test]
fn test_probe_rejects_non_audio() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("notes.wav");
    std::fs::write(&path, "not a riff header")?;

    assert!(AudioTrack::probe(&path).is_err());
    Ok(())
}
