use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use voice_memo::{
    AudioTrack, Config, OutputFormat, RecordingSession, SegmentMerger, SessionEvent,
    SilentPlayer, State, ToneCapture,
};

#[derive(Parser)]
#[command(name = "voice-memo", version, about = "Segmented voice memo recorder")]
struct Cli {
    /// Config file, extension optional
    #[arg(short, long, default_value = "config/voice-memo")]
    config: String,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record two tone segments, merge them and play the result back
    Demo {
        /// Length of each recorded segment in milliseconds
        #[arg(long, default_value_t = 1000)]
        segment_ms: u64,

        /// Print only state changes and playback notices, not ticks
        #[arg(long)]
        quiet: bool,
    },
    /// Append SOURCE to DESTINATION
    Merge {
        destination: PathBuf,
        source: PathBuf,

        /// Write here instead of overwriting DESTINATION
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not delete SOURCE after merging
        #[arg(long)]
        keep_source: bool,

        #[arg(long, default_value_t = OutputFormat::Pcm16)]
        format: OutputFormat,
    },
    /// Print the properties of an audio file
    Probe { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    info!("Voice Memo v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Demo { segment_ms, quiet } => {
            let cfg = Config::load(&cli.config)?;
            run_demo(cfg, Duration::from_millis(segment_ms), quiet).await
        }
        Command::Merge {
            destination,
            source,
            output,
            keep_source,
            format,
        } => {
            let pending = SegmentMerger::new().merge(
                &source,
                &destination,
                output.as_deref(),
                !keep_source,
                format,
            )?;
            let merged = pending.await?;
            println!("{}", merged.display());
            Ok(())
        }
        Command::Probe { file } => {
            let audio = tokio::task::spawn_blocking(move || AudioTrack::probe(&file)?.decode())
                .await
                .context("Probe task failed")??;

            info!("Successfully loaded audio file!");
            println!("{}", serde_json::json!({
                "path": audio.path,
                "duration_seconds": audio.duration_seconds,
                "sample_rate": audio.sample_rate,
                "channels": audio.channels,
                "frames": audio.frames(),
            }));
            Ok(())
        }
    }
}

async fn run_demo(cfg: Config, segment: Duration, quiet: bool) -> Result<()> {
    let session_config = cfg.session_config();
    info!("Recordings: {}", session_config.recordings_dir.display());

    let session = RecordingSession::spawn(
        session_config,
        Box::new(ToneCapture::new(cfg.tone_config())),
        Box::new(SilentPlayer::new()),
    );

    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let noisy = matches!(
                        event,
                        SessionEvent::TimestampTick { .. } | SessionEvent::AmplitudeSample { .. }
                    );
                    if !(quiet && noisy) {
                        if let Ok(line) = serde_json::to_string(&event) {
                            println!("{}", line);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Event printer lagged by {}", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let output = session.configure().await?;

    for _ in 0..2 {
        expect_state(session.change_state(State::Recording).await?, State::Recording)?;
        tokio::time::sleep(segment).await;
        expect_state(session.change_state(State::Paused).await?, State::Paused)?;
    }

    // Wait for the last merge to land before playing the result
    while session.snapshot().await?.merges_in_flight > 0 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    expect_state(session.change_state(State::Playing).await?, State::Playing)?;
    while session.state().await? == State::Playing {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let snapshot = session.snapshot().await?;
    info!(
        "Recorded {} segments, {:.2}s recording, {:.2}s playback",
        snapshot.segments_recorded,
        snapshot.recording_elapsed.as_secs_f64(),
        snapshot.playback_elapsed.as_secs_f64()
    );

    session.deinitialize().await?;
    drop(session);
    let _ = printer.await;

    println!("{}", output.display());
    Ok(())
}

fn expect_state(actual: State, expected: State) -> Result<()> {
    if actual != expected {
        anyhow::bail!("Expected state {}, session is {}", expected, actual);
    }
    Ok(())
}
