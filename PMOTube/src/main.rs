mod logs;

use anyhow::Result;
use clap::Parser;
use pmoconfig::{Config, get_config};
use pmoytmusic::{
    MemoryQueue, PlaybackSession, RadioContinuation, RadioFeeder, RadioSeed, StreamConfigExt,
    Track, TrackOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pmotube")]
#[command(about = "Plays a YouTube Music track followed by its radio")]
#[command(version)]
struct Args {
    /// Video id of the first track
    video_id: String,

    /// Write audio to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Stop after this many tracks
    #[arg(short = 'n', long)]
    max_tracks: Option<usize>,

    /// Play only the given track
    #[arg(long)]
    no_radio: bool,

    /// Configuration directory
    #[arg(long, env = "PMOTUBE_CONFIG")]
    config_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config_dir {
        Some(dir) => Arc::new(Config::load_config(dir)?),
        None => get_config(),
    };
    logs::init_logging(&config);
    info!("Configuration loaded from {}", config.path().display());

    // ========== Pipeline de résolution et de cache ==========
    let client = Arc::new(config.create_innertube_client()?);
    let source = config.create_data_source(client.clone())?;
    let resolver = source.resolver().clone();

    let queue = MemoryQueue::new(vec![Track::new(args.video_id.clone(), "")]);
    let mut session = PlaybackSession::new(source, queue, config.create_retry_controller()?);

    if !args.no_radio {
        let radio = RadioContinuation::new(client.clone(), RadioSeed::from_video(&args.video_id));
        session = session.with_radio(RadioFeeder::new(radio, config.get_radio_threshold()?));
    }
    if let Some(max_tracks) = args.max_tracks {
        session = session.with_max_tracks(max_tracks);
    }

    // ========== Lecture ==========
    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(tokio::fs::File::create(path).await?),
        None => Box::new(tokio::io::stdout()),
    };

    let report = tokio::select! {
        report = session.play(&mut sink) => report?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, flushing pending metadata...");
            resolver.flush().await;
            return Ok(());
        }
    };

    for outcome in &report.outcomes {
        match outcome {
            TrackOutcome::Played { key, bytes } => info!("▶ {} ({} bytes)", key, bytes),
            TrackOutcome::Skipped { key, reason } => warn!("⏭ {} skipped: {}", key, reason),
        }
    }
    info!(
        "✅ {} track(s) played, {} skipped, {} bytes",
        report.played(),
        report.skipped(),
        report.total_bytes()
    );

    Ok(())
}
