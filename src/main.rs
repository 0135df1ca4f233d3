use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn, Level};

use post_reel::{
    config::Config,
    error::{ReelError, VideoError},
    overlay::prepare_overlay,
    ReelEngine,
};

#[derive(Parser)]
#[command(
    name = "post-reel",
    version,
    about = "Stamp a rendered post card onto every frame of a background video",
    long_about = "post-reel alpha-composites a pre-rendered RGBA card onto each frame of a background video and encodes the result as an MPEG-4 clip."
)]
struct Cli {
    /// Background video path
    #[arg(short, long)]
    video: PathBuf,

    /// Rendered card image (PNG with alpha)
    #[arg(short = 'i', long)]
    overlay: PathBuf,

    /// Output video file path
    #[arg(short, long)]
    output: PathBuf,

    /// Output frame rate (default 30)
    #[arg(long)]
    fps: Option<u32>,

    /// Directory for diagnostic still frames
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Number of diagnostic still frames to save
    #[arg(long)]
    sample_frames: Option<usize>,

    /// Profile picture to stamp onto the card
    #[arg(long)]
    avatar: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(fps) = self.fps {
            config.output.fps = fps;
        }
        if let Some(dir) = &self.frames_dir {
            config.diagnostics.frames_dir = Some(dir.clone());
        }
        if let Some(n) = self.sample_frames {
            config.diagnostics.sample_frames = n;
        }
        if let Some(avatar) = &self.avatar {
            config.avatar.path = Some(avatar.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting post-reel v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    let overlay = match prepare_overlay(&cli.overlay, &config) {
        Ok(overlay) => Arc::new(overlay),
        Err(e) => {
            error!("{}", e.user_message());
            return Err(e.into());
        }
    };

    let engine = ReelEngine::new(config);
    let output = &engine.config().output;
    info!("Encoding with {}/{} @ {}fps", output.codec, output.fourcc, output.fps);

    match engine
        .run_async(cli.video.clone(), overlay, cli.output.clone())
        .await
    {
        Ok(report) => {
            info!(
                "Reel saved to {:?} ({} frames, {} sample stills)",
                report.video.path,
                report.video.frame_count,
                report.sample_frames.len()
            );
            Ok(())
        }
        Err(ReelError::Video(VideoError::NoFrames)) => {
            warn!("No video produced: {:?} contained no frames", cli.video);
            Err(anyhow::anyhow!("no video produced"))
        }
        Err(e) => {
            error!("{}", e.user_message());
            Err(e.into())
        }
    }
}
