use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{ReelError, Result, VideoError},
    video::{composite, save_sample_frame, EncodedVideo, OverlayImage, VideoSource, VideoWriter},
};

/// Drives one generation run: decode, composite, encode
///
/// The pipeline streams: each frame is read, blended with the overlay,
/// optionally saved as a diagnostic still, and handed to the encoder before
/// the next one is decoded. Only the current frame is held in memory.
///
/// 1. Open Source - Probe the background video and start decoding
/// 2. Placement Check - Reject an overlay that does not fit before reading any frame
/// 3. Per Frame - Composite, sample, encode, in source order
/// 4. Finish - Flush the container, or abort and delete it on failure
#[derive(Debug, Clone, Default)]
pub struct ReelEngine {
    config: Config,
}

/// What a successful run produced
#[derive(Debug, Clone)]
pub struct ReelReport {
    pub video: EncodedVideo,
    pub source_fps: f64,
    pub sample_frames: Vec<PathBuf>,
}

impl ReelEngine {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Composite `overlay` onto every frame of the video at `video_path`
    pub fn run<P, Q>(&self, video_path: P, overlay: &OverlayImage, output_path: Q) -> Result<ReelReport>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        info!("🎬 Generating reel");
        info!("   Video: {:?}", video_path.as_ref());
        info!("   Output: {:?}", output_path.as_ref());

        let mut source = VideoSource::open(video_path)?;
        self.run_source(&mut source, overlay, output_path)
    }

    /// Same as [`ReelEngine::run`] for an already opened source
    ///
    /// The source is closed when this returns, whatever the outcome.
    pub fn run_source<Q: AsRef<Path>>(
        &self,
        source: &mut VideoSource,
        overlay: &OverlayImage,
        output_path: Q,
    ) -> Result<ReelReport> {
        let result = self.stream_frames(source, overlay, output_path.as_ref());
        if let Err(e) = source.close() {
            warn!("Failed to close video source: {}", e);
        }
        result
    }

    /// Run on the blocking pool so async callers (a serving layer) are not stalled
    pub async fn run_async(
        &self,
        video_path: PathBuf,
        overlay: Arc<OverlayImage>,
        output_path: PathBuf,
    ) -> Result<ReelReport> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.run(&video_path, &overlay, &output_path))
            .await
            .map_err(|e| ReelError::generic(format!("pipeline task failed: {}", e)))?
    }

    fn stream_frames(
        &self,
        source: &mut VideoSource,
        overlay: &OverlayImage,
        output_path: &Path,
    ) -> Result<ReelReport> {
        overlay.check_fits(source.dimensions())?;

        let settings = &self.config.output;
        if (source.fps() - f64::from(settings.fps)).abs() > 0.01 {
            debug!(
                "Source runs at {:.2}fps, output is fixed at {}fps",
                source.fps(),
                settings.fps
            );
        }

        let mut sample_dir = self.config.diagnostics.target_dir();
        let sample_limit = self.config.diagnostics.sample_frames;
        let mut sample_frames = Vec::new();

        // Opened on the first frame so that an empty source leaves no file behind.
        // Dropping it on an error path kills ffmpeg and deletes the partial output.
        let mut writer: Option<VideoWriter> = None;

        while let Some(frame) = source.read_next()? {
            let composited = composite(frame, overlay)?;

            if let Some(dir) = sample_dir {
                if sample_frames.len() < sample_limit {
                    match save_sample_frame(&composited, dir) {
                        Ok(path) => sample_frames.push(path),
                        Err(e) => {
                            warn!("Diagnostic frames disabled for this run: {}", e);
                            sample_dir = None;
                        }
                    }
                }
            }

            if writer.is_none() {
                let (width, height) = composited.dimensions();
                writer = Some(VideoWriter::create(output_path, width, height, settings)?);
            }
            if let Some(writer) = writer.as_mut() {
                writer.write_frame(&composited)?;
            }
        }

        let Some(writer) = writer else {
            warn!("Source produced no frames; nothing written to {:?}", output_path);
            return Err(VideoError::NoFrames.into());
        };

        let video = writer.finish()?;
        info!("🎉 Reel complete: {} frames -> {:?}", video.frame_count, video.path);

        Ok(ReelReport {
            video,
            source_fps: source.fps(),
            sample_frames,
        })
    }
}
