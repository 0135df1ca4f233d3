use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::ffmpeg::StderrTail;
use crate::video::types::{CompositedFrame, EncodeSettings, DEFAULT_FPS};

/// Represents a finished output video
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u64,
    pub file_size: u64,
}

/// Writable output container backed by an `ffmpeg` child reading `rgb24` on stdin
///
/// Dimensions and frame rate are fixed at creation. If the writer is dropped
/// without [`VideoWriter::finish`], the encoder is killed and the partial file
/// removed, so a truncated output never survives a failed run.
pub struct VideoWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_tail: Option<StderrTail>,
    scratch: Vec<u8>,
    frames_written: u64,
}

impl VideoWriter {
    pub fn create<P: AsRef<Path>>(path: P, width: u32, height: u32, settings: &EncodeSettings) -> Result<Self> {
        let path = path.as_ref();
        let encode_error = |reason: String| VideoError::EncodeWrite { reason };

        if width == 0 || height == 0 {
            return Err(encode_error(format!("invalid output size {}x{}", width, height)).into());
        }
        if settings.fps == 0 {
            return Err(encode_error("output fps must be non-zero".to_string()).into());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                encode_error(format!("failed to create output directory {:?}: {}", parent, e))
            })?;
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &format!("{}x{}", width, height),
            "-r",
            &settings.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            &settings.codec,
            "-vtag",
            &settings.fourcc,
            "-q:v",
            &settings.quality.to_string(),
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(path);

        let writer = Self::spawn(cmd, path, width, height, settings.fps)?;

        info!(
            "Opened output {:?}: {}x{} @ {}fps ({}/{})",
            path, width, height, settings.fps, settings.codec, settings.fourcc
        );

        Ok(writer)
    }

    /// Start an encoder process that reads packed `rgb24` frames on stdin
    fn spawn(mut cmd: Command, path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        let encode_error = |reason: String| VideoError::EncodeWrite { reason };

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| encode_error(format!("failed to spawn ffmpeg (is it installed and on PATH?): {}", e)))?;

        let stderr_tail = StderrTail::spawn(child.stderr.take());

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(encode_error("failed to open ffmpeg stdin".to_string()).into());
        };

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            fps,
            child: Some(child),
            stdin: Some(stdin),
            stderr_tail: Some(stderr_tail),
            scratch: Vec::with_capacity(width as usize * height as usize * 3),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame, dropping its alpha channel
    pub fn write_frame(&mut self, frame: &CompositedFrame) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(VideoError::EncodeWrite {
                reason: format!(
                    "frame {} is {}x{}, output is {}x{}",
                    frame.index(),
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            }
            .into());
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(VideoError::EncodeWrite {
                reason: "encoder is already finished".to_string(),
            }
            .into());
        };

        frame.write_rgb_into(&mut self.scratch);

        if let Err(e) = stdin.write_all(&self.scratch) {
            let stderr = self.kill_and_collect_stderr();
            return Err(VideoError::EncodeWrite {
                reason: format!("failed to write frame {} to ffmpeg: {} {}", frame.index(), e, stderr),
            }
            .into());
        }

        self.frames_written += 1;
        Ok(())
    }

    /// Flush the encoder and wait for the container to be written
    pub fn finish(mut self) -> Result<EncodedVideo> {
        drop(self.stdin.take());

        let Some(mut child) = self.child.take() else {
            return Err(VideoError::EncodeWrite {
                reason: "encoder was already released".to_string(),
            }
            .into());
        };

        let status = child.wait().map_err(|e| VideoError::EncodeWrite {
            reason: format!("failed to wait for ffmpeg: {}", e),
        })?;
        let stderr = self.take_stderr();

        if !status.success() {
            remove_partial(&self.path);
            return Err(VideoError::EncodeWrite {
                reason: format!("ffmpeg exited with {}: {}", status, stderr),
            }
            .into());
        }

        let file_size = std::fs::metadata(&self.path)?.len();
        info!(
            "Wrote {} frames to {:?} ({} KB)",
            self.frames_written,
            self.path,
            file_size / 1024
        );

        Ok(EncodedVideo {
            path: self.path.clone(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            frame_count: self.frames_written,
            file_size,
        })
    }

    /// Kill the encoder and delete whatever was written
    pub fn abort(mut self) {
        self.release_partial();
    }

    fn kill_and_collect_stderr(&mut self) -> String {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return String::new();
        };
        let _ = child.kill();
        let _ = child.wait();
        let stderr = self.take_stderr();
        remove_partial(&self.path);
        stderr
    }

    fn take_stderr(&mut self) -> String {
        self.stderr_tail.take().map(StderrTail::join).unwrap_or_default()
    }

    fn release_partial(&mut self) {
        if self.child.is_some() {
            debug!("Aborting output {:?} after {} frames", self.path, self.frames_written);
            let _ = self.kill_and_collect_stderr();
        }
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        self.release_partial();
    }
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {:?}: {}", path, e),
    }
}

/// Encode an in-memory frame sequence at `fps` (30 when `None`)
pub fn write_video<P: AsRef<Path>>(
    frames: &[CompositedFrame],
    output_path: P,
    fps: Option<u32>,
) -> Result<EncodedVideo> {
    let settings = EncodeSettings::default().with_fps(fps.unwrap_or(DEFAULT_FPS));
    write_video_with(frames, output_path, &settings)
}

/// Encode an in-memory frame sequence with explicit settings
///
/// An empty sequence returns `NoFrames` without touching the output path.
pub fn write_video_with<P: AsRef<Path>>(
    frames: &[CompositedFrame],
    output_path: P,
    settings: &EncodeSettings,
) -> Result<EncodedVideo> {
    let Some(first) = frames.first() else {
        warn!("No frames to write to {:?}", output_path.as_ref());
        return Err(VideoError::NoFrames.into());
    };

    let mut writer = VideoWriter::create(output_path, first.width(), first.height(), settings)?;
    for frame in frames {
        // Dropping the writer on error kills ffmpeg and removes the file.
        writer.write_frame(frame)?;
    }
    writer.finish()
}

/// Path of the diagnostic still for a frame index
pub fn sample_frame_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("frame_{}.png", index))
}

/// Write one frame as a PNG into `dir`
pub fn save_sample_frame(frame: &CompositedFrame, dir: &Path) -> Result<PathBuf> {
    let path = sample_frame_path(dir, frame.index());
    let diagnostic_error = |reason: String| VideoError::DiagnosticWrite {
        path: path.display().to_string(),
        reason,
    };

    if !dir.is_dir() {
        return Err(diagnostic_error("directory does not exist".to_string()).into());
    }

    frame
        .to_rgb_image()
        .save(&path)
        .map_err(|e| diagnostic_error(e.to_string()))?;

    debug!("Saved sample frame {:?}", path);
    Ok(path)
}

/// Best-effort: write the first `n` frames as stills, logging failures
pub fn save_sample_frames(frames: &[CompositedFrame], dir: &Path, n: usize) -> Vec<PathBuf> {
    let mut saved = Vec::new();
    for frame in frames.iter().take(n) {
        match save_sample_frame(frame, dir) {
            Ok(path) => saved.push(path),
            Err(e) => {
                warn!("Skipping sample frames: {}", e);
                break;
            }
        }
    }
    saved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelError;
    use crate::video::ffmpeg;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    fn solid_frames(count: u64, size: u32) -> Vec<CompositedFrame> {
        (0..count)
            .map(|i| CompositedFrame::new(RgbaImage::from_pixel(size, size, Rgba([i as u8, 40, 80, 255])), i))
            .collect()
    }

    #[test]
    fn test_empty_sequence_creates_nothing() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");

        let result = write_video(&[], &output, None);

        assert!(matches!(result, Err(ReelError::Video(VideoError::NoFrames))));
        assert!(!output.exists());
    }

    #[test]
    fn test_save_two_of_five() {
        let dir = tempdir().unwrap();
        let frames = solid_frames(5, 8);

        let saved = save_sample_frames(&frames, dir.path(), 2);

        assert_eq!(saved, vec![dir.path().join("frame_0.png"), dir.path().join("frame_1.png")]);
        let pngs = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(pngs, 2);

        let still = image::open(&saved[1]).unwrap().to_rgb8();
        assert_eq!(still.get_pixel(0, 0).0, [1, 40, 80]);
    }

    #[test]
    fn test_save_to_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let frames = solid_frames(3, 4);

        assert!(save_sample_frames(&frames, &missing, 2).is_empty());
        assert!(matches!(
            save_sample_frame(&frames[0], &missing),
            Err(ReelError::Video(VideoError::DiagnosticWrite { .. }))
        ));
    }

    #[test]
    fn test_default_fps_written_to_container() {
        if !ffmpeg::check_ffmpeg_available() {
            eprintln!("skipping: ffmpeg not found");
            return;
        }
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");

        let encoded = write_video(&solid_frames(6, 16), &output, None).unwrap();
        assert_eq!(encoded.fps, 30);
        assert_eq!(encoded.frame_count, 6);
        assert!(encoded.file_size > 0);

        let probe = ffmpeg::probe_video(&output).unwrap();
        assert_eq!((probe.width, probe.height), (16, 16));
        assert!((probe.fps - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_size_change_mid_stream_is_rejected() {
        if !ffmpeg::check_ffmpeg_available() {
            eprintln!("skipping: ffmpeg not found");
            return;
        }
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");

        let mut frames = solid_frames(2, 16);
        frames.push(CompositedFrame::new(RgbaImage::new(8, 8), 2));

        let result = write_video(&frames, &output, Some(24));
        assert!(matches!(result, Err(ReelError::Video(VideoError::EncodeWrite { .. }))));
        assert!(!output.exists());
    }

    #[cfg(unix)]
    fn noisy_encoder(output: &Path, exit_code: u8) -> Command {
        let script = format!(
            "i=0; while [ $i -lt 5000 ]; do echo \"[mpeg4] rate control warning $i\" >&2; i=$((i+1)); done; \
             cat > \"$0\"; exit {}",
            exit_code
        );
        let mut cmd = Command::new("sh");
        cmd.args(["-c", &script]).arg(output);
        cmd
    }

    #[cfg(unix)]
    #[test]
    fn test_chatty_encoder_does_not_stall() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let frames = solid_frames(100, 32);

        let mut writer = VideoWriter::spawn(noisy_encoder(&output, 0), &output, 32, 32, 30).unwrap();
        for frame in &frames {
            writer.write_frame(frame).unwrap();
        }
        let encoded = writer.finish().unwrap();

        assert_eq!(encoded.frame_count, 100);
        assert_eq!(encoded.file_size, 100 * 32 * 32 * 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_failure_reports_stderr_tail() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.mp4");

        let mut writer = VideoWriter::spawn(noisy_encoder(&output, 1), &output, 16, 16, 30).unwrap();
        for frame in &solid_frames(3, 16) {
            writer.write_frame(frame).unwrap();
        }

        match writer.finish() {
            Err(ReelError::Video(VideoError::EncodeWrite { reason })) => {
                assert!(reason.contains("rate control warning 4999"));
            }
            other => panic!("expected encode failure, got {:?}", other),
        }
        assert!(!output.exists());
    }
}
