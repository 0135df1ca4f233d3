use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::ffmpeg::{self, StderrTail};
use crate::video::types::Frame;

/// An opened, single-pass video source yielding RGB frames in order
///
/// Frames come from an `ffmpeg` child emitting packed `rgb24`, or from any
/// reader carrying that layout. The underlying decoder is released exactly
/// once: at end of stream, on a read error, on [`VideoSource::close`], or on
/// drop, whichever comes first.
pub struct VideoSource {
    origin: PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    frames_read: u64,
    stream: Option<Box<dyn Read + Send>>,
    child: Option<Child>,
    stderr_tail: Option<StderrTail>,
    closed: bool,
}

impl VideoSource {
    /// Open a video file for sequential decoding
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |reason: String| VideoError::MediaOpen {
            path: path.display().to_string(),
            reason,
        };

        if !path.is_file() {
            return Err(open_error("file does not exist".to_string()).into());
        }

        let probe = ffmpeg::probe_video(path)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]);

        let source = Self::spawn(cmd, path, probe.width, probe.height, probe.fps)?;

        info!(
            "Opened video source {:?}: {}x{} @ {:.2}fps ({}, {} frames)",
            path,
            probe.width,
            probe.height,
            probe.fps,
            probe.codec.as_deref().unwrap_or("unknown codec"),
            probe
                .frame_count
                .map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        Ok(source)
    }

    /// Start a decoder process that writes packed `rgb24` frames to stdout
    fn spawn(mut cmd: Command, origin: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        let open_error = |reason: String| VideoError::MediaOpen {
            path: origin.display().to_string(),
            reason,
        };

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| open_error(format!("failed to spawn ffmpeg: {}", e)))?;

        let stderr_tail = StderrTail::spawn(child.stderr.take());

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(open_error("ffmpeg stdout unavailable".to_string()).into());
        };

        Ok(Self {
            origin: origin.to_path_buf(),
            width,
            height,
            fps,
            frames_read: 0,
            stream: Some(Box::new(stdout)),
            child: Some(child),
            stderr_tail: Some(stderr_tail),
            closed: false,
        })
    }

    /// Wrap an already-decoded packed `rgb24` byte stream
    pub fn from_reader<R>(reader: R, width: u32, height: u32, fps: f64) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        if width == 0 || height == 0 || fps.is_nan() || fps <= 0.0 {
            return Err(VideoError::MediaOpen {
                path: "<stream>".to_string(),
                reason: format!("invalid stream parameters {}x{} @ {}fps", width, height, fps),
            }
            .into());
        }

        Ok(Self {
            origin: PathBuf::from("<stream>"),
            width,
            height,
            fps,
            frames_read: 0,
            stream: Some(Box::new(reader)),
            child: None,
            stderr_tail: None,
            closed: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Number of frames read so far
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Read the next frame, or `None` once the stream is exhausted
    pub fn read_next(&mut self) -> Result<Option<Frame>> {
        let frame_len = self.frame_len();
        let Some(stream) = self.stream.as_mut() else {
            return Err(VideoError::DecodingFailed {
                reason: format!("source {:?} is closed", self.origin),
            }
            .into());
        };

        let mut buffer = vec![0u8; frame_len];
        let filled = match read_full(stream.as_mut(), &mut buffer) {
            Ok(filled) => filled,
            Err(e) => {
                self.release(false)?;
                return Err(VideoError::DecodingFailed {
                    reason: format!("read failed at frame {}: {}", self.frames_read, e),
                }
                .into());
            }
        };

        if filled == 0 {
            debug!("End of stream after {} frames", self.frames_read);
            self.release(true)?;
            return Ok(None);
        }

        if filled < frame_len {
            self.release(false)?;
            return Err(VideoError::DecodingFailed {
                reason: format!(
                    "truncated frame {}: got {} of {} bytes",
                    self.frames_read, filled, frame_len
                ),
            }
            .into());
        }

        let frame = Frame::from_rgb_bytes(self.width, self.height, buffer, self.frames_read)
            .ok_or_else(|| VideoError::DecodingFailed {
                reason: "frame buffer size mismatch".to_string(),
            })?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    /// Release the decoder. Calling this more than once is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.release(false)
    }

    /// `drained` is true when the reader hit end of stream, in which case a
    /// failing ffmpeg exit status is reported as a decode error.
    fn release(&mut self, drained: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        drop(self.stream.take());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if !drained {
            let _ = child.kill();
        }

        let status = child.wait().map_err(|e| VideoError::DecodingFailed {
            reason: format!("failed to wait for ffmpeg: {}", e),
        })?;
        let stderr = self.stderr_tail.take().map(StderrTail::join).unwrap_or_default();

        debug!("Released decoder for {:?} after {} frames", self.origin, self.frames_read);

        if drained && !status.success() {
            return Err(VideoError::DecodingFailed {
                reason: format!("ffmpeg exited with {}: {}", status, stderr),
            }
            .into());
        }

        Ok(())
    }
}

impl Iterator for VideoSource {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.read_next().transpose()
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let Err(e) = self.release(false) {
            warn!("Failed to release video source {:?}: {}", self.origin, e);
        }
    }
}

fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelError;
    use std::io::Cursor;

    fn raw_stream(frames: u8, width: u32, height: u32) -> Vec<u8> {
        let frame_len = (width * height * 3) as usize;
        (0..frames).flat_map(|i| vec![i; frame_len]).collect()
    }

    #[test]
    fn test_reads_frames_in_order() {
        let mut source = VideoSource::from_reader(Cursor::new(raw_stream(3, 4, 2)), 4, 2, 30.0).unwrap();

        for expected in 0..3u8 {
            let frame = source.read_next().unwrap().unwrap();
            assert_eq!(frame.index(), u64::from(expected));
            assert_eq!(frame.dimensions(), (4, 2));
            assert_eq!(frame.get_pixel(3, 1), [expected; 3]);
        }

        assert!(source.read_next().unwrap().is_none());
        assert!(source.is_closed());
        assert_eq!(source.frames_read(), 3);
    }

    #[test]
    fn test_no_reads_after_close() {
        let mut source = VideoSource::from_reader(Cursor::new(raw_stream(2, 2, 2)), 2, 2, 30.0).unwrap();
        source.close().unwrap();
        source.close().unwrap();

        assert!(matches!(
            source.read_next(),
            Err(ReelError::Video(VideoError::DecodingFailed { .. }))
        ));
        assert!(source.next().is_none());
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut bytes = raw_stream(1, 2, 2);
        bytes.extend_from_slice(&[9, 9, 9]);
        let mut source = VideoSource::from_reader(Cursor::new(bytes), 2, 2, 30.0).unwrap();

        assert!(source.read_next().unwrap().is_some());
        assert!(source.read_next().is_err());
        assert!(source.is_closed());
    }

    #[test]
    fn test_iterator_counts_frames() {
        let source = VideoSource::from_reader(Cursor::new(raw_stream(5, 3, 3)), 3, 3, 25.0).unwrap();
        let frames: Result<Vec<Frame>> = source.collect();
        assert_eq!(frames.unwrap().len(), 5);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = VideoSource::open(dir.path().join("missing.mp4"));
        assert!(matches!(
            result,
            Err(ReelError::Video(VideoError::MediaOpen { .. }))
        ));
    }

    #[test]
    fn test_open_unreadable_media() {
        if !ffmpeg::check_ffmpeg_available() {
            eprintln!("skipping: ffmpeg not found");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp4");
        std::fs::write(&path, b"definitely not a video").unwrap();

        assert!(matches!(
            VideoSource::open(&path),
            Err(ReelError::Video(VideoError::MediaOpen { .. }))
        ));
    }

    #[cfg(unix)]
    fn noisy_decoder(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    /// 5000 warning lines overflow the stderr pipe before any frame is written.
    #[cfg(unix)]
    const STDERR_FLOOD: &str =
        "i=0; while [ $i -lt 5000 ]; do echo \"[h264] error while decoding MB $i\" >&2; i=$((i+1)); done";

    #[cfg(unix)]
    #[test]
    fn test_chatty_decoder_does_not_stall() {
        let script = format!("{}; exec head -c 480 /dev/zero", STDERR_FLOOD);
        let source = VideoSource::spawn(noisy_decoder(&script), Path::new("noisy.mp4"), 4, 4, 30.0).unwrap();

        let frames: Result<Vec<Frame>> = source.collect();
        let frames = frames.unwrap();
        assert_eq!(frames.len(), 10);
        assert_eq!(frames[9].index(), 9);
    }

    #[cfg(unix)]
    #[test]
    fn test_decoder_failure_reports_stderr_tail() {
        let script = format!("{}; head -c 96 /dev/zero; exit 3", STDERR_FLOOD);
        let mut source = VideoSource::spawn(noisy_decoder(&script), Path::new("noisy.mp4"), 4, 4, 30.0).unwrap();

        assert!(source.read_next().unwrap().is_some());
        assert!(source.read_next().unwrap().is_some());
        match source.read_next() {
            Err(ReelError::Video(VideoError::DecodingFailed { reason })) => {
                assert!(reason.contains("error while decoding MB 4999"));
                assert!(!reason.contains("MB 0\n"));
            }
            other => panic!("expected decode failure, got {:?}", other.map(|f| f.is_some())),
        }
        assert_eq!(source.frames_read(), 2);
    }

    #[test]
    fn test_invalid_stream_parameters() {
        assert!(VideoSource::from_reader(Cursor::new(Vec::new()), 0, 2, 30.0).is_err());
        assert!(VideoSource::from_reader(Cursor::new(Vec::new()), 2, 2, 0.0).is_err());
    }
}
