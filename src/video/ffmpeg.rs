use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

use serde::Deserialize;

use crate::error::{Result, VideoError};

/// Check whether an ffmpeg suite binary (`ffmpeg`, `ffprobe`) runs from PATH
pub fn is_tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

pub fn check_ffmpeg_available() -> bool {
    is_tool_available("ffmpeg") && is_tool_available("ffprobe")
}

/// Stream metadata reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: Option<String>,
    pub frame_count: Option<u64>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

/// Read the first video stream's metadata with ffprobe
pub fn probe_video(path: &Path) -> Result<ProbeInfo> {
    let open_error = |reason: String| VideoError::MediaOpen {
        path: path.display().to_string(),
        reason,
    };

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-select_streams", "v:0"])
        .arg(path)
        .output()
        .map_err(|e| open_error(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(open_error(format!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ))
        .into());
    }

    parse_probe_json(&output.stdout).map_err(|reason| open_error(reason).into())
}

fn parse_probe_json(json: &[u8]) -> std::result::Result<ProbeInfo, String> {
    let parsed: ProbeOut =
        serde_json::from_slice(json).map_err(|e| format!("ffprobe json parse failed: {}", e))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| "no video stream found".to_string())?;

    let width = stream.width.filter(|w| *w > 0).ok_or("missing video width")?;
    let height = stream.height.filter(|h| *h > 0).ok_or("missing video height")?;

    let fps = [stream.r_frame_rate.as_deref(), stream.avg_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(parse_ratio)
        .find(|fps| *fps > 0.0)
        .ok_or("missing video frame rate")?;

    Ok(ProbeInfo {
        width,
        height,
        fps,
        codec: stream.codec_name.clone(),
        frame_count: stream.nb_frames.as_deref().and_then(|n| n.parse().ok()),
    })
}

/// Lines of ffmpeg stderr kept for error messages
const STDERR_TAIL_LINES: usize = 32;

/// Drains a child's stderr on a helper thread, keeping only the last lines
///
/// ffmpeg blocks once its stderr pipe fills, so the pipe has to be read for
/// as long as the child runs, not only when it exits.
pub(crate) struct StderrTail {
    handle: Option<JoinHandle<VecDeque<String>>>,
}

impl StderrTail {
    pub(crate) fn spawn(stderr: Option<ChildStderr>) -> Self {
        let handle = stderr.map(|stderr| {
            std::thread::spawn(move || {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                for line in BufReader::new(stderr).split(b'\n') {
                    let Ok(line) = line else { break };
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(String::from_utf8_lossy(&line).trim_end().to_string());
                }
                tail
            })
        });
        Self { handle }
    }

    /// Wait for the child's stderr to close and return what was kept.
    /// Call this after the child has exited.
    pub(crate) fn join(mut self) -> String {
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|lines| Vec::from(lines).join("\n").trim().to_string())
            .unwrap_or_default()
    }
}

/// Parse ffmpeg rationals like `30000/1001`
pub fn parse_ratio(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/').unwrap_or((s, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
