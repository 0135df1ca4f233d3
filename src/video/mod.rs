//! # Video Processing Module
//!
//! Decoding the background video, blending the overlay onto each frame, and
//! encoding the result. Decoding and encoding shell out to the system
//! `ffmpeg`/`ffprobe` binaries.

pub mod compositor;
pub mod decoder;
pub mod encoder;
pub mod ffmpeg;
pub mod types;

pub use compositor::{composite, composite_all, OverlayImage};
pub use decoder::VideoSource;
pub use encoder::{
    save_sample_frame, save_sample_frames, write_video, write_video_with, EncodedVideo, VideoWriter,
};
pub use ffmpeg::check_ffmpeg_available;
pub use types::{CompositedFrame, EncodeSettings, Frame, DEFAULT_FPS};
