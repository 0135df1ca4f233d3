//! # post-reel
//!
//! Turn a social-media post card into a short promotional clip.
//!
//! A pre-rendered RGBA card (display name, handle, avatar, post text,
//! timestamp) is alpha-composited onto every frame of a background video and
//! the result is re-encoded as an MPEG-4 file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use post_reel::{config::Config, overlay::prepare_overlay, ReelEngine};
//!
//! # fn main() -> post_reel::Result<()> {
//! let config = Config::default();
//! let overlay = prepare_overlay("card.png", &config)?;
//!
//! let engine = ReelEngine::new(config);
//! let report = engine.run("background.mp4", &overlay, "reel.mp4")?;
//! println!("wrote {} frames", report.video.frame_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Decoder, frame compositor and encoder
//! - [`overlay`] - Loading the card and stamping the avatar onto it
//! - [`composition`] - The streaming engine tying the stages together
//! - [`config`] - Configuration management

pub mod composition;
pub mod config;
pub mod error;
pub mod overlay;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{ReelEngine, ReelReport},
    config::Config,
    error::{ReelError, Result},
    video::{CompositedFrame, Frame, OverlayImage, VideoSource},
};
