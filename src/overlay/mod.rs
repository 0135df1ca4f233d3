//! # Overlay Preparation
//!
//! Turns the rendered post card (and, optionally, the author's profile
//! picture) into the [`OverlayImage`] stamped onto every video frame.

pub mod card;

use std::path::Path;

use tracing::info;

use crate::config::Config;
use crate::error::{OverlayError, Result};
use crate::video::OverlayImage;

pub use card::{circular_avatar, load_rgba, stamp};

/// Load the card image and place it according to `config`
pub fn prepare_overlay<P: AsRef<Path>>(card_path: P, config: &Config) -> Result<OverlayImage> {
    let mut card = load_rgba(card_path.as_ref())?;

    if let Some(avatar_path) = &config.avatar.path {
        let picture = image::open(avatar_path).map_err(|e| OverlayError::LoadFailed {
            path: avatar_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let avatar = circular_avatar(&picture, config.avatar.size)?;
        stamp(&mut card, &avatar, config.avatar.position);
        info!(
            "Stamped avatar {:?} at ({}, {})",
            avatar_path, config.avatar.position.0, config.avatar.position.1
        );
    }

    let overlay = if config.overlay.full_canvas {
        OverlayImage::new(card)
    } else {
        let (x, y) = config.overlay.offset;
        OverlayImage::at_offset(card, x, y)
    };

    info!(
        "Prepared overlay {}x{} from {:?}",
        overlay.dimensions().0,
        overlay.dimensions().1,
        card_path.as_ref()
    );
    Ok(overlay)
}
