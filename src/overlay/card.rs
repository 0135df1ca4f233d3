use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, Rgba, RgbaImage};
use tracing::debug;

use crate::error::{OverlayError, Result};
use crate::video::compositor::blend_channel;

/// Open any decodable image as RGBA
pub fn load_rgba<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|e| OverlayError::LoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let (width, height) = image.dimensions();
    debug!("Loaded {:?} ({}x{})", path, width, height);
    Ok(image.to_rgba8())
}

/// Resize a picture to `size`x`size` and cut it to the inscribed circle
///
/// Pixels inside the circle become fully opaque, pixels outside fully
/// transparent.
pub fn circular_avatar(picture: &DynamicImage, size: u32) -> Result<RgbaImage> {
    if size == 0 {
        return Err(OverlayError::InvalidAvatar {
            details: "size must be non-zero".to_string(),
        }
        .into());
    }

    let mut avatar = imageops::resize(&picture.to_rgba8(), size, size, FilterType::CatmullRom);

    let radius = f64::from(size) / 2.0;
    for (x, y, px) in avatar.enumerate_pixels_mut() {
        let dx = f64::from(x) + 0.5 - radius;
        let dy = f64::from(y) + 0.5 - radius;
        px[3] = if dx * dx + dy * dy <= radius * radius { u8::MAX } else { 0 };
    }

    Ok(avatar)
}

/// Paste `picture` onto `card` at `position`, using the picture's own alpha
/// as the mask. Whatever falls outside the card is clipped.
pub fn stamp(card: &mut RgbaImage, picture: &RgbaImage, position: (u32, u32)) {
    let (card_w, card_h) = card.dimensions();
    let (px, py) = position;

    for (x, y, top) in picture.enumerate_pixels() {
        let (cx, cy) = (u64::from(px) + u64::from(x), u64::from(py) + u64::from(y));
        if cx >= u64::from(card_w) || cy >= u64::from(card_h) {
            continue;
        }

        let Rgba(src) = *top;
        let mask = src[3];
        if mask == 0 {
            continue;
        }

        let dst = card.get_pixel_mut(cx as u32, cy as u32);
        for c in 0..4 {
            dst[c] = blend_channel(src[c], dst[c], mask);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelError;

    #[test]
    fn test_circular_mask() {
        let picture = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(40, 40, image::Rgb([200, 10, 10])));
        let avatar = circular_avatar(&picture, 20).unwrap();

        assert_eq!(avatar.dimensions(), (20, 20));
        assert_eq!(avatar.get_pixel(0, 0)[3], 0);
        assert_eq!(avatar.get_pixel(19, 19)[3], 0);
        let centre = avatar.get_pixel(10, 10).0;
        assert!(centre[0].abs_diff(200) <= 1 && centre[1].abs_diff(10) <= 1);
        assert_eq!(centre[3], 255);
        assert_eq!(avatar.get_pixel(0, 10)[3], 255);
    }

    #[test]
    fn test_zero_size_avatar() {
        let picture = DynamicImage::new_rgba8(4, 4);
        assert!(matches!(
            circular_avatar(&picture, 0),
            Err(ReelError::Overlay(OverlayError::InvalidAvatar { .. }))
        ));
    }

    #[test]
    fn test_stamp_uses_picture_alpha() {
        let mut card = RgbaImage::from_pixel(6, 6, Rgba([0, 0, 0, 255]));
        let picture = RgbaImage::from_fn(2, 2, |x, _| {
            if x == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([255, 255, 255, 0])
            }
        });

        stamp(&mut card, &picture, (1, 1));

        assert_eq!(card.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(card.get_pixel(2, 1).0, [0, 0, 0, 255]);
        assert_eq!(card.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_stamp_clips_at_edges() {
        let mut card = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let picture = RgbaImage::from_pixel(3, 3, Rgba([9, 9, 9, 255]));

        stamp(&mut card, &picture, (2, 2));

        assert_eq!(card.get_pixel(3, 3).0, [9, 9, 9, 255]);
        assert_eq!(card.get_pixel(1, 1).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_load_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_rgba(dir.path().join("card.png")),
            Err(ReelError::Overlay(OverlayError::LoadFailed { .. }))
        ));
    }
}
