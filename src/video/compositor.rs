use image::{Rgba, RgbaImage};
use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::video::decoder::VideoSource;
use crate::video::types::{CompositedFrame, Frame};

/// The pre-rendered card stamped onto every frame
///
/// Either covers the whole canvas or sits at a fixed offset as a sub-region.
/// Never resized: a placement that does not fit the frame is rejected.
#[derive(Debug, Clone)]
pub struct OverlayImage {
    image: RgbaImage,
    offset: (u32, u32),
    full_canvas: bool,
}

impl OverlayImage {
    /// An overlay rendered at the canvas size
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            offset: (0, 0),
            full_canvas: true,
        }
    }

    /// An overlay placed at `(x, y)` inside a larger frame
    pub fn at_offset(image: RgbaImage, x: u32, y: u32) -> Self {
        Self {
            image,
            offset: (x, y),
            full_canvas: false,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn offset(&self) -> (u32, u32) {
        self.offset
    }

    pub fn is_full_canvas(&self) -> bool {
        self.full_canvas
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Fail with `DimensionMismatch` unless this overlay can be placed on a
    /// frame of the given size without cropping or scaling
    pub fn check_fits(&self, frame: (u32, u32)) -> Result<()> {
        let (w, h) = self.image.dimensions();
        let (x, y) = self.offset;

        let fits = if self.full_canvas {
            (w, h) == frame
        } else {
            u64::from(x) + u64::from(w) <= u64::from(frame.0)
                && u64::from(y) + u64::from(h) <= u64::from(frame.1)
        };

        if fits {
            Ok(())
        } else {
            Err(VideoError::DimensionMismatch {
                frame,
                overlay: (w, h),
                offset: self.offset,
            }
            .into())
        }
    }
}

/// `top * alpha + bottom * (1 - alpha)` on 8-bit channels, rounded.
///
/// Exact at the ends: alpha 0 returns `bottom`, alpha 255 returns `top`.
pub(crate) fn blend_channel(top: u8, bottom: u8, alpha: u8) -> u8 {
    let a = u32::from(alpha);
    ((u32::from(top) * a + u32::from(bottom) * (255 - a) + 127) / 255) as u8
}

/// Alpha-over `overlay` onto `frame`, producing a new opaque RGBA frame
pub fn composite(frame: Frame, overlay: &OverlayImage) -> Result<CompositedFrame> {
    let (width, height) = frame.dimensions();
    overlay.check_fits((width, height))?;
    let index = frame.index();

    let rgb = frame.into_image().into_raw();
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for px in rgb.chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], u8::MAX]);
    }

    let mut canvas = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        VideoError::DecodingFailed {
            reason: format!("frame {} buffer does not match {}x{}", index, width, height),
        }
    })?;

    let (ox, oy) = overlay.offset;
    for (x, y, top) in overlay.image.enumerate_pixels() {
        let Rgba([r, g, b, alpha]) = *top;
        if alpha == 0 {
            continue;
        }
        let dst = canvas.get_pixel_mut(x + ox, y + oy);
        dst[0] = blend_channel(r, dst[0], alpha);
        dst[1] = blend_channel(g, dst[1], alpha);
        dst[2] = blend_channel(b, dst[2], alpha);
    }

    Ok(CompositedFrame::new(canvas, index))
}

/// Drain `source`, compositing every frame and keeping all results in order.
///
/// Memory grows with `frame_count * width * height * 4` bytes; prefer the
/// streaming [`ReelEngine`](crate::composition::ReelEngine) for long videos.
pub fn composite_all(source: &mut VideoSource, overlay: &OverlayImage) -> Result<Vec<CompositedFrame>> {
    if let Err(e) = overlay.check_fits(source.dimensions()) {
        close_quietly(source);
        return Err(e);
    }

    let mut frames = Vec::new();
    while let Some(frame) = source.read_next()? {
        match composite(frame, overlay) {
            Ok(composited) => frames.push(composited),
            Err(e) => {
                close_quietly(source);
                return Err(e);
            }
        }
    }

    info!("Composited {} frames", frames.len());
    Ok(frames)
}

fn close_quietly(source: &mut VideoSource) {
    if let Err(e) = source.close() {
        warn!("Failed to close video source: {}", e);
    } else {
        debug!("Closed video source after {} frames", source.frames_read());
    }
}
