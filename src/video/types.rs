use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// A single decoded video frame
///
/// Wraps an RGB image buffer. Frames are never blended in place: the
/// compositor consumes a frame and hands back a [`CompositedFrame`].
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
    index: u64,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage, index: u64) -> Self {
        Self { buffer, index }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3], index: u64) -> Self {
        let buffer = ImageBuffer::from_fn(width, height, |_, _| Rgb(color));
        Self { buffer, index }
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>, index: u64) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer, index })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Position of this frame in the source, starting at zero
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    pub fn into_image(self) -> RgbImage {
        self.buffer
    }
}

/// The result of blending one [`Frame`] with the overlay
///
/// Held as RGBA while blending; [`CompositedFrame::write_rgb_into`] reduces it
/// to the RGB layout the encoder consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositedFrame {
    buffer: RgbaImage,
    index: u64,
}

impl CompositedFrame {
    pub fn new(buffer: RgbaImage, index: u64) -> Self {
        Self { buffer, index }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Get a pixel at the given coordinates (returns RGBA array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.buffer.get_pixel(x, y).0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.buffer
    }

    /// Whether every pixel has full alpha
    pub fn is_opaque(&self) -> bool {
        self.buffer.pixels().all(|Rgba(p)| p[3] == u8::MAX)
    }

    /// Drop the alpha channel, producing packed RGB bytes
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buffer.as_raw().len() / 4 * 3);
        self.write_rgb_into(&mut out);
        out
    }

    /// Replace the contents of `out` with the packed RGB bytes of this frame
    pub fn write_rgb_into(&self, out: &mut Vec<u8>) {
        out.clear();
        for px in self.buffer.as_raw().chunks_exact(4) {
            out.extend_from_slice(&px[..3]);
        }
    }

    /// Drop the alpha channel, producing an RGB image
    pub fn to_rgb_image(&self) -> RgbImage {
        let (width, height) = self.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let [r, g, b, _] = self.buffer.get_pixel(x, y).0;
            Rgb([r, g, b])
        })
    }
}

/// Output encoding parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    /// Output frame rate
    pub fps: u32,

    /// ffmpeg encoder name
    pub codec: String,

    /// Four-character codec tag written into the container
    pub fourcc: String,

    /// mpeg4 quantizer scale (1 = best, 31 = worst)
    pub quality: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            codec: "mpeg4".to_string(),
            fourcc: "mp4v".to_string(),
            quality: 3,
        }
    }
}

impl EncodeSettings {
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }
}

pub const DEFAULT_FPS: u32 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_bytes_checks_length() {
        assert!(Frame::from_rgb_bytes(2, 2, vec![0; 12], 0).is_some());
        assert!(Frame::from_rgb_bytes(2, 2, vec![0; 11], 0).is_none());
    }

    #[test]
    fn test_alpha_reduction() {
        let buffer = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([10, 20, 30, 255])
            } else {
                Rgba([40, 50, 60, 255])
            }
        });
        let frame = CompositedFrame::new(buffer, 7);

        assert!(frame.is_opaque());
        assert_eq!(frame.to_rgb_bytes(), vec![10, 20, 30, 40, 50, 60]);
        assert_eq!(frame.to_rgb_image().get_pixel(1, 0).0, [40, 50, 60]);
        assert_eq!(frame.index(), 7);
    }

    #[test]
    fn test_write_rgb_into_reuses_buffer() {
        let frame = CompositedFrame::new(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])), 0);
        let mut scratch = vec![9u8; 40];

        frame.write_rgb_into(&mut scratch);
        assert_eq!(scratch, [1, 2, 3].repeat(4));
        assert_eq!(scratch, frame.to_rgb_bytes());
    }

    #[test]
    fn test_default_encode_settings() {
        let settings = EncodeSettings::default();
        assert_eq!(settings.fps, 30);
        assert_eq!(settings.fourcc, "mp4v");
        assert_eq!(settings.with_fps(24).fps, 24);
    }
}
