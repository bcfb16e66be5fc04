//! Grayscale frames captured from the offscreen renderer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel dimensions of an offscreen render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels in a frame of this size
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
        }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single captured frame: one byte of luminance per pixel, rows top to
/// bottom.
///
/// Frames follow the fluoroscopic convention that unattenuated beam renders
/// white, so a fresh buffer starts out fully white (air everywhere).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    size: FrameSize,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Creates an all-white frame of the given size
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            pixels: vec![u8::MAX; size.pixel_count()],
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Raw luminance bytes, row-major from the top-left pixel
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Reads one pixel; `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        Some(self.pixels[(y * self.size.width + x) as usize])
    }

    /// Writes one pixel; silently ignores coordinates outside the frame
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u8) {
        if x >= self.size.width || y >= self.size.height {
            return;
        }
        self.pixels[(y * self.size.width + x) as usize] = value;
    }

    /// Mean luminance over the whole frame, for quick brightness checks
    pub fn mean_luminance(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.pixels.iter().map(|&p| p as u64).sum();
        sum as f64 / self.pixels.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_frame_is_white() {
        let frame = FrameBuffer::new(FrameSize::new(4, 3));

        assert_eq!(frame.pixels().len(), 12);
        assert!(frame.pixels().iter().all(|&p| p == 255));
        assert_eq!(frame.mean_luminance(), 255.0);
    }

    #[test]
    fn pixel_indexing_is_row_major() {
        let mut frame = FrameBuffer::new(FrameSize::new(4, 3));
        frame.set_pixel(1, 2, 7);

        // Row 2, column 1 lands at index 2 * 4 + 1 = 9
        assert_eq!(frame.pixels()[9], 7);
        assert_eq!(frame.pixel(1, 2), Some(7));
    }

    #[test]
    fn out_of_bounds_access_is_harmless() {
        let mut frame = FrameBuffer::new(FrameSize::new(2, 2));
        frame.set_pixel(5, 5, 0);

        assert_eq!(frame.pixel(5, 5), None);
        assert!(frame.pixels().iter().all(|&p| p == 255));
    }
}
