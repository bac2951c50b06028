//! Frames: 2-D pixel arrays in physical (ADU) units plus their header.

pub mod error;
#[cfg(feature = "fits")]
mod fits;
pub mod header;
pub mod io;
mod memory;
mod raw;

#[cfg(feature = "fits")]
pub use fits::FitsFrameIo;
pub use memory::MemoryFrameIo;
pub use raw::{Binning, RawFrame};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use header::FrameHeader;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
}

impl ImageDimensions {
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0, "Width must be positive");
        assert!(height > 0, "Height must be positive");
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Two frames that had to share a shape did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Frame shape mismatch: expected {expected:?}, got {actual:?}")]
pub struct FrameShapeError {
    pub expected: ImageDimensions,
    pub actual: ImageDimensions,
}

/// A single-plane frame with f32 pixels in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub pixels: Vec<f32>,
    pub dimensions: ImageDimensions,
}

impl Frame {
    /// # Panics
    /// Panics if `pixels.len()` does not match `dimensions`.
    pub fn from_pixels(dimensions: ImageDimensions, pixels: Vec<f32>) -> Self {
        assert_eq!(
            pixels.len(),
            dimensions.pixel_count(),
            "Pixel count does not match dimensions {:?}",
            dimensions
        );
        Self {
            header: FrameHeader::default(),
            pixels,
            dimensions,
        }
    }

    pub fn filled(dimensions: ImageDimensions, value: f32) -> Self {
        Self::from_pixels(dimensions, vec![value; dimensions.pixel_count()])
    }

    pub fn with_header(mut self, header: FrameHeader) -> Self {
        self.header = header;
        self
    }

    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> f32 {
        debug_assert!(x < self.dimensions.width, "x coordinate out of bounds");
        debug_assert!(y < self.dimensions.height, "y coordinate out of bounds");
        self.pixels[y * self.dimensions.width + x]
    }

    /// Mean of all pixels, accumulated in f64.
    pub fn mean(&self) -> f64 {
        debug_assert!(!self.pixels.is_empty());
        let sum: f64 = self.pixels.iter().map(|&p| f64::from(p)).sum();
        sum / self.pixels.len() as f64
    }

    fn check_shape(&self, other: &Frame) -> Result<(), FrameShapeError> {
        if self.dimensions != other.dimensions {
            return Err(FrameShapeError {
                expected: self.dimensions,
                actual: other.dimensions,
            });
        }
        Ok(())
    }

    /// `self -= other * scale`, pixel by pixel.
    pub fn subtract_scaled(&mut self, other: &Frame, scale: f32) -> Result<(), FrameShapeError> {
        self.check_shape(other)?;
        for (d, s) in self.pixels.iter_mut().zip(other.pixels.iter()) {
            *d -= s * scale;
        }
        Ok(())
    }

    /// Divides by a normalized flat. Pixels where the flat is not above
    /// `f32::EPSILON` are left undivided; their count is returned.
    pub fn divide_by_flat(&mut self, flat: &Frame) -> Result<usize, FrameShapeError> {
        self.check_shape(flat)?;
        let mut skipped = 0;
        for (d, f) in self.pixels.iter_mut().zip(flat.pixels.iter()) {
            if *f > f32::EPSILON {
                *d /= f;
            } else {
                skipped += 1;
            }
        }
        Ok(skipped)
    }

    /// Multiplies every pixel by `factor`.
    pub fn scale(&mut self, factor: f32) {
        self.pixels.iter_mut().for_each(|p| *p *= factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        let frame = Frame::from_pixels(ImageDimensions::new(2, 2), vec![1.0, 2.0, 3.0, 6.0]);
        assert!((frame.mean() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_pixel_indexing_is_row_major() {
        let frame = Frame::from_pixels(ImageDimensions::new(3, 2), vec![0., 1., 2., 3., 4., 5.]);
        assert_eq!(frame.pixel(2, 0), 2.0);
        assert_eq!(frame.pixel(0, 1), 3.0);
    }

    #[test]
    #[should_panic(expected = "Pixel count does not match")]
    fn test_from_pixels_rejects_wrong_length() {
        Frame::from_pixels(ImageDimensions::new(2, 2), vec![0.0; 3]);
    }

    #[test]
    fn test_subtract_scaled() {
        let mut light = Frame::filled(ImageDimensions::new(2, 2), 100.0);
        let dark = Frame::filled(ImageDimensions::new(2, 2), 10.0);
        light.subtract_scaled(&dark, 3.0).unwrap();
        assert!(light.pixels.iter().all(|&v| (v - 70.0).abs() < 1e-6));
    }

    #[test]
    fn test_subtract_shape_mismatch() {
        let mut light = Frame::filled(ImageDimensions::new(2, 2), 100.0);
        let dark = Frame::filled(ImageDimensions::new(3, 2), 10.0);
        let err = light.subtract_scaled(&dark, 1.0).unwrap_err();
        assert_eq!(err.expected, ImageDimensions::new(2, 2));
        assert_eq!(err.actual, ImageDimensions::new(3, 2));
        // untouched on error
        assert!(light.pixels.iter().all(|&v| v == 100.0));
    }

    #[test]
    fn test_divide_by_flat_skips_dead_pixels() {
        let mut light = Frame::from_pixels(ImageDimensions::new(2, 1), vec![10.0, 10.0]);
        let flat = Frame::from_pixels(ImageDimensions::new(2, 1), vec![0.5, 0.0]);
        let skipped = light.divide_by_flat(&flat).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(light.pixels, vec![20.0, 10.0]);
    }
}
