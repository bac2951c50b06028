//! Sigma-clipped mean combination of same-role frames.
//!
//! Each pixel is combined independently: the stack of values at that pixel is
//! clipped iteratively around its median, using 1.4826 × MAD as the scale
//! (falling back to the standard deviation about the median when the MAD is
//! zero), and the surviving values are averaged.

pub mod error;

pub use error::CombineError;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::frame::header::keys;
use crate::math::{self, mad_f32_with_scratch, mad_to_sigma};

/// Iterative asymmetric sigma clipping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaClipConfig {
    /// Threshold in sigmas for values below the median.
    pub low_sigma: f32,
    /// Threshold in sigmas for values above the median.
    pub high_sigma: f32,
    pub max_iterations: u32,
}

impl Default for SigmaClipConfig {
    fn default() -> Self {
        Self {
            low_sigma: 3.0,
            high_sigma: 3.0,
            max_iterations: 5,
        }
    }
}

impl SigmaClipConfig {
    pub fn new(sigma: f32, max_iterations: u32) -> Self {
        Self::new_asymmetric(sigma, sigma, max_iterations)
    }

    pub fn new_asymmetric(low_sigma: f32, high_sigma: f32, max_iterations: u32) -> Self {
        assert!(low_sigma > 0.0, "Low sigma must be positive");
        assert!(high_sigma > 0.0, "High sigma must be positive");
        assert!(max_iterations > 0, "Max iterations must be at least 1");
        Self {
            low_sigma,
            high_sigma,
            max_iterations,
        }
    }

    /// Checks values that arrive through deserialization or the CLI.
    pub fn validate(&self) -> Result<(), CombineError> {
        if !(self.low_sigma.is_finite() && self.low_sigma > 0.0) {
            return Err(CombineError::InvalidClipConfig(format!(
                "low_sigma must be positive, got {}",
                self.low_sigma
            )));
        }
        if !(self.high_sigma.is_finite() && self.high_sigma > 0.0) {
            return Err(CombineError::InvalidClipConfig(format!(
                "high_sigma must be positive, got {}",
                self.high_sigma
            )));
        }
        if self.max_iterations == 0 {
            return Err(CombineError::InvalidClipConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Partitions `values` so that `values[..n]` are the survivors and returns `n`.
    ///
    /// Returns 0 only when every value was rejected.
    fn clip(&self, values: &mut [f32], scratch: &mut Vec<f32>) -> usize {
        let mut len = values.len();
        if len <= 2 {
            return len;
        }

        for _ in 0..self.max_iterations {
            if len <= 2 {
                break;
            }

            let center = math::median_f32_mut(&mut values[..len]);
            let mut sigma = mad_to_sigma(mad_f32_with_scratch(&values[..len], center, scratch));
            if sigma < f32::EPSILON {
                sigma = math::std_about(&values[..len], center);
            }
            if sigma < f32::EPSILON {
                break;
            }

            let low_threshold = self.low_sigma * sigma;
            let high_threshold = self.high_sigma * sigma;

            let mut write_idx = 0;
            for read_idx in 0..len {
                let diff = values[read_idx] - center;
                let keep = if diff < 0.0 {
                    -diff <= low_threshold
                } else {
                    diff <= high_threshold
                };
                if keep {
                    values[write_idx] = values[read_idx];
                    write_idx += 1;
                }
            }

            if write_idx == len {
                break;
            }
            len = write_idx;
            if len == 0 {
                break;
            }
        }

        len
    }
}

/// Rejection counts for one combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipStats {
    pub frames: usize,
    pub values_seen: usize,
    pub values_rejected: usize,
    /// Pixels where no value survived clipping.
    pub masked_pixels: usize,
}

impl ClipStats {
    pub fn rejected_fraction(&self) -> f64 {
        if self.values_seen == 0 {
            0.0
        } else {
            self.values_rejected as f64 / self.values_seen as f64
        }
    }
}

/// Result of a combination: the master pixels plus a per-pixel mask.
///
/// `mask[i]` is true where every value at pixel `i` was rejected; such a
/// pixel holds the median of all its values instead of a clipped mean.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedFrame {
    pub frame: Frame,
    pub mask: Vec<bool>,
    pub stats: ClipStats,
}

struct PixelResult {
    value: f32,
    rejected: usize,
    masked: bool,
}

fn combine_pixel(
    frames: &[Frame],
    idx: usize,
    config: &SigmaClipConfig,
    values: &mut Vec<f32>,
    scratch: &mut Vec<f32>,
) -> PixelResult {
    values.clear();
    values.extend(frames.iter().map(|f| f.pixels[idx]));
    let n = values.len();

    let survivors = config.clip(values, scratch);
    if survivors == 0 {
        values.clear();
        values.extend(frames.iter().map(|f| f.pixels[idx]));
        return PixelResult {
            value: math::median_f32_mut(values),
            rejected: n,
            masked: true,
        };
    }

    PixelResult {
        value: math::mean_f32(&values[..survivors]),
        rejected: n - survivors,
        masked: false,
    }
}

/// Combines same-shape frames into one sigma-clipped mean frame.
///
/// The output header is copied from the first frame with `NCOMBINE` set.
pub fn combine(frames: &[Frame], config: &SigmaClipConfig) -> Result<CombinedFrame, CombineError> {
    config.validate()?;
    let first = frames.first().ok_or(CombineError::EmptyFrameList)?;
    let dimensions = first.dimensions;

    for (index, frame) in frames.iter().enumerate().skip(1) {
        if frame.dimensions != dimensions {
            return Err(CombineError::InconsistentShape {
                index,
                expected: dimensions,
                actual: frame.dimensions,
            });
        }
    }

    let results: Vec<PixelResult> = (0..dimensions.pixel_count())
        .into_par_iter()
        .map_init(
            || (Vec::with_capacity(frames.len()), Vec::with_capacity(frames.len())),
            |(values, scratch), idx| combine_pixel(frames, idx, config, values, scratch),
        )
        .collect();

    let mut stats = ClipStats {
        frames: frames.len(),
        values_seen: frames.len() * dimensions.pixel_count(),
        ..ClipStats::default()
    };
    let mut pixels = Vec::with_capacity(results.len());
    let mut mask = Vec::with_capacity(results.len());
    for result in results {
        stats.values_rejected += result.rejected;
        stats.masked_pixels += usize::from(result.masked);
        pixels.push(result.value);
        mask.push(result.masked);
    }

    tracing::info!(
        frames = stats.frames,
        width = dimensions.width,
        height = dimensions.height,
        rejected = stats.values_rejected,
        rejected_fraction = stats.rejected_fraction(),
        masked_pixels = stats.masked_pixels,
        "Combined frames with sigma clipping"
    );

    let header = first
        .header
        .clone()
        .with(keys::NCOMBINE, frames.len() as i64);

    Ok(CombinedFrame {
        frame: Frame::from_pixels(dimensions, pixels).with_header(header),
        mask,
        stats,
    })
}
