//! Error types for building master calibration frames.

use std::path::PathBuf;

use thiserror::Error;

use crate::classify::ImageRole;
use crate::combine::CombineError;
use crate::frame::FrameShapeError;
use crate::frame::error::FrameIoError;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Failed to combine {role} frames: {source}")]
    Combine {
        role: ImageRole,
        #[source]
        source: CombineError,
    },

    #[error("Failed to read calibration frame '{path}': {source}")]
    FrameRead {
        path: PathBuf,
        #[source]
        source: FrameIoError,
    },

    #[error("Flat correction was given both a dark and a bias master")]
    AmbiguousFlatCorrection,

    #[error("Combined flat has non-positive mean {mean}, cannot normalize")]
    DegenerateFlat { mean: f64 },

    #[error("No usable exposure time on {role} frames")]
    MissingExposure { role: ImageRole },

    #[error("Shape mismatch while correcting {role} frames: {source}")]
    ShapeMismatch {
        role: ImageRole,
        #[source]
        source: FrameShapeError,
    },

    #[error("Cannot scale a zero-second dark to a {target}s exposure")]
    ZeroDarkExposure { target: f64 },

    #[error("Master {role} has no contributing frames")]
    EmptyLineage { role: ImageRole },
}
