use thiserror::Error;

use crate::classify::ImageRole;
use crate::frame::FrameShapeError;
use crate::frame::error::FrameIoError;

/// Why a single science frame could not be corrected.
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("Failed to read science frame: {0}")]
    Read(#[source] FrameIoError),

    #[error("Science frame has no exposure time, cannot match a dark master")]
    MissingExposure,

    #[error("No {role} master available")]
    NoCalibrationAvailable { role: ImageRole },

    #[error("Cannot scale a zero-second dark to a {target}s exposure")]
    ZeroDarkExposure { target: f64 },

    #[error("Master does not match science frame: {0}")]
    ShapeMismatch(#[from] FrameShapeError),
}
