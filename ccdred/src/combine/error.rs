//! Error types for frame combination.

use thiserror::Error;

use crate::frame::ImageDimensions;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CombineError {
    #[error("No frames provided for combination")]
    EmptyFrameList,

    #[error("Dimension mismatch for frame {index}: expected {expected:?}, got {actual:?}")]
    InconsistentShape {
        index: usize,
        expected: ImageDimensions,
        actual: ImageDimensions,
    },

    #[error("Invalid sigma clip configuration: {0}")]
    InvalidClipConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_list_message() {
        assert_eq!(
            CombineError::EmptyFrameList.to_string(),
            "No frames provided for combination"
        );
    }

    #[test]
    fn test_inconsistent_shape_message() {
        let err = CombineError::InconsistentShape {
            index: 2,
            expected: ImageDimensions::new(4, 4),
            actual: ImageDimensions::new(4, 3),
        };
        let msg = err.to_string();
        assert!(msg.contains("frame 2"));
        assert!(msg.contains("height: 3"));
    }
}
