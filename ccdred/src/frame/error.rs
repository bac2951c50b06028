use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameIoError {
    #[cfg(feature = "fits")]
    #[error("FITS error on '{path}': {source}")]
    Fits {
        path: PathBuf,
        #[source]
        source: fitsio::errors::Error,
    },

    #[error("Failed to access file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error("Malformed frame '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_path() {
        let err = FrameIoError::NotFound {
            path: PathBuf::from("/night/raw/dark_001.fits"),
        };
        assert!(err.to_string().contains("dark_001.fits"));

        let err = FrameIoError::Malformed {
            path: PathBuf::from("cube.fits"),
            reason: "expected 2 axes, found 3".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cube.fits"));
        assert!(msg.contains("3"));
    }

    #[test]
    fn test_io_error_source_chain() {
        use std::error::Error as StdError;

        let err = FrameIoError::Io {
            path: PathBuf::from("/test"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
    }
}
