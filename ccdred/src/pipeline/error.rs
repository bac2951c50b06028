use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::calibration::CalibrationError;
use crate::config::ConfigError;
use crate::frame::error::FrameIoError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Input directory '{0}' does not exist")]
    MissingInputDir(PathBuf),

    #[error("Failed to create output directory '{path}': {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to scan '{path}' for frames: {source}")]
    Discover {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move '{from}' to '{to}': {source}")]
    Ingest {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Calibration build failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Failed to write '{path}': {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: FrameIoError,
    },

    #[error("Provenance ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl PipelineError {
    /// Errors raised before any frame is touched.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingInputDir(_) | Self::CreateOutputDir { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_classification() {
        assert!(PipelineError::MissingInputDir("/nope".into()).is_setup());
        assert!(
            PipelineError::CreateOutputDir {
                path: "/ro/raw".into(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            }
            .is_setup()
        );
        assert!(
            !PipelineError::Discover {
                path: "/data".into(),
                source: io::Error::from(io::ErrorKind::Other),
            }
            .is_setup()
        );
        assert!(!PipelineError::Ledger(LedgerError::EmptyStack).is_setup());
    }

    #[test]
    fn test_missing_input_message() {
        assert_eq!(
            PipelineError::MissingInputDir("/data/night".into()).to_string(),
            "Input directory '/data/night' does not exist"
        );
    }
}
