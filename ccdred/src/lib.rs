//! ccdred - nightly CCD reduction.
//!
//! Takes a directory of raw frames from one observing night and:
//! - moves them into a `raw/` area and classifies them by `IMAGETYP`
//! - builds sigma-clipped bias, per-exposure dark and normalized flat masters
//! - corrects every science frame with the closest dark (or the bias) and the flat
//! - records every frame's stage history and each master's lineage in a
//!   provenance ledger
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ccdred::{FitsFrameIo, Pipeline, RunConfig};
//!
//! let summary = Pipeline::new(RunConfig::new("/data/2015-10-27"), &FitsFrameIo::new()).run()?;
//! println!("{} corrected, {} failed", summary.corrected, summary.failed);
//! ```

pub mod calibration;
pub mod classify;
pub mod combine;
pub mod config;
pub mod correct;
pub mod exposure;
pub mod frame;
pub mod ledger;
pub(crate) mod math;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Frames and I/O
// ============================================================================

#[cfg(feature = "fits")]
pub use frame::FitsFrameIo;
pub use frame::error::FrameIoError;
pub use frame::header::{FrameHeader, HeaderValue};
pub use frame::io::FrameIo;
pub use frame::{Frame, ImageDimensions, MemoryFrameIo, RawFrame};

// ============================================================================
// Classification and combination
// ============================================================================

pub use classify::{ClassifiedFrames, ImageRole, classify, classify_image_type};
pub use combine::{CombineError, CombinedFrame, SigmaClipConfig, combine};
pub use exposure::{ExposureMap, NoCalibrationAvailable};

// ============================================================================
// Calibration and correction
// ============================================================================

pub use calibration::{CalibrationBuilder, CalibrationError, CalibrationMasters, MasterCalibration};
pub use correct::{CorrectionError, CorrectionStatus, ScienceCorrector, ScienceOutput};

// ============================================================================
// Provenance and pipeline
// ============================================================================

pub use config::{ConfigError, RunConfig};
pub use ledger::{LedgerError, ProvenanceLedger, Subject};
pub use pipeline::{Pipeline, PipelineError, RunSummary};
pub use progress::{PipelineProgress, PipelineStep, ProgressCallback};
