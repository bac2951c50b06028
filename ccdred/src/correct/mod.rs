//! Science frame correction: dark (or bias) subtraction then flat division.
//!
//! Every science frame is corrected independently. A failure never aborts the
//! batch; the frame is emitted uncorrected and tagged as failed instead.

pub mod error;

pub use error::CorrectionError;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use common::parallel::par_map_limited;

use crate::calibration::{CalibrationMasters, exposure_scale};
use crate::classify::ImageRole;
use crate::frame::io::FrameIo;
use crate::frame::{Frame, RawFrame};
use crate::progress::{PipelineStep, ProgressCallback, report_progress};

pub const CORRECTED_PREFIX: &str = "preprocessed_";
pub const FAILED_PREFIX: &str = "failed_";

/// What was subtracted before flat division.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Subtracted {
    Dark { exposure: f64, scale: f32 },
    Bias,
}

/// Outcome of correcting one science frame.
#[derive(Debug)]
pub enum CorrectionStatus {
    Corrected {
        subtracted: Subtracted,
        /// Pixels left undivided because the flat was not above epsilon.
        undivided_pixels: usize,
    },
    Failed(CorrectionError),
}

/// One output per science input.
#[derive(Debug)]
pub struct ScienceOutput {
    pub source: PathBuf,
    /// `preprocessed_<name>` on success, `failed_<name>` otherwise.
    pub output_name: String,
    /// Corrected frame, or the uncorrected input on failure. `None` only when
    /// the input could not be read.
    pub frame: Option<Frame>,
    pub status: CorrectionStatus,
}

impl ScienceOutput {
    pub fn is_corrected(&self) -> bool {
        matches!(self.status, CorrectionStatus::Corrected { .. })
    }

    pub fn error(&self) -> Option<&CorrectionError> {
        match &self.status {
            CorrectionStatus::Failed(err) => Some(err),
            CorrectionStatus::Corrected { .. } => None,
        }
    }
}

pub fn output_name(source: &Path, corrected: bool) -> String {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = if corrected { CORRECTED_PREFIX } else { FAILED_PREFIX };
    format!("{prefix}{name}")
}

/// Applies built masters to science frames.
pub struct ScienceCorrector<'a> {
    masters: &'a CalibrationMasters,
    io: &'a dyn FrameIo,
    max_concurrent: usize,
    progress: ProgressCallback,
}

impl<'a> ScienceCorrector<'a> {
    pub fn new(masters: &'a CalibrationMasters, io: &'a dyn FrameIo) -> Self {
        Self {
            masters,
            io,
            max_concurrent: 4,
            progress: ProgressCallback::default(),
        }
    }

    /// # Panics
    /// Panics if `max_concurrent` is 0.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be > 0");
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Corrects `frame` in place.
    ///
    /// On error the frame may be partially modified; callers keep their own copy.
    pub fn apply(
        &self,
        frame: &mut Frame,
        exposure: Option<f64>,
    ) -> Result<CorrectionStatus, CorrectionError> {
        let flat = self
            .masters
            .flat
            .as_ref()
            .ok_or(CorrectionError::NoCalibrationAvailable {
                role: ImageRole::Flat,
            })?;

        let subtracted = if self.masters.darks.is_empty() {
            let bias = self
                .masters
                .bias
                .as_ref()
                .ok_or(CorrectionError::NoCalibrationAvailable {
                    role: ImageRole::Dark,
                })?;
            frame.subtract_scaled(bias.frame(), 1.0)?;
            Subtracted::Bias
        } else {
            let target = exposure.ok_or(CorrectionError::MissingExposure)?;
            let dark = self
                .masters
                .closest_dark(target)
                .map_err(|_| CorrectionError::NoCalibrationAvailable {
                    role: ImageRole::Dark,
                })?;
            let dark_exposure = dark.exposure_time().unwrap_or_default();
            let scale = exposure_scale(target, dark_exposure)
                .ok_or(CorrectionError::ZeroDarkExposure { target })?;
            frame.subtract_scaled(dark.frame(), scale)?;
            Subtracted::Dark {
                exposure: dark_exposure,
                scale,
            }
        };

        let undivided_pixels = frame.divide_by_flat(flat.frame())?;

        Ok(CorrectionStatus::Corrected {
            subtracted,
            undivided_pixels,
        })
    }

    /// Reads and corrects one science frame. Never fails; errors end up in the status.
    pub fn correct_frame(&self, raw: &RawFrame) -> ScienceOutput {
        let original = match self.io.read(raw.path()) {
            Ok(frame) => frame,
            Err(err) => return self.failed(raw, None, CorrectionError::Read(err)),
        };

        let exposure = raw
            .exposure_time()
            .or_else(|| original.header.exposure_time());
        let mut corrected = original.clone();

        match self.apply(&mut corrected, exposure) {
            Ok(status) => {
                if let CorrectionStatus::Corrected {
                    subtracted,
                    undivided_pixels,
                } = &status
                {
                    tracing::debug!(
                        path = %raw.path().display(),
                        ?subtracted,
                        undivided_pixels,
                        "Corrected science frame"
                    );
                }
                ScienceOutput {
                    source: raw.path().to_path_buf(),
                    output_name: output_name(raw.path(), true),
                    frame: Some(corrected),
                    status,
                }
            }
            Err(err) => self.failed(raw, Some(original), err),
        }
    }

    fn failed(&self, raw: &RawFrame, frame: Option<Frame>, err: CorrectionError) -> ScienceOutput {
        tracing::warn!(
            path = %raw.path().display(),
            error = %err,
            "Science correction failed, emitting uncorrected frame"
        );
        ScienceOutput {
            source: raw.path().to_path_buf(),
            output_name: output_name(raw.path(), false),
            frame,
            status: CorrectionStatus::Failed(err),
        }
    }

    /// Corrects frames in parallel; output order matches input order.
    pub fn correct_all(&self, frames: &[RawFrame]) -> Vec<ScienceOutput> {
        let total = frames.len();
        let done = AtomicUsize::new(0);
        report_progress(&self.progress, 0, total, PipelineStep::CorrectingScience);

        let outputs = par_map_limited(frames, self.max_concurrent, |raw| {
            let output = self.correct_frame(raw);
            let current = done.fetch_add(1, Ordering::Relaxed) + 1;
            report_progress(&self.progress, current, total, PipelineStep::CorrectingScience);
            output
        });

        let failed = outputs.iter().filter(|o| !o.is_corrected()).count();
        tracing::info!(
            total,
            corrected = total - failed,
            failed,
            "Science correction finished"
        );
        outputs
    }
}
