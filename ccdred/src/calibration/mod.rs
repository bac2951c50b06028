//! Master calibration frame synthesis.
//!
//! Produces one master bias, one master dark per distinct dark exposure time
//! and one normalized master flat from classified raw frames. Flats are
//! corrected before combination with the dark master closest to the flat
//! exposure (scaled to it) or, when no darks exist, with the bias master.

pub mod error;

pub use error::CalibrationError;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;

use crate::classify::{ClassifiedFrames, ImageRole};
use crate::combine::{ClipStats, CombinedFrame, SigmaClipConfig, combine};
use crate::exposure::{ExposureMap, NoCalibrationAvailable, group_darks};
use crate::frame::io::FrameIo;
use crate::frame::{Frame, RawFrame};
use crate::progress::{PipelineStep, ProgressCallback, report_progress};

/// A combined bias, dark or flat frame together with its lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterCalibration {
    role: ImageRole,
    exposure_time: Option<f64>,
    frame: Frame,
    mask: Vec<bool>,
    created_at: DateTime<Utc>,
    lineage: Vec<PathBuf>,
    stats: ClipStats,
}

impl MasterCalibration {
    /// Wraps a combination result. `exposure_time` is kept only for darks.
    pub fn new(
        role: ImageRole,
        exposure_time: Option<f64>,
        combined: CombinedFrame,
        lineage: Vec<PathBuf>,
    ) -> Result<Self, CalibrationError> {
        if lineage.is_empty() {
            return Err(CalibrationError::EmptyLineage { role });
        }
        let exposure_time = match role {
            ImageRole::Dark => {
                Some(exposure_time.ok_or(CalibrationError::MissingExposure { role })?)
            }
            _ => None,
        };

        Ok(Self {
            role,
            exposure_time,
            frame: combined.frame,
            mask: combined.mask,
            created_at: Utc::now(),
            lineage,
            stats: combined.stats,
        })
    }

    pub fn role(&self) -> ImageRole {
        self.role
    }

    pub fn exposure_time(&self) -> Option<f64> {
        self.exposure_time
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Raw frames that contributed, in combination order. Never empty.
    pub fn lineage(&self) -> &[PathBuf] {
        &self.lineage
    }

    pub fn stats(&self) -> &ClipStats {
        &self.stats
    }

    /// Output name without extension: `bias_master`, `dark_master_<t>s`, `flat_master`.
    pub fn file_stem(&self) -> String {
        match (self.role, self.exposure_time) {
            (ImageRole::Dark, Some(t)) => format!("dark_master_{}s", format_exposure(t)),
            (role, _) => format!("{role}_master"),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.fits", self.file_stem())
    }
}

/// Exposure time in seconds with millisecond precision and no trailing zeros.
fn format_exposure(seconds: f64) -> String {
    let text = format!("{seconds:.3}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// The set of masters built for one run.
#[derive(Debug, Clone, Default)]
pub struct CalibrationMasters {
    pub bias: Option<MasterCalibration>,
    /// One master per distinct dark exposure time.
    pub darks: ExposureMap<MasterCalibration>,
    pub flat: Option<MasterCalibration>,
}

impl CalibrationMasters {
    /// All masters: bias, darks by ascending exposure, flat.
    pub fn iter(&self) -> impl Iterator<Item = &MasterCalibration> {
        self.bias
            .iter()
            .chain(self.darks.values())
            .chain(self.flat.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.bias.is_none() && self.darks.is_empty() && self.flat.is_none()
    }

    pub fn closest_dark(&self, exposure: f64) -> Result<&MasterCalibration, NoCalibrationAvailable> {
        self.darks.closest(exposure).map(|(_, master)| master)
    }
}

/// What is subtracted from each flat before combination.
#[derive(Debug, Clone, Copy)]
pub enum FlatCorrection<'a> {
    /// Exposure-scaled dark master.
    Dark(&'a MasterCalibration),
    Bias(&'a MasterCalibration),
    None,
}

impl<'a> FlatCorrection<'a> {
    /// Supplying both a dark and a bias master is a caller error.
    pub fn from_masters(
        dark: Option<&'a MasterCalibration>,
        bias: Option<&'a MasterCalibration>,
    ) -> Result<Self, CalibrationError> {
        match (dark, bias) {
            (Some(_), Some(_)) => Err(CalibrationError::AmbiguousFlatCorrection),
            (Some(dark), None) => Ok(Self::Dark(dark)),
            (None, Some(bias)) => Ok(Self::Bias(bias)),
            (None, None) => Ok(Self::None),
        }
    }

    fn apply(&self, flat: &mut Frame, flat_exposure: Option<f64>) -> Result<(), CalibrationError> {
        let (master, scale) = match self {
            Self::None => return Ok(()),
            Self::Bias(bias) => (*bias, 1.0),
            Self::Dark(dark) => {
                let target = flat_exposure.ok_or(CalibrationError::MissingExposure {
                    role: ImageRole::Flat,
                })?;
                let dark_exposure = dark.exposure_time().unwrap_or_default();
                let scale = exposure_scale(target, dark_exposure)
                    .ok_or(CalibrationError::ZeroDarkExposure { target })?;
                (*dark, scale)
            }
        };
        flat.subtract_scaled(master.frame(), scale)
            .map_err(|source| CalibrationError::ShapeMismatch {
                role: ImageRole::Flat,
                source,
            })
    }
}

/// Factor that scales a dark of `dark_exposure` seconds to `target` seconds.
///
/// `None` when a zero-second dark would have to be scaled to a non-zero target.
pub fn exposure_scale(target: f64, dark_exposure: f64) -> Option<f32> {
    if target == dark_exposure {
        Some(1.0)
    } else if dark_exposure > 0.0 {
        Some((target / dark_exposure) as f32)
    } else {
        None
    }
}

/// Builds a normalized master flat from already loaded flat frames.
///
/// Each flat is corrected individually (scaled to its own exposure, falling
/// back to the first known flat exposure), then the corrected flats are
/// combined and divided by their mean.
pub fn build_flat_master(
    flats: &[(PathBuf, Frame)],
    correction: FlatCorrection<'_>,
    clip: &SigmaClipConfig,
) -> Result<MasterCalibration, CalibrationError> {
    let reference_exposure = flats.iter().find_map(|(_, f)| f.header.exposure_time());

    let mut corrected = Vec::with_capacity(flats.len());
    for (_, flat) in flats {
        let mut flat = flat.clone();
        let exposure = flat.header.exposure_time().or(reference_exposure);
        correction.apply(&mut flat, exposure)?;
        corrected.push(flat);
    }

    let mut combined = combine(&corrected, clip).map_err(|source| CalibrationError::Combine {
        role: ImageRole::Flat,
        source,
    })?;

    let mean = combined.frame.mean();
    if !(mean.is_finite() && mean > 0.0) {
        return Err(CalibrationError::DegenerateFlat { mean });
    }
    combined.frame.scale((1.0 / mean) as f32);

    let correction_name = match correction {
        FlatCorrection::Dark(dark) => dark.file_stem(),
        FlatCorrection::Bias(bias) => bias.file_stem(),
        FlatCorrection::None => "none".to_string(),
    };
    tracing::info!(
        frames = flats.len(),
        correction = %correction_name,
        mean_before_normalization = mean,
        "Built flat master"
    );

    let lineage = flats.iter().map(|(path, _)| path.clone()).collect();
    MasterCalibration::new(ImageRole::Flat, None, combined, lineage)
}

/// Builds master calibration frames, reading raw frames through a [`FrameIo`].
pub struct CalibrationBuilder<'a> {
    io: &'a dyn FrameIo,
    clip: SigmaClipConfig,
    progress: ProgressCallback,
}

impl<'a> CalibrationBuilder<'a> {
    pub fn new(io: &'a dyn FrameIo) -> Self {
        Self {
            io,
            clip: SigmaClipConfig::default(),
            progress: ProgressCallback::default(),
        }
    }

    pub fn with_clip_config(mut self, clip: SigmaClipConfig) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Builds every master the classified frames allow.
    ///
    /// Roles without raw frames produce no master.
    pub fn build(&self, frames: &ClassifiedFrames) -> Result<CalibrationMasters, CalibrationError> {
        let dark_groups = group_darks(&frames.dark);
        let total_masters = usize::from(!frames.bias.is_empty())
            + dark_groups.len()
            + usize::from(!frames.flat.is_empty());
        let mut built = 0;
        report_progress(&self.progress, built, total_masters, PipelineStep::BuildingMasters);

        let bias = if frames.bias.is_empty() {
            tracing::info!("No bias frames, skipping bias master");
            None
        } else {
            let loaded = self.load_frames(&frames.bias)?;
            let master = self.combine_master(ImageRole::Bias, None, &loaded)?;
            built += 1;
            report_progress(&self.progress, built, total_masters, PipelineStep::BuildingMasters);
            Some(master)
        };

        let mut darks = ExposureMap::new();
        for (exposure, group) in dark_groups.iter() {
            let loaded = self.load_frames(group)?;
            let master = self.combine_master(ImageRole::Dark, Some(exposure), &loaded)?;
            darks.insert(exposure, master);
            built += 1;
            report_progress(&self.progress, built, total_masters, PipelineStep::BuildingMasters);
        }

        let flat = if frames.flat.is_empty() {
            tracing::info!("No flat frames, skipping flat master");
            None
        } else {
            let loaded = self.load_frames(&frames.flat)?;
            let flat_exposure = loaded.iter().find_map(|(_, f)| f.header.exposure_time());

            // dark takes precedence over bias
            let correction = if darks.is_empty() {
                FlatCorrection::from_masters(None, bias.as_ref())?
            } else {
                let exposure = flat_exposure.ok_or(CalibrationError::MissingExposure {
                    role: ImageRole::Flat,
                })?;
                let (_, dark) = darks
                    .closest(exposure)
                    .map_err(|_| CalibrationError::MissingExposure {
                        role: ImageRole::Dark,
                    })?;
                FlatCorrection::from_masters(Some(dark), None)?
            };

            let master = build_flat_master(&loaded, correction, &self.clip)?;
            built += 1;
            report_progress(&self.progress, built, total_masters, PipelineStep::BuildingMasters);
            Some(master)
        };

        Ok(CalibrationMasters { bias, darks, flat })
    }

    fn combine_master(
        &self,
        role: ImageRole,
        exposure_time: Option<f64>,
        loaded: &[(PathBuf, Frame)],
    ) -> Result<MasterCalibration, CalibrationError> {
        let frames: Vec<Frame> = loaded.iter().map(|(_, f)| f.clone()).collect();
        let combined =
            combine(&frames, &self.clip).map_err(|source| CalibrationError::Combine { role, source })?;
        let lineage = loaded.iter().map(|(path, _)| path.clone()).collect();
        let master = MasterCalibration::new(role, exposure_time, combined, lineage)?;

        tracing::info!(
            master = %master.file_stem(),
            frames = loaded.len(),
            "Built master calibration frame"
        );
        Ok(master)
    }

    /// Reads frames in parallel, keeping input order.
    fn load_frames(&self, raw: &[RawFrame]) -> Result<Vec<(PathBuf, Frame)>, CalibrationError> {
        let total = raw.len();
        let done = AtomicUsize::new(0);

        raw.par_iter()
            .map(|frame| -> Result<(PathBuf, Frame), CalibrationError> {
                let loaded = read_frame(self.io, frame.path())?;
                let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                report_progress(&self.progress, current, total, PipelineStep::LoadingCalibration);
                Ok((frame.path().to_path_buf(), loaded))
            })
            .collect()
    }
}

fn read_frame(io: &dyn FrameIo, path: &Path) -> Result<Frame, CalibrationError> {
    io.read(path).map_err(|source| CalibrationError::FrameRead {
        path: path.to_path_buf(),
        source,
    })
}
