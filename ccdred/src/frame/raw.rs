use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::header::FrameHeader;
use crate::classify::{ImageRole, classify_image_type};

/// On-chip binning factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binning {
    pub x: u32,
    pub y: u32,
}

impl Default for Binning {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

/// An ingested raw exposure, identified by its file path.
///
/// The role is derived once from the header at construction and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    path: PathBuf,
    role: ImageRole,
    image_type: Option<String>,
    exposure_time: Option<f64>,
    observed_at: Option<DateTime<Utc>>,
    ccd_temp: Option<f64>,
    binning: Binning,
    target: Option<String>,
    filter: Option<String>,
    julian_date: Option<f64>,
}

impl RawFrame {
    pub fn from_header(path: impl Into<PathBuf>, header: &FrameHeader) -> Self {
        let image_type = header.image_type().map(str::to_string);
        let role = image_type
            .as_deref()
            .map_or(ImageRole::Unknown, classify_image_type);
        let (x, y) = header.binning();

        Self {
            path: path.into(),
            role,
            image_type,
            exposure_time: header.exposure_time(),
            observed_at: header.observed_at(),
            ccd_temp: header.ccd_temp(),
            binning: Binning { x, y },
            target: header.object().map(str::to_string),
            filter: header.filter().map(str::to_string),
            julian_date: header.julian_date(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component of the path, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn role(&self) -> ImageRole {
        self.role
    }

    pub fn image_type(&self) -> Option<&str> {
        self.image_type.as_deref()
    }

    pub fn exposure_time(&self) -> Option<f64> {
        self.exposure_time
    }

    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.observed_at
    }

    pub fn ccd_temp(&self) -> Option<f64> {
        self.ccd_temp
    }

    pub fn binning(&self) -> Binning {
        self.binning
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn julian_date(&self) -> Option<f64> {
        self.julian_date
    }
}
