//! Frame classification by declared image type.
//!
//! Classification is driven by [`CLASSIFICATION_TABLE`], an ordered list of
//! predicates over the lowercased `IMAGETYP` value. The first matching rule
//! wins; a type matching none of them is [`ImageRole::Unknown`].

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::frame::RawFrame;

/// Role of a frame in the reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    /// Zero-second readout frames.
    Bias,
    /// Shutter-closed thermal frames.
    Dark,
    /// Uniformly illuminated response frames.
    Flat,
    /// Science exposures.
    Light,
    Unknown,
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub role: ImageRole,
    /// Receives the trimmed, lowercased image type.
    pub matches: fn(&str) -> bool,
}

fn is_dark(image_type: &str) -> bool {
    image_type.contains("dark")
}

fn is_bias(image_type: &str) -> bool {
    image_type.contains("zero") || image_type.contains("bias")
}

fn is_flat(image_type: &str) -> bool {
    image_type.contains("flat")
}

fn is_light(image_type: &str) -> bool {
    image_type.contains("light") || image_type == "object"
}

/// Rules in priority order.
pub const CLASSIFICATION_TABLE: &[ClassificationRule] = &[
    ClassificationRule {
        role: ImageRole::Dark,
        matches: is_dark,
    },
    ClassificationRule {
        role: ImageRole::Bias,
        matches: is_bias,
    },
    ClassificationRule {
        role: ImageRole::Flat,
        matches: is_flat,
    },
    ClassificationRule {
        role: ImageRole::Light,
        matches: is_light,
    },
];

/// Classifies a declared image type string against [`CLASSIFICATION_TABLE`].
pub fn classify_image_type(image_type: &str) -> ImageRole {
    let normalized = image_type.trim().to_lowercase();
    CLASSIFICATION_TABLE
        .iter()
        .find(|rule| (rule.matches)(&normalized))
        .map_or(ImageRole::Unknown, |rule| rule.role)
}

/// Frames partitioned by role. Each input frame lands in exactly one bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedFrames {
    pub bias: Vec<RawFrame>,
    pub dark: Vec<RawFrame>,
    pub flat: Vec<RawFrame>,
    pub science: Vec<RawFrame>,
    pub unknown: Vec<RawFrame>,
}

impl ClassifiedFrames {
    pub fn by_role(&self, role: ImageRole) -> &[RawFrame] {
        match role {
            ImageRole::Bias => &self.bias,
            ImageRole::Dark => &self.dark,
            ImageRole::Flat => &self.flat,
            ImageRole::Light => &self.science,
            ImageRole::Unknown => &self.unknown,
        }
    }

    /// Calibration frames (bias, dark, flat) in that order.
    pub fn calibration_frames(&self) -> impl Iterator<Item = &RawFrame> {
        self.bias.iter().chain(&self.dark).chain(&self.flat)
    }

    pub fn total(&self) -> usize {
        self.bias.len() + self.dark.len() + self.flat.len() + self.science.len() + self.unknown.len()
    }
}

/// Partitions frames into role buckets, preserving input order within each bucket.
///
/// Unknown frames are logged and kept aside; they are never fatal.
pub fn classify<I>(frames: I) -> ClassifiedFrames
where
    I: IntoIterator<Item = RawFrame>,
{
    let mut classified = ClassifiedFrames::default();

    for frame in frames {
        let bucket = match frame.role() {
            ImageRole::Bias => &mut classified.bias,
            ImageRole::Dark => &mut classified.dark,
            ImageRole::Flat => &mut classified.flat,
            ImageRole::Light => &mut classified.science,
            ImageRole::Unknown => {
                tracing::warn!(
                    path = %frame.path().display(),
                    image_type = frame.image_type().unwrap_or("<missing>"),
                    "Unrecognized image type, frame excluded from reduction"
                );
                &mut classified.unknown
            }
        };
        bucket.push(frame);
    }

    tracing::info!(
        bias = classified.bias.len(),
        dark = classified.dark.len(),
        flat = classified.flat.len(),
        science = classified.science.len(),
        unknown = classified.unknown.len(),
        "Classified frames"
    );

    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::header::FrameHeader;

    fn raw(name: &str, image_type: &str) -> RawFrame {
        RawFrame::from_header(name, &FrameHeader::new().with("IMAGETYP", image_type))
    }

    #[test]
    fn test_common_image_types() {
        assert_eq!(classify_image_type("Dark Frame"), ImageRole::Dark);
        assert_eq!(classify_image_type("BIAS"), ImageRole::Bias);
        assert_eq!(classify_image_type("zero"), ImageRole::Bias);
        assert_eq!(classify_image_type("Flat Field"), ImageRole::Flat);
        assert_eq!(classify_image_type("LIGHT"), ImageRole::Light);
        assert_eq!(classify_image_type("Object"), ImageRole::Light);
        assert_eq!(classify_image_type(" object "), ImageRole::Light);
    }

    #[test]
    fn test_object_must_match_exactly() {
        assert_eq!(classify_image_type("object frame"), ImageRole::Unknown);
        assert_eq!(classify_image_type("focus"), ImageRole::Unknown);
        assert_eq!(classify_image_type(""), ImageRole::Unknown);
    }

    #[test]
    fn test_first_rule_wins() {
        // dark is checked before flat and light
        assert_eq!(classify_image_type("dark flat"), ImageRole::Dark);
        assert_eq!(classify_image_type("flat light"), ImageRole::Flat);
        assert_eq!(classify_image_type("bias flat"), ImageRole::Bias);
    }

    #[test]
    fn test_table_order() {
        let roles: Vec<ImageRole> = CLASSIFICATION_TABLE.iter().map(|r| r.role).collect();
        assert_eq!(
            roles,
            vec![ImageRole::Dark, ImageRole::Bias, ImageRole::Flat, ImageRole::Light]
        );
    }

    #[test]
    fn test_classify_partitions_every_frame_once() {
        let frames = vec![
            raw("b1.fits", "Bias Frame"),
            raw("d1.fits", "Dark Frame"),
            raw("f1.fits", "Flat Field"),
            raw("l1.fits", "Light Frame"),
            raw("l2.fits", "OBJECT"),
            raw("x1.fits", "Focus"),
            RawFrame::from_header("x2.fits", &FrameHeader::new()),
        ];

        let classified = classify(frames);

        assert_eq!(classified.total(), 7);
        assert_eq!(classified.bias.len(), 1);
        assert_eq!(classified.dark.len(), 1);
        assert_eq!(classified.flat.len(), 1);
        assert_eq!(classified.science.len(), 2);
        assert_eq!(classified.unknown.len(), 2);
        assert_eq!(classified.by_role(ImageRole::Light)[1].file_name(), "l2.fits");
        assert_eq!(classified.calibration_frames().count(), 3);
    }

    #[test]
    fn test_role_display_is_lowercase() {
        assert_eq!(ImageRole::Dark.to_string(), "dark");
        assert_eq!(ImageRole::Light.to_string(), "light");
    }
}
