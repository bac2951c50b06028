//! Header keyword mapping attached to every frame.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known header keywords, stored lowercase.
pub mod keys {
    pub const IMAGETYP: &str = "imagetyp";
    pub const EXPTIME: &str = "exptime";
    pub const OBJECT: &str = "object";
    pub const FILTER: &str = "filter";
    pub const DATE_OBS: &str = "date-obs";
    pub const CCD_TEMP: &str = "ccd-temp";
    pub const XBINNING: &str = "xbinning";
    pub const YBINNING: &str = "ybinning";
    pub const JD: &str = "jd";
    pub const NCOMBINE: &str = "ncombine";
}

/// A single header value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    /// Numeric view. Text values are parsed, since some writers quote numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Text(s) => s.trim().parse().ok(),
            HeaderValue::Bool(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(v) => Some(*v),
            HeaderValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            HeaderValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<u32> for HeaderValue {
    fn from(value: u32) -> Self {
        HeaderValue::Int(i64::from(value))
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

/// Case-insensitive keyword → value mapping.
///
/// Keys are normalized to trimmed lowercase on insertion and lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    entries: BTreeMap<String, HeaderValue>,
}

impl FrameHeader {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize_key(key: &str) -> String {
        key.trim().to_ascii_lowercase()
    }

    pub fn set(&mut self, key: &str, value: impl Into<HeaderValue>) {
        self.entries.insert(Self::normalize_key(key), value.into());
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: &str, value: impl Into<HeaderValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.get(&Self::normalize_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(HeaderValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Declared image type (`IMAGETYP`).
    pub fn image_type(&self) -> Option<&str> {
        self.text(keys::IMAGETYP)
    }

    /// Exposure time in seconds. Negative or non-finite values are treated as absent.
    pub fn exposure_time(&self) -> Option<f64> {
        self.get(keys::EXPTIME)
            .and_then(HeaderValue::as_f64)
            .filter(|t| t.is_finite() && *t >= 0.0)
    }

    pub fn object(&self) -> Option<&str> {
        self.text(keys::OBJECT)
    }

    pub fn filter(&self) -> Option<&str> {
        self.text(keys::FILTER)
    }

    pub fn ccd_temp(&self) -> Option<f64> {
        self.get(keys::CCD_TEMP).and_then(HeaderValue::as_f64)
    }

    pub fn julian_date(&self) -> Option<f64> {
        self.get(keys::JD).and_then(HeaderValue::as_f64)
    }

    /// Binning factors, defaulting to 1 when absent.
    pub fn binning(&self) -> (u32, u32) {
        let read = |key| {
            self.get(key)
                .and_then(HeaderValue::as_i64)
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(1)
        };
        (read(keys::XBINNING), read(keys::YBINNING))
    }

    /// Acquisition timestamp parsed from `DATE-OBS`.
    ///
    /// Accepts RFC 3339, `YYYY-MM-DDThh:mm:ss[.fff]` (taken as UTC) and a bare date.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        parse_date_obs(self.text(keys::DATE_OBS)?)
    }
}

fn parse_date_obs(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_keys_are_case_insensitive() {
        let header = FrameHeader::new().with("IMAGETYP", "Dark Frame");
        assert_eq!(header.image_type(), Some("Dark Frame"));
        assert!(header.contains("imagetyp"));
        assert!(header.contains(" ImageTyp "));
    }

    #[test]
    fn test_exposure_time_parses_text_and_rejects_negative() {
        let header = FrameHeader::new().with("EXPTIME", "30.5");
        assert_eq!(header.exposure_time(), Some(30.5));

        let header = FrameHeader::new().with("EXPTIME", -1.0);
        assert_eq!(header.exposure_time(), None);

        let header = FrameHeader::new().with("EXPTIME", 10_i64);
        assert_eq!(header.exposure_time(), Some(10.0));
    }

    #[test]
    fn test_binning_defaults_to_one() {
        let header = FrameHeader::new().with("XBINNING", 2_i64);
        assert_eq!(header.binning(), (2, 1));
    }

    #[test]
    fn test_blank_text_is_absent() {
        let header = FrameHeader::new().with("OBJECT", "   ");
        assert_eq!(header.object(), None);
    }

    #[test]
    fn test_date_obs_formats() {
        let header = FrameHeader::new().with("DATE-OBS", "2015-10-27T03:12:45.250");
        let ts = header.observed_at().unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2015, 10, 27));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (3, 12, 45));

        let header = FrameHeader::new().with("DATE-OBS", "2015-10-27T03:12:45");
        assert!(header.observed_at().is_some());

        let header = FrameHeader::new().with("DATE-OBS", "2015-10-27");
        assert_eq!(header.observed_at().unwrap().hour(), 0);

        let header = FrameHeader::new().with("DATE-OBS", "last tuesday");
        assert!(header.observed_at().is_none());
    }
}
