//! Grouping by exposure time and nearest-exposure lookup.

use thiserror::Error;

use crate::frame::RawFrame;

/// No entry exists to match an exposure time against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("No calibration available for exposure matching")]
pub struct NoCalibrationAvailable;

/// Values keyed by exposure time in seconds, kept sorted ascending.
///
/// Keys compare with exact float equality; callers that want near-equal
/// exposures merged must quantize first.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureMap<V> {
    entries: Vec<(f64, V)>,
}

impl<V> Default for ExposureMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> ExposureMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, exposure: f64) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|(key, _)| key.total_cmp(&exposure))
    }

    /// Inserts or replaces the value for `exposure`, returning the previous one.
    pub fn insert(&mut self, exposure: f64, value: V) -> Option<V> {
        match self.position(exposure) {
            Ok(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            Err(idx) => {
                self.entries.insert(idx, (exposure, value));
                None
            }
        }
    }

    pub fn get(&self, exposure: f64) -> Option<&V> {
        self.position(exposure).ok().map(|idx| &self.entries[idx].1)
    }

    pub fn get_or_insert_with(&mut self, exposure: f64, make: impl FnOnce() -> V) -> &mut V {
        let idx = match self.position(exposure) {
            Ok(idx) => idx,
            Err(idx) => {
                self.entries.insert(idx, (exposure, make()));
                idx
            }
        };
        &mut self.entries[idx].1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exposure times in ascending order.
    pub fn exposure_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(t, _)| *t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &V)> {
        self.entries.iter().map(|(t, v)| (*t, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Entry whose exposure has the smallest absolute difference to `target`.
    ///
    /// On a tie the smaller exposure time wins.
    pub fn closest(&self, target: f64) -> Result<(f64, &V), NoCalibrationAvailable> {
        let mut best: Option<(f64, f64, &V)> = None;
        for (exposure, value) in &self.entries {
            let distance = (exposure - target).abs();
            // ascending iteration + strict comparison keeps the smaller exposure on ties
            if best.is_none_or(|(best_distance, _, _)| distance < best_distance) {
                best = Some((distance, *exposure, value));
            }
        }
        best.map(|(_, exposure, value)| (exposure, value))
            .ok_or(NoCalibrationAvailable)
    }
}

impl<V> IntoIterator for ExposureMap<V> {
    type Item = (f64, V);
    type IntoIter = std::vec::IntoIter<(f64, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Groups dark frames by exact exposure time.
///
/// Darks without a usable exposure time are skipped with a warning.
pub fn group_darks(darks: &[RawFrame]) -> ExposureMap<Vec<RawFrame>> {
    let mut groups = ExposureMap::new();
    for dark in darks {
        match dark.exposure_time() {
            Some(exposure) => groups
                .get_or_insert_with(exposure, Vec::new)
                .push(dark.clone()),
            None => tracing::warn!(
                path = %dark.path().display(),
                "Dark frame has no exposure time, skipping"
            ),
        }
    }
    groups
}

/// The dark group whose exposure is closest to `target`.
pub fn closest(
    darks: &ExposureMap<Vec<RawFrame>>,
    target: f64,
) -> Result<&[RawFrame], NoCalibrationAvailable> {
    darks.closest(target).map(|(_, group)| group.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::header::FrameHeader;

    fn dark(name: &str, exposure: f64) -> RawFrame {
        RawFrame::from_header(
            name,
            &FrameHeader::new()
                .with("IMAGETYP", "Dark Frame")
                .with("EXPTIME", exposure),
        )
    }

    fn ten_and_thirty() -> ExposureMap<Vec<RawFrame>> {
        let darks: Vec<RawFrame> = (0..5)
            .map(|i| dark(&format!("d10_{i}.fits"), 10.0))
            .chain((0..5).map(|i| dark(&format!("d30_{i}.fits"), 30.0)))
            .collect();
        group_darks(&darks)
    }

    #[test]
    fn test_group_darks_by_exposure() {
        let groups = ten_and_thirty();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.exposure_times().collect::<Vec<_>>(), vec![10.0, 30.0]);
        assert_eq!(groups.get(10.0).unwrap().len(), 5);
        assert_eq!(groups.get(30.0).unwrap().len(), 5);
    }

    #[test]
    fn test_darks_without_exposure_are_skipped() {
        let no_exposure = RawFrame::from_header(
            "d.fits",
            &FrameHeader::new().with("IMAGETYP", "Dark Frame"),
        );
        let groups = group_darks(&[no_exposure, dark("d1.fits", 5.0)]);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_closest_picks_nearer_group() {
        let groups = ten_and_thirty();
        let group = closest(&groups, 12.0).unwrap();
        assert_eq!(group.len(), 5);
        assert!(group.iter().all(|d| d.exposure_time() == Some(10.0)));

        let group = closest(&groups, 25.0).unwrap();
        assert!(group.iter().all(|d| d.exposure_time() == Some(30.0)));
    }

    #[test]
    fn test_closest_exact_key() {
        let groups = ten_and_thirty();
        assert_eq!(groups.closest(30.0).unwrap().0, 30.0);
        assert_eq!(groups.closest(10.0).unwrap().0, 10.0);
    }

    #[test]
    fn test_closest_outside_range_uses_absolute_difference() {
        let groups = ten_and_thirty();
        assert_eq!(groups.closest(0.0).unwrap().0, 10.0);
        assert_eq!(groups.closest(300.0).unwrap().0, 30.0);
    }

    #[test]
    fn test_tie_prefers_smaller_exposure() {
        let groups = ten_and_thirty();
        assert_eq!(groups.closest(20.0).unwrap().0, 10.0);

        // insertion order must not matter
        let mut map = ExposureMap::new();
        map.insert(30.0, "thirty");
        map.insert(10.0, "ten");
        assert_eq!(map.closest(20.0).unwrap(), (10.0, &"ten"));
    }

    #[test]
    fn test_closest_on_empty_map_fails() {
        let groups: ExposureMap<Vec<RawFrame>> = ExposureMap::new();
        assert_eq!(closest(&groups, 10.0).unwrap_err(), NoCalibrationAvailable);
    }

    #[test]
    fn test_insert_replaces_exact_key() {
        let mut map = ExposureMap::new();
        assert_eq!(map.insert(10.0, 1), None);
        assert_eq!(map.insert(10.0, 2), Some(1));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(10.0), Some(&2));
        // near-equal keys are distinct
        map.insert(10.000001, 3);
        assert_eq!(map.len(), 2);
    }
}
