//! Progress reporting for a reduction run.

use std::fmt;
use std::sync::Arc;

use strum_macros::Display;

/// Progress information for one step of a run.
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    /// Items finished so far within the step.
    pub current: usize,
    pub total: usize,
    pub step: PipelineStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStep {
    Ingesting,
    /// Reading calibration frames from disk.
    LoadingCalibration,
    /// Combining one master; `current` counts masters built.
    BuildingMasters,
    WritingMasters,
    CorrectingScience,
}

/// Optional progress sink, shared by every component of a run.
///
/// Clones point at the same function, so one callback can be handed to the
/// builder, the corrector and the pipeline at once.
#[derive(Clone, Default)]
pub struct ProgressCallback(Option<Arc<dyn Fn(PipelineProgress) + Send + Sync>>);

impl ProgressCallback {
    pub fn new(f: impl Fn(PipelineProgress) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("ProgressCallback(..)"),
            None => f.write_str("ProgressCallback(none)"),
        }
    }
}

/// Report progress using the callback if set.
pub fn report_progress(
    callback: &ProgressCallback,
    current: usize,
    total: usize,
    step: PipelineStep,
) {
    if let Some(f) = &callback.0 {
        f(PipelineProgress {
            current,
            total,
            step,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_report_without_callback_is_noop() {
        let callback = ProgressCallback::default();
        assert!(!callback.is_set());
        report_progress(&callback, 1, 2, PipelineStep::Ingesting);
    }

    #[test]
    fn test_report_forwards_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = ProgressCallback::new(move |p: PipelineProgress| {
            sink.lock().push((p.step, p.current, p.total));
        });
        assert!(callback.clone().is_set());

        report_progress(&callback, 0, 3, PipelineStep::BuildingMasters);
        report_progress(&callback, 3, 3, PipelineStep::BuildingMasters);

        assert_eq!(
            *seen.lock(),
            vec![
                (PipelineStep::BuildingMasters, 0, 3),
                (PipelineStep::BuildingMasters, 3, 3)
            ]
        );
        assert_eq!(PipelineStep::CorrectingScience.to_string(), "correcting_science");
    }
}
