//! Single-run reduction: discover, ingest, classify, build masters, correct
//! science frames and record every step in the provenance ledger.

pub mod error;

pub use error::PipelineError;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::file_utils::{fits_files_recursive, move_file};
use parking_lot::Mutex;

use crate::calibration::{CalibrationBuilder, CalibrationMasters, MasterCalibration};
use crate::classify::{ClassifiedFrames, classify};
use crate::config::RunConfig;
use crate::correct::{CorrectionStatus, ScienceCorrector, ScienceOutput};
use crate::frame::RawFrame;
use crate::frame::header::FrameHeader;
use crate::frame::io::FrameIo;
use crate::ledger::{FrameId, ProvenanceLedger, StageId, Subject, stages};
use crate::progress::{PipelineStep, ProgressCallback, report_progress};

/// Hands out timestamps that never go backwards, even if the wall clock does.
#[derive(Debug)]
pub struct MonotonicClock {
    last: Mutex<DateTime<Utc>>,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl MonotonicClock {
    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let now = Utc::now().max(*last);
        *last = now;
        now
    }
}

/// Counts per role after classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleCounts {
    pub bias: usize,
    pub dark: usize,
    pub flat: usize,
    pub science: usize,
    pub unknown: usize,
}

impl From<&ClassifiedFrames> for RoleCounts {
    fn from(frames: &ClassifiedFrames) -> Self {
        Self {
            bias: frames.bias.len(),
            dark: frames.dark.len(),
            flat: frames.flat.len(),
            science: frames.science.len(),
            unknown: frames.unknown.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ingested: usize,
    pub roles: RoleCounts,
    /// Written master files, bias first, darks by exposure, flat last.
    pub masters: Vec<PathBuf>,
    pub corrected: usize,
    pub failed: usize,
    pub ledger_path: PathBuf,
}

struct StageIds {
    ingested: StageId,
    raw: StageId,
    preprocessing: StageId,
    preprocessed: StageId,
    failed: StageId,
}

impl StageIds {
    fn resolve(ledger: &ProvenanceLedger) -> Result<Self, PipelineError> {
        Ok(Self {
            ingested: ledger.stage(stages::INGESTED)?.id,
            raw: ledger.stage(stages::RAW)?.id,
            preprocessing: ledger.stage(stages::PREPROCESSING)?.id,
            preprocessed: ledger.stage(stages::PREPROCESSED)?.id,
            failed: ledger.stage(stages::FAILED)?.id,
        })
    }
}

/// `dir/name`, or `dir/<stem>_<n>.<ext>` with the smallest free `n`.
fn unique_destination(dir: &Path, file_name: &str, claimed: &HashSet<PathBuf>) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() && !claimed.contains(&candidate) {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let extension = name.extension().map(|e| e.to_string_lossy());
    (1..)
        .map(|n| match &extension {
            Some(ext) => dir.join(format!("{stem}_{n}.{ext}")),
            None => dir.join(format!("{stem}_{n}")),
        })
        .find(|p| !p.exists() && !claimed.contains(p))
        .unwrap_or(candidate)
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(|source| PipelineError::CreateOutputDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Marks every frame left in `ingested` or `preprocessing` as failed.
///
/// Called when a run aborts after ingestion started. Recording problems are
/// logged so the original error is the one returned.
fn fail_in_flight(ledger: &ProvenanceLedger, stage_ids: &StageIds, clock: &MonotonicClock) {
    let in_flight = [stage_ids.ingested, stage_ids.preprocessing];
    for record in ledger.snapshot().frames {
        let subject = Subject::Frame(record.id);
        let Ok(stage) = ledger.current_stage(subject) else {
            continue;
        };
        if !in_flight.contains(&stage.id) {
            continue;
        }
        if let Err(err) = ledger.record_transition(subject, stage_ids.failed, clock.now(), 1, None) {
            tracing::warn!(%subject, error = %err, "Could not mark interrupted frame as failed");
        }
    }
}

pub struct Pipeline<'a> {
    config: RunConfig,
    io: &'a dyn FrameIo,
    progress: ProgressCallback,
    clock: MonotonicClock,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: RunConfig, io: &'a dyn FrameIo) -> Self {
        Self {
            config,
            io,
            progress: ProgressCallback::default(),
            clock: MonotonicClock::default(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs the whole reduction once.
    ///
    /// Setup problems (invalid config, missing input, uncreatable output
    /// directories) abort before any file is moved. Science frame failures
    /// never abort; they are written as `failed_<name>` and recorded. Any
    /// later error marks the frames still in flight as failed and saves the
    /// ledger before it is returned. Masters never replace files from earlier
    /// runs; a clashing name gets a `_N` suffix.
    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        self.config.validate()?;
        let input_dir = &self.config.input_dir;
        if !input_dir.is_dir() {
            return Err(PipelineError::MissingInputDir(input_dir.clone()));
        }
        let raw_dir = self.config.raw_dir();
        let preprocessed_dir = self.config.preprocessed_dir();
        create_dir(&raw_dir)?;
        create_dir(&preprocessed_dir)?;

        let ledger_path = self.config.ledger_path();
        if let Some(parent) = ledger_path.parent() {
            create_dir(parent)?;
        }
        let ledger = ProvenanceLedger::load_or_new(&ledger_path)?;
        if !self.config.context.is_empty() {
            ledger.set_context(self.config.context.clone());
        }
        let stage_ids = StageIds::resolve(&ledger)?;

        tracing::info!(
            input = %input_dir.display(),
            output = %self.config.output_root().display(),
            "Starting reduction run"
        );

        let summary = match self.process(&ledger, &stage_ids, &raw_dir, &preprocessed_dir, ledger_path.clone()) {
            Ok(summary) => summary,
            Err(err) => {
                // frames may already sit in raw/, keep their record
                fail_in_flight(&ledger, &stage_ids, &self.clock);
                if let Err(save_err) = ledger.save(&ledger_path) {
                    tracing::error!(error = %save_err, "Failed to save ledger after run failure");
                }
                return Err(err);
            }
        };
        self.save_ledger(&ledger, &ledger_path)?;

        tracing::info!(
            ingested = summary.ingested,
            masters = summary.masters.len(),
            corrected = summary.corrected,
            failed = summary.failed,
            "Reduction run finished"
        );
        Ok(summary)
    }

    /// Everything after setup. Any error leaves the ledger for `run` to settle.
    fn process(
        &self,
        ledger: &ProvenanceLedger,
        stage_ids: &StageIds,
        raw_dir: &Path,
        preprocessed_dir: &Path,
        ledger_path: PathBuf,
    ) -> Result<RunSummary, PipelineError> {
        let discovered = self.discover(raw_dir, preprocessed_dir)?;
        let (frames, frame_ids) = self.ingest(&discovered, raw_dir, ledger, stage_ids)?;
        let ingested = frames.len();
        let classified = classify(frames);

        let masters = self.build_masters(&classified, &frame_ids, ledger, stage_ids)?;
        let master_paths = self.write_masters(&masters, &classified, &frame_ids, ledger, stage_ids)?;

        let outputs = self.correct_science(&classified, &masters, &frame_ids, ledger, stage_ids)?;
        let failed = outputs.iter().filter(|o| !o.is_corrected()).count();

        Ok(RunSummary {
            ingested,
            roles: RoleCounts::from(&classified),
            masters: master_paths,
            corrected: outputs.len() - failed,
            failed,
            ledger_path,
        })
    }

    fn save_ledger(&self, ledger: &ProvenanceLedger, path: &Path) -> Result<(), PipelineError> {
        ledger.save(path)?;
        Ok(())
    }

    /// Raw frame files under the input directory, skipping the output areas.
    fn discover(&self, raw_dir: &Path, preprocessed_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let input_dir = &self.config.input_dir;
        let files = fits_files_recursive(input_dir).map_err(|source| PipelineError::Discover {
            path: input_dir.clone(),
            source,
        })?;
        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| !p.starts_with(raw_dir) && !p.starts_with(preprocessed_dir))
            .collect();

        tracing::info!(count = files.len(), "Discovered raw frames");
        Ok(files)
    }

    /// Reads headers, moves files into the raw area and registers them.
    fn ingest(
        &self,
        discovered: &[PathBuf],
        raw_dir: &Path,
        ledger: &ProvenanceLedger,
        stage_ids: &StageIds,
    ) -> Result<(Vec<RawFrame>, HashMap<PathBuf, FrameId>), PipelineError> {
        let batch = discovered.len();
        let mut claimed = HashSet::with_capacity(batch);
        let mut frames = Vec::with_capacity(batch);
        let mut frame_ids = HashMap::with_capacity(batch);

        for (index, source) in discovered.iter().enumerate() {
            let header = self.io.read_header(source).unwrap_or_else(|err| {
                tracing::warn!(
                    path = %source.display(),
                    error = %err,
                    "Unreadable header, frame will be classified unknown"
                );
                FrameHeader::new()
            });

            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let destination = unique_destination(raw_dir, &file_name, &claimed);
            claimed.insert(destination.clone());

            let frame = RawFrame::from_header(destination.clone(), &header);
            let id = ledger.register_frame(&frame);
            ledger.record_transition(
                Subject::Frame(id),
                stage_ids.ingested,
                self.clock.now(),
                batch,
                Some(source.clone()),
            )?;

            move_file(source, &destination).map_err(|err| PipelineError::Ingest {
                from: source.clone(),
                to: destination.clone(),
                source: err,
            })?;
            ledger.record_transition(
                Subject::Frame(id),
                stage_ids.raw,
                self.clock.now(),
                batch,
                Some(destination.clone()),
            )?;

            frame_ids.insert(destination, id);
            frames.push(frame);
            report_progress(&self.progress, index + 1, batch, PipelineStep::Ingesting);
        }

        Ok((frames, frame_ids))
    }

    fn build_masters(
        &self,
        classified: &ClassifiedFrames,
        frame_ids: &HashMap<PathBuf, FrameId>,
        ledger: &ProvenanceLedger,
        stage_ids: &StageIds,
    ) -> Result<CalibrationMasters, PipelineError> {
        let calibration: Vec<&RawFrame> = classified.calibration_frames().collect();
        let batch = calibration.len();
        for frame in &calibration {
            if let Some(&id) = frame_ids.get(frame.path()) {
                ledger.record_transition(
                    Subject::Frame(id),
                    stage_ids.preprocessing,
                    self.clock.now(),
                    batch,
                    Some(frame.path().to_path_buf()),
                )?;
            }
        }

        let result = CalibrationBuilder::new(self.io)
            .with_clip_config(self.config.clip)
            .with_progress(self.progress.clone())
            .build(classified);

        result.map_err(|err| {
            tracing::error!(error = %err, "Calibration build failed");
            PipelineError::from(err)
        })
    }

    /// Writes each master and records its stack, lineage and stage moves.
    fn write_masters(
        &self,
        masters: &CalibrationMasters,
        classified: &ClassifiedFrames,
        frame_ids: &HashMap<PathBuf, FrameId>,
        ledger: &ProvenanceLedger,
        stage_ids: &StageIds,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let preprocessed_dir = self.config.preprocessed_dir();
        let total = masters.len();
        let mut written = Vec::with_capacity(total);
        let mut used: HashSet<&Path> = HashSet::new();

        for (index, master) in masters.iter().enumerate() {
            // earlier runs' masters stay referenced by the ledger
            let path = unique_destination(&preprocessed_dir, &master.file_name(), &HashSet::new());
            self.io
                .write(&path, master.frame())
                .map_err(|source| PipelineError::WriteOutput {
                    path: path.clone(),
                    source,
                })?;
            self.record_master(master, &path, classified, frame_ids, ledger, stage_ids)?;
            used.extend(master.lineage().iter().map(PathBuf::as_path));
            written.push(path);
            report_progress(&self.progress, index + 1, total, PipelineStep::WritingMasters);
        }

        // e.g. darks without an exposure time
        for frame in classified.calibration_frames() {
            if used.contains(frame.path()) {
                continue;
            }
            tracing::warn!(path = %frame.path().display(), "Calibration frame not used by any master");
            if let Some(&id) = frame_ids.get(frame.path()) {
                ledger.record_transition(Subject::Frame(id), stage_ids.failed, self.clock.now(), 1, None)?;
            }
        }

        Ok(written)
    }

    fn record_master(
        &self,
        master: &MasterCalibration,
        path: &Path,
        classified: &ClassifiedFrames,
        frame_ids: &HashMap<PathBuf, FrameId>,
        ledger: &ProvenanceLedger,
        stage_ids: &StageIds,
    ) -> Result<(), PipelineError> {
        let members: Vec<FrameId> = master
            .lineage()
            .iter()
            .filter_map(|p| frame_ids.get(p).copied())
            .collect();
        let count = master.lineage().len();

        let stack = if members.is_empty() {
            None
        } else {
            let stack = ledger.register_stack(&members, Some(path.to_path_buf()))?;
            let subject = Subject::Stack(stack);
            ledger.record_transition(subject, stage_ids.preprocessing, self.clock.now(), count, None)?;
            ledger.record_transition(
                subject,
                stage_ids.preprocessed,
                self.clock.now(),
                count,
                Some(path.to_path_buf()),
            )?;
            Some(stack)
        };

        let master_id = ledger.register_master(master, path, stack)?;
        for source in master.lineage() {
            let raw = classified
                .calibration_frames()
                .find(|f| f.path() == source.as_path());
            let frame_id = frame_ids.get(source).copied();
            if let Some(raw) = raw {
                let calfile = ledger.register_calfile(raw, frame_id);
                ledger.link_combination(calfile, master_id)?;
            }
            if let Some(id) = frame_id {
                ledger.record_transition(
                    Subject::Frame(id),
                    stage_ids.preprocessed,
                    self.clock.now(),
                    count,
                    Some(path.to_path_buf()),
                )?;
            }
        }
        Ok(())
    }

    fn correct_science(
        &self,
        classified: &ClassifiedFrames,
        masters: &CalibrationMasters,
        frame_ids: &HashMap<PathBuf, FrameId>,
        ledger: &ProvenanceLedger,
        stage_ids: &StageIds,
    ) -> Result<Vec<ScienceOutput>, PipelineError> {
        let science = &classified.science;
        let batch = science.len();
        for frame in science {
            if let Some(&id) = frame_ids.get(frame.path()) {
                ledger.record_transition(
                    Subject::Frame(id),
                    stage_ids.preprocessing,
                    self.clock.now(),
                    batch,
                    Some(frame.path().to_path_buf()),
                )?;
            }
        }

        let outputs = ScienceCorrector::new(masters, self.io)
            .with_max_concurrent(self.config.max_concurrent)
            .with_progress(self.progress.clone())
            .correct_all(science);

        let preprocessed_dir = self.config.preprocessed_dir();
        for output in &outputs {
            let path = preprocessed_dir.join(&output.output_name);
            let written = match &output.frame {
                Some(frame) => {
                    self.io
                        .write(&path, frame)
                        .map_err(|source| PipelineError::WriteOutput {
                            path: path.clone(),
                            source,
                        })?;
                    Some(path)
                }
                None => None,
            };

            let stage = match output.status {
                CorrectionStatus::Corrected { .. } => stage_ids.preprocessed,
                CorrectionStatus::Failed(_) => stage_ids.failed,
            };
            if let Some(&id) = frame_ids.get(&output.source) {
                ledger.record_transition(Subject::Frame(id), stage, self.clock.now(), 1, written)?;
            }
        }

        Ok(outputs)
    }
}
