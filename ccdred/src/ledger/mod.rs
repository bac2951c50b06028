//! Provenance ledger: stage transitions and calibration lineage.
//!
//! The ledger is an in-memory set of append-only tables guarded by one lock,
//! so every registration and transition is a single atomic append and the
//! ledger can be shared by reference across worker threads. It is persisted
//! as YAML or JSON, chosen by the file extension.

pub mod error;
pub mod model;

pub use error::LedgerError;
pub use model::{
    CalFileId, CalFileRecord, Campaign, Ccd, Combination, FrameId, FrameRecord, LedgerTables,
    MasterId, MasterRecord, Observatory, PipelineStage, RunContext, StackId, StackRecord, StageId,
    StageTransition, Subject, TransitionId, default_stages, stages,
};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use common::FileFormat;
use parking_lot::Mutex;

use crate::calibration::MasterCalibration;
use crate::frame::RawFrame;

#[derive(Debug, Default)]
pub struct ProvenanceLedger {
    tables: Mutex<LedgerTables>,
}

impl LedgerTables {
    fn stage_by_id(&self, id: StageId) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.id == id)
    }

    fn has_subject(&self, subject: Subject) -> bool {
        match subject {
            Subject::Frame(id) => id.index().is_some_and(|i| i < self.frames.len()),
            Subject::Stack(id) => id.index().is_some_and(|i| i < self.stacks.len()),
        }
    }

    fn has_master(&self, id: MasterId) -> bool {
        id.index().is_some_and(|i| i < self.masters.len())
    }

    fn has_calfile(&self, id: CalFileId) -> bool {
        id.index().is_some_and(|i| i < self.calfiles.len())
    }

    /// Latest transition of `subject`; the later append wins on equal timestamps.
    fn latest_transition(&self, subject: Subject) -> Option<&StageTransition> {
        self.transitions
            .iter()
            .filter(|t| t.subject == subject)
            .fold(None, |latest: Option<&StageTransition>, t| match latest {
                Some(l) if l.timestamp > t.timestamp => Some(l),
                _ => Some(t),
            })
    }

    /// Checks that ids are positional and every reference resolves.
    fn validate(&self) -> Result<(), LedgerError> {
        fn check_ids<T>(
            table: &str,
            rows: &[T],
            id: impl Fn(&T) -> u64,
        ) -> Result<(), LedgerError> {
            for (index, row) in rows.iter().enumerate() {
                if id(row) != index as u64 + 1 {
                    return Err(LedgerError::Corrupt(format!(
                        "{table} row {index} has id {}",
                        id(row)
                    )));
                }
            }
            Ok(())
        }

        check_ids("frames", &self.frames, |r| r.id.0)?;
        check_ids("stacks", &self.stacks, |r| r.id.0)?;
        check_ids("masters", &self.masters, |r| r.id.0)?;
        check_ids("calfiles", &self.calfiles, |r| r.id.0)?;
        check_ids("transitions", &self.transitions, |r| r.id.0)?;

        for t in &self.transitions {
            if !self.has_subject(t.subject) {
                return Err(LedgerError::Corrupt(format!("{} references {}", t.id, t.subject)));
            }
            if self.stage_by_id(t.stage).is_none() {
                return Err(LedgerError::Corrupt(format!("{} references {}", t.id, t.stage)));
            }
        }
        for c in &self.combinations {
            if !self.has_master(c.master) || !self.has_calfile(c.calfile) {
                return Err(LedgerError::Corrupt(format!(
                    "combination {} -> {} is dangling",
                    c.calfile, c.master
                )));
            }
        }
        Ok(())
    }
}

impl ProvenanceLedger {
    /// An empty ledger with the default stages.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty ledger with a custom stage table.
    pub fn with_stages(stages: Vec<PipelineStage>) -> Self {
        Self {
            tables: Mutex::new(LedgerTables {
                stages,
                ..LedgerTables::default()
            }),
        }
    }

    pub fn from_tables(tables: LedgerTables) -> Result<Self, LedgerError> {
        tables.validate()?;
        Ok(Self {
            tables: Mutex::new(tables),
        })
    }

    /// A copy of every table.
    pub fn snapshot(&self) -> LedgerTables {
        self.tables.lock().clone()
    }

    pub fn set_context(&self, context: RunContext) {
        self.tables.lock().context = context;
    }

    pub fn context(&self) -> RunContext {
        self.tables.lock().context.clone()
    }

    pub fn stages(&self) -> Vec<PipelineStage> {
        self.tables.lock().stages.clone()
    }

    pub fn stage(&self, name: &str) -> Result<PipelineStage, LedgerError> {
        self.tables
            .lock()
            .stages
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownStageName(name.to_string()))
    }

    pub fn register_frame(&self, frame: &RawFrame) -> FrameId {
        let mut tables = self.tables.lock();
        let id = FrameId::from_index(tables.frames.len());
        tables.frames.push(FrameRecord {
            id,
            registered_at: Utc::now(),
            frame: frame.clone(),
        });
        id
    }

    pub fn frame(&self, id: FrameId) -> Option<FrameRecord> {
        let tables = self.tables.lock();
        id.index().and_then(|i| tables.frames.get(i)).cloned()
    }

    /// Most recently registered frame with this path.
    pub fn frame_id(&self, path: &Path) -> Option<FrameId> {
        self.tables
            .lock()
            .frames
            .iter()
            .rev()
            .find(|r| r.frame.path() == path)
            .map(|r| r.id)
    }

    pub fn register_stack(
        &self,
        members: &[FrameId],
        path: Option<PathBuf>,
    ) -> Result<StackId, LedgerError> {
        if members.is_empty() {
            return Err(LedgerError::EmptyStack);
        }
        let mut tables = self.tables.lock();
        if let Some(&missing) = members
            .iter()
            .find(|&&m| !tables.has_subject(Subject::Frame(m)))
        {
            return Err(LedgerError::UnknownStackMember(missing));
        }

        let id = StackId::from_index(tables.stacks.len());
        tables.stacks.push(StackRecord {
            id,
            created_at: Utc::now(),
            path,
            members: members.to_vec(),
        });
        Ok(id)
    }

    pub fn stack(&self, id: StackId) -> Option<StackRecord> {
        let tables = self.tables.lock();
        id.index().and_then(|i| tables.stacks.get(i)).cloned()
    }

    pub fn register_master(
        &self,
        master: &MasterCalibration,
        path: impl Into<PathBuf>,
        stack: Option<StackId>,
    ) -> Result<MasterId, LedgerError> {
        let mut tables = self.tables.lock();
        if let Some(stack) = stack
            && !tables.has_subject(Subject::Stack(stack))
        {
            return Err(LedgerError::UnknownSubject(Subject::Stack(stack)));
        }

        let id = MasterId::from_index(tables.masters.len());
        tables.masters.push(MasterRecord {
            id,
            created_at: master.created_at(),
            path: path.into(),
            role: master.role(),
            exposure_time: master.exposure_time(),
            stack,
        });
        Ok(id)
    }

    pub fn register_calfile(&self, frame: &RawFrame, frame_id: Option<FrameId>) -> CalFileId {
        let mut tables = self.tables.lock();
        let id = CalFileId::from_index(tables.calfiles.len());
        tables.calfiles.push(CalFileRecord {
            id,
            created_at: Utc::now(),
            path: frame.path().to_path_buf(),
            role: frame.role(),
            exposure_time: frame.exposure_time(),
            observed_at: frame.observed_at(),
            frame: frame_id,
        });
        id
    }

    /// Records that `calfile` contributed to `master`.
    pub fn link_combination(&self, calfile: CalFileId, master: MasterId) -> Result<(), LedgerError> {
        let mut tables = self.tables.lock();
        if !tables.has_calfile(calfile) {
            return Err(LedgerError::UnknownCalFile(calfile));
        }
        if !tables.has_master(master) {
            return Err(LedgerError::UnknownMaster(master));
        }
        tables.combinations.push(Combination { calfile, master });
        Ok(())
    }

    /// Calibration files that produced `master`, in link order.
    pub fn lineage_of(&self, master: MasterId) -> Result<Vec<CalFileRecord>, LedgerError> {
        let tables = self.tables.lock();
        if !tables.has_master(master) {
            return Err(LedgerError::UnknownMaster(master));
        }
        Ok(tables
            .combinations
            .iter()
            .filter(|c| c.master == master)
            .filter_map(|c| c.calfile.index().and_then(|i| tables.calfiles.get(i)))
            .cloned()
            .collect())
    }

    pub fn masters_fed_by(&self, calfile: CalFileId) -> Result<Vec<MasterRecord>, LedgerError> {
        let tables = self.tables.lock();
        if !tables.has_calfile(calfile) {
            return Err(LedgerError::UnknownCalFile(calfile));
        }
        Ok(tables
            .combinations
            .iter()
            .filter(|c| c.calfile == calfile)
            .filter_map(|c| c.master.index().and_then(|i| tables.masters.get(i)))
            .cloned()
            .collect())
    }

    /// Appends one transition.
    ///
    /// Rejected when the subject or stage is unknown, when the subject already
    /// sits in an error stage, or when `timestamp` precedes its latest transition.
    pub fn record_transition(
        &self,
        subject: Subject,
        stage: StageId,
        timestamp: DateTime<Utc>,
        count: usize,
        path: Option<PathBuf>,
    ) -> Result<TransitionId, LedgerError> {
        let mut tables = self.tables.lock();
        if tables.stage_by_id(stage).is_none() {
            return Err(LedgerError::UnknownStage(stage));
        }
        if !tables.has_subject(subject) {
            return Err(LedgerError::UnknownSubject(subject));
        }

        if let Some(latest) = tables.latest_transition(subject) {
            if let Some(current) = tables.stage_by_id(latest.stage)
                && current.is_error
            {
                return Err(LedgerError::TerminalStage {
                    subject,
                    stage: current.name.clone(),
                });
            }
            if timestamp < latest.timestamp {
                return Err(LedgerError::OutOfOrder {
                    subject,
                    latest: latest.timestamp,
                    attempted: timestamp,
                });
            }
        }

        let id = TransitionId::from_index(tables.transitions.len());
        tables.transitions.push(StageTransition {
            id,
            subject,
            stage,
            timestamp,
            count,
            path,
        });
        Ok(id)
    }

    /// Stage of the subject's latest transition.
    pub fn current_stage(&self, subject: Subject) -> Result<PipelineStage, LedgerError> {
        let tables = self.tables.lock();
        let latest = tables
            .latest_transition(subject)
            .ok_or(LedgerError::UnknownSubject(subject))?;
        tables
            .stage_by_id(latest.stage)
            .cloned()
            .ok_or(LedgerError::UnknownStage(latest.stage))
    }

    /// Every transition of `subject`, in append order.
    pub fn transitions_for(&self, subject: Subject) -> Vec<StageTransition> {
        self.tables
            .lock()
            .transitions
            .iter()
            .filter(|t| t.subject == subject)
            .cloned()
            .collect()
    }

    pub fn frame_count(&self) -> usize {
        self.tables.lock().frames.len()
    }

    pub fn transition_count(&self) -> usize {
        self.tables.lock().transitions.len()
    }

    /// Writes the ledger to `path`; the format follows the extension.
    ///
    /// The file is written next to its destination and renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let format = FileFormat::from_path(path).map_err(|source| LedgerError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        let text = common::serialize(&*self.tables.lock(), format).map_err(|source| {
            LedgerError::Serde {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let io_error = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, text).map_err(io_error)?;
        std::fs::rename(&tmp_path, path).map_err(io_error)?;

        tracing::info!(path = %path.display(), "Saved provenance ledger");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let format = FileFormat::from_path(path).map_err(|source| LedgerError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tables: LedgerTables =
            common::deserialize(&text, format).map_err(|source| LedgerError::Serde {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_tables(tables)
    }

    /// Loads `path` if it exists, otherwise starts an empty ledger.
    pub fn load_or_new(path: &Path) -> Result<Self, LedgerError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }
}
