//! Ledger rows. Every table is append-only; ids are 1-based row positions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::ImageRole;
use crate::frame::RawFrame;

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub(crate) fn from_index(index: usize) -> Self {
                Self(index as u64 + 1)
            }

            pub(crate) fn index(self) -> Option<usize> {
                usize::try_from(self.0).ok()?.checked_sub(1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " #{}"), self.0)
            }
        }
    };
}

ledger_id!(
    /// A registered raw frame.
    FrameId,
    "frame"
);
ledger_id!(StackId, "stack");
ledger_id!(MasterId, "master");
ledger_id!(
    /// A raw calibration file recorded as a lineage source.
    CalFileId,
    "calfile"
);
ledger_id!(StageId, "stage");
ledger_id!(TransitionId, "transition");

/// Anything that moves through pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Subject {
    Frame(FrameId),
    Stack(StackId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Frame(id) => fmt::Display::fmt(id, f),
            Subject::Stack(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl From<FrameId> for Subject {
    fn from(id: FrameId) -> Self {
        Subject::Frame(id)
    }
}

impl From<StackId> for Subject {
    fn from(id: StackId) -> Self {
        Subject::Stack(id)
    }
}

/// Names of the built-in stages.
pub mod stages {
    pub const INGESTED: &str = "ingested";
    pub const RAW: &str = "raw";
    pub const PREPROCESSING: &str = "preprocessing";
    pub const PREPROCESSED: &str = "preprocessed";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: StageId,
    pub name: String,
    /// Output folder relative to the output root, when the stage has one.
    pub folder: Option<String>,
    pub order: u32,
    /// Error stages are terminal: no transition may follow one.
    pub is_error: bool,
}

/// `ingested → raw → preprocessing → preprocessed → failed`.
pub fn default_stages() -> Vec<PipelineStage> {
    [
        (stages::INGESTED, None, false),
        (stages::RAW, Some("raw"), false),
        (stages::PREPROCESSING, None, false),
        (stages::PREPROCESSED, Some("preprocessed"), false),
        (stages::FAILED, Some("preprocessed"), true),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (name, folder, is_error))| PipelineStage {
        id: StageId::from_index(index),
        name: name.to_string(),
        folder: folder.map(str::to_string),
        order: index as u32,
        is_error,
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    pub id: TransitionId,
    pub subject: Subject,
    pub stage: StageId,
    pub timestamp: DateTime<Utc>,
    /// Number of frames moved together in the batch this transition belongs to.
    pub count: usize,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: FrameId,
    pub registered_at: DateTime<Utc>,
    pub frame: RawFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackRecord {
    pub id: StackId,
    pub created_at: DateTime<Utc>,
    pub path: Option<PathBuf>,
    pub members: Vec<FrameId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterRecord {
    pub id: MasterId,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    pub role: ImageRole,
    pub exposure_time: Option<f64>,
    /// The stack whose members were combined into this master.
    pub stack: Option<StackId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalFileRecord {
    pub id: CalFileId,
    pub created_at: DateTime<Utc>,
    pub path: PathBuf,
    pub role: ImageRole,
    pub exposure_time: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub frame: Option<FrameId>,
}

/// One lineage edge: a calibration file contributed to a master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    pub calfile: CalFileId,
    pub master: MasterId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observatory {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ccd {
    pub name: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Observatory name.
    #[serde(default)]
    pub observatory: Option<String>,
    /// CCD name.
    #[serde(default)]
    pub ccd: Option<String>,
}

/// Optional environment metadata recorded once per ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunContext {
    pub observatory: Option<Observatory>,
    pub ccd: Option<Ccd>,
    pub campaign: Option<Campaign>,
}

impl RunContext {
    pub fn is_empty(&self) -> bool {
        self.observatory.is_none() && self.ccd.is_none() && self.campaign.is_none()
    }
}

/// All ledger tables, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerTables {
    pub context: RunContext,
    pub stages: Vec<PipelineStage>,
    pub frames: Vec<FrameRecord>,
    pub stacks: Vec<StackRecord>,
    pub masters: Vec<MasterRecord>,
    pub calfiles: Vec<CalFileRecord>,
    pub combinations: Vec<Combination>,
    pub transitions: Vec<StageTransition>,
}

impl Default for LedgerTables {
    fn default() -> Self {
        Self {
            context: RunContext::default(),
            stages: default_stages(),
            frames: Vec::new(),
            stacks: Vec::new(),
            masters: Vec::new(),
            calfiles: Vec::new(),
            combinations: Vec::new(),
            transitions: Vec::new(),
        }
    }
}
