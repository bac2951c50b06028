use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use common::{FileExtensionError, SerdeFormatError};
use thiserror::Error;

use super::model::{CalFileId, FrameId, MasterId, StageId, Subject};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Unknown subject: {0}")]
    UnknownSubject(Subject),

    #[error("Unknown stage: {0}")]
    UnknownStage(StageId),

    #[error("Unknown stage name '{0}'")]
    UnknownStageName(String),

    #[error("Unknown master: {0}")]
    UnknownMaster(MasterId),

    #[error("Unknown calibration file: {0}")]
    UnknownCalFile(CalFileId),

    #[error("Stack member {0} is not registered")]
    UnknownStackMember(FrameId),

    #[error("A stack needs at least one member")]
    EmptyStack,

    #[error("Transition for {subject} at {attempted} precedes its latest transition at {latest}")]
    OutOfOrder {
        subject: Subject,
        latest: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    #[error("{subject} is in error stage '{stage}', no further transitions allowed")]
    TerminalStage { subject: Subject, stage: String },

    #[error("Ledger I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported ledger file '{path}': {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FileExtensionError,
    },

    #[error("Failed to (de)serialize ledger '{path}': {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: SerdeFormatError,
    },

    #[error("Inconsistent ledger: {0}")]
    Corrupt(String),
}
