use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtratoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid rule '{pattern}': {reason}")]
    InvalidRule { pattern: String, reason: String },

    #[error("Ledger {} is corrupt at line {line}: {reason}", path.display())]
    LedgerCorruption {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Region {region} is full: {needed} new rows, {available} free")]
    RegionFull {
        region: String,
        needed: usize,
        available: usize,
    },

    #[error("Spreadsheet write failed after {attempts} attempt(s): {source}")]
    ExternalWrite {
        attempts: u32,
        #[source]
        source: SheetError,
    },

    #[error("No API token found in ${0}")]
    MissingToken(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExtratoError>;

// ---------------------------------------------------------------------------
// Row-level parse failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    Date,
    Description,
    Amount,
}

impl fmt::Display for RowField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Date => "date",
            Self::Description => "description",
            Self::Amount => "amount",
        })
    }
}

/// A statement row that failed validation. Skipped, never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}: invalid {field} '{value}': {reason}")]
pub struct MalformedRow {
    pub line: usize,
    pub field: RowField,
    pub value: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Spreadsheet collaborator failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetErrorKind {
    Auth,
    RateLimited,
    Network,
    Timeout,
    Server,
    Rejected,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct SheetError {
    pub kind: SheetErrorKind,
    pub message: String,
}

impl SheetError {
    pub fn new(kind: SheetErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Everything except an outright rejected request is worth retrying.
    pub fn is_transient(&self) -> bool {
        self.kind != SheetErrorKind::Rejected
    }
}
