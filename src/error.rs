use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatatError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported file format: {0} (allowed extensions: edf, bdf)")]
    UnsupportedFormat(String),

    #[error("Signal index {0} out of range")]
    InvalidSignalIndex(usize),

    #[error("Invalid header size")]
    InvalidHeader,

    #[error("Invalid number of signals: {0}")]
    InvalidSignalCount(i32),

    #[error("Physical min equals physical max")]
    PhysicalMinEqualsMax,

    #[error("Digital min equals digital max")]
    DigitalMinEqualsMax,

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("File names can't be equal: {}", .0.display())]
    NameCollision(PathBuf),

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Empty selection: {0}")]
    EmptySelection(String),

    #[error("Mark label is empty")]
    EmptyLabel,

    #[error("Span is not selected")]
    EmptySpan,

    #[error("Mark label already exists: {0}")]
    DuplicateLabel(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Time-frequency computation failed; callers treat this as a warning.
    #[error("{0}")]
    Transform(String),

    #[error("Partial export: wrote {}, failed {}: {reason}", written.display(), failed.display())]
    PartialExport {
        written: PathBuf,
        failed: PathBuf,
        reason: String,
    },

    #[error("Flow is already closed")]
    FlowClosed,

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("Plot error: {0}")]
    Plot(String),
}

impl RatatError {
    /// Errors that degrade to a warning instead of aborting the action.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RatatError::Transform(_))
    }
}

pub type Result<T> = std::result::Result<T, RatatError>;
