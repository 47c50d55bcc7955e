//! Error handling

use thiserror::Error;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// A remote record could not be mapped to its typed form
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record {record}: missing field `{field}`")]
    MissingField { record: String, field: &'static str },

    #[error("record {record}: field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        record: String,
        field: &'static str,
        expected: &'static str,
    },

    #[error("record {record}: field `{field}` has invalid value `{value}`")]
    InvalidEnum {
        record: String,
        field: &'static str,
        value: String,
    },

    #[error("record {record}: expected kind {expected}, got {actual}")]
    WrongKind {
        record: String,
        expected: &'static str,
        actual: String,
    },
}

/// Remote record store failures
#[derive(Debug, Clone, Error)]
pub enum RecordError {
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error: {0}")]
    Server(u16),

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl RecordError {
    /// Creation conflicts are recovered by re-fetching
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Local key-value persistence failures
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Crate-level error
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    #[error("remote store: {0}")]
    Remote(#[from] RecordError),

    #[error("local storage: {0}")]
    Storage(#[from] StorageError),

    #[error("telemetry is not configured: {0}")]
    NotConfigured(String),

    #[error("command handler failed: {0}")]
    Handler(String),
}
