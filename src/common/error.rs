use crate::pipeline::RunSummary;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Network, auth or non-2xx failure from the search endpoint. Aborts the run.
    #[error("Source unavailable{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    SourceUnavailable { status: Option<u16>, message: String },

    /// Raw record without the identity field; the sink refuses it.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Duplicate record: report {report_id} already stored")]
    DuplicateRecord { report_id: String },

    /// Connection could not be established or was lost. Aborts remaining writes.
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Run aborted after {} attempted records: {reason}", .summary.attempted)]
    RunAborted {
        reason: Box<EtlError>,
        summary: RunSummary,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::SystemIoFailure
                        | ErrorCode::DatabaseCorrupt
                        | ErrorCode::NotADatabase
                        | ErrorCode::DiskFull
                        | ErrorCode::ReadOnly
                        | ErrorCode::PermissionDenied
                ) =>
            {
                EtlError::StoreUnavailable {
                    message: err.to_string(),
                }
            }
            _ => EtlError::Store {
                message: err.to_string(),
            },
        }
    }
}

impl EtlError {
    /// Batch-level errors end the run; everything else is charged to a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EtlError::SourceUnavailable { .. }
                | EtlError::StoreUnavailable { .. }
                | EtlError::RunAborted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
