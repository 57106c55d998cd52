// src/core/error.rs

use std::time::Duration;
use thiserror::Error;

/// Errors that stop a scan invocation before any probe is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The category name is not known, or the active catalog has no patterns for it.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A transport-level failure reported by the fetch capability.
///
/// These never become findings; the coordinator retries them and then records
/// the pattern as permanently failed on the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// Failures while rendering or writing an export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write delimited results: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed export: {0}")]
    Malformed(String),
}

impl From<csv::IntoInnerError<csv::Writer<Vec<u8>>>> for ExportError {
    fn from(err: csv::IntoInnerError<csv::Writer<Vec<u8>>>) -> Self {
        ExportError::Io(err.into_error())
    }
}
