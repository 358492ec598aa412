use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by probing, discovery and session control.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScanError {
    /// Empty or malformed address range; rejected before any I/O.
    #[error("invalid address range: {0}")]
    InvalidInput(String),

    /// The sweep transport could not be used. Fatal to the session.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A per-host probe failed. Contained by the caller.
    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("a scan is already in progress")]
    ScanInProgress,
}
