// src/error.rs
//! Typed failures of the aggregation pipeline.
//!
//! Only `InvalidInput` and `AlreadyRunning` ever reach a caller directly.
//! Fetch failures are retried and then degraded, ingest failures end up as
//! a string in the run log.

use std::time::Duration;

/// Extraction can only fail on malformed input; everything else degrades.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid input url: {0}")]
    InvalidInput(String),
}

/// One outbound HTTP fetch.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("http status {0}")]
    Status(u16),
}

impl FetchError {
    /// 5xx and network-level errors are worth another attempt, 4xx are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => true,
            FetchError::Status(code) => *code >= 500,
        }
    }
}

impl FetchError {
    /// `timeout` is the bound the request was sent with; reqwest does not report it.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout(timeout);
        }
        if let Some(status) = e.status() {
            return FetchError::Status(status.as_u16());
        }
        FetchError::Network(e.to_string())
    }
}

/// Writing a candidate into the content store.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Returned by `RunCoordinator::trigger_run`.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("an aggregation run is already in progress")]
    AlreadyRunning,
}
