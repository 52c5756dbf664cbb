use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a URL or a brand-level field could not be filled with real data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    #[error("anti-automation defense encountered")]
    Blocking,
    #[error("navigation timed out")]
    Timeout,
    #[error("content could not be used")]
    ParseError,
    #[error("no usable evidence")]
    NoEvidence,
    #[error("estimation failed")]
    EstimationFailure,
}

/// Terminal failure of a single page fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("blocked on {domain}: {marker}")]
    Blocking { domain: String, marker: String },
    #[error("navigation to {url} timed out after {after_ms}ms")]
    Timeout { url: String, after_ms: u64 },
    #[error("unusable page: {0}")]
    ParseError(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Blocking { .. } => FailureKind::Blocking,
            FetchError::Timeout { .. } => FailureKind::Timeout,
            FetchError::ParseError(_) => FailureKind::ParseError,
        }
    }
}

/// Conditions that are fatal to a whole call. Everything else is reported
/// as a typed outcome or a completeness annotation.
#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("batch contains no urls")]
    EmptyBatch,
    #[error("brand name is empty")]
    EmptyBrandName,
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("operator confirmation required for: {}", domains.join(", "))]
    ConfirmationRequired { domains: Vec<String> },
    #[error("configuration error: {0}")]
    Config(String),
}
