//! Error taxonomy for the evaluation core
//!
//! Only `EvalError::UnknownTool` and `EvalError::GroundTruth` abort an
//! evaluation. Backend and parse failures are folded into per-patient
//! predictions by the evaluator.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Maximum characters of raw model output kept in error messages
pub const RAW_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Unknown report tool: {0}")]
    UnknownTool(String),
    #[error("Ground truth error: {0}")]
    GroundTruth(String),
    #[error("Invalid parser pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Unusable backend response: {0}")]
    Shape(String),
    #[error("Backend returned {got} outputs for {expected} prompts")]
    BatchLength { expected: usize, got: usize },
}

impl BackendError {
    /// Map a transport error, keeping timeouts distinguishable
    pub fn from_request(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else {
            BackendError::Request(err)
        }
    }
}

/// A response that no step of the parsing cascade could reduce to a label
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Could not parse prediction: {reason} (raw: {raw_preview:?})")]
pub struct PredictionParseError {
    pub reason: String,
    pub raw_preview: String,
}

impl PredictionParseError {
    pub fn new(reason: impl Into<String>, raw: &str) -> Self {
        Self {
            reason: reason.into(),
            raw_preview: truncate_chars(raw, RAW_PREVIEW_CHARS),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to access cache file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Cache lock poisoned")]
    Lock,
}

/// Truncate on a char boundary, appending "..." when something was cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
