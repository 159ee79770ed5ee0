//! Error types for outbound data source calls

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Why a single source call failed
///
/// Providers never return these to their callers. They are kept distinct so
/// logs and [`DataOrigin`](super::DataOrigin) can say what went wrong.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or body transfer failed
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered with a non-success status
    #[error("{path} returned HTTP {status}")]
    Status { status: StatusCode, path: String },

    /// The body was not the JSON we expected
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The call did not finish within the per-source timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The source needs an API key and none is configured
    #[error("No API key configured for {0}")]
    MissingApiKey(&'static str),

    /// A configured endpoint could not be turned into a request URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Short machine-friendly name of the failure kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Parse(_) => "parse",
            FetchError::Timeout(_) => "timeout",
            FetchError::MissingApiKey(_) => "missing_api_key",
            FetchError::InvalidUrl(_) => "invalid_url",
        }
    }
}

/// A failed call attributed to the source that made it
#[derive(Debug)]
pub struct SourceFailure {
    /// Name of the source (e.g., "agmarknet")
    pub source: &'static str,
    pub error: FetchError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}
