//! Error types for fetch and render operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while fetching assets or driving the render engine.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Render engine not found: {0}")]
    EngineNotFound(String),

    #[error("Fetch failed for {url}: {message}")]
    FetchFailed {
        url: String,
        message: String,
        status: Option<u16>,
    },

    #[error("Invalid render command: {0}")]
    InvalidCommand(String),

    #[error("Failed to launch {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal process {pid}: {message}")]
    SignalFailed { pid: u32, message: String },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a fetch failure error.
    pub fn fetch_failed(url: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
            status,
        }
    }

    /// True when the error came from asset retrieval rather than the engine.
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, MediaError::FetchFailed { .. })
    }
}

impl From<reqwest::Error> for MediaError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        let status = e.status().map(|s| s.as_u16());
        Self::FetchFailed {
            url,
            message: e.to_string(),
            status,
        }
    }
}
