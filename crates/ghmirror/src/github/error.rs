//! GitHub API error types.

use thiserror::Error;

use crate::http::HttpError;

/// Errors surfaced by the GitHub client.
///
/// Ordinary fetches never return these: a failed fetch degrades to `None`
/// or an empty stream. Only client construction and explicit status queries
/// report errors to the caller.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub rejected the credentials (HTTP {status})")]
    AuthRequired { status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps multi-line
/// transport errors readable in progress output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for GitHub client operations.
pub type Result<T> = std::result::Result<T, GitHubError>;
