//! Error types for issue-queue

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by issue-queue
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (fatal, never retried)
    #[error("configuration error: {0}")]
    Config(String),

    /// GitHub API returned an error or an unexpected payload
    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    /// GitLab API returned an error or an unexpected payload
    #[error("GitLab API error: {0}")]
    GitLabApi(String),

    /// Generic tracker error (used by alternative tracker implementations)
    #[error("tracker error: {0}")]
    Platform(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error surfaced by octocrab
    #[error("GitHub client error: {0}")]
    Octocrab(#[from] octocrab::Error),

    /// The local work item directory does not exist
    #[error("work item directory not found: {}", .0.display())]
    QueueDirNotFound(PathBuf),

    /// A work item file could not be parsed
    #[error("invalid work item {}: {reason}", path.display())]
    InvalidWorkItem {
        /// File that failed to parse
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// State store read/write/consistency failure
    #[error("state store error: {0}")]
    Tracking(String),

    /// Approve-then-merge did not complete
    #[error("merge failed: {0}")]
    MergeFailed(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invariant violation inside issue-queue
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error is a tracker/network failure worth retrying on the
    /// next poll cycle.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::GitHubApi(_)
                | Self::GitLabApi(_)
                | Self::Platform(_)
                | Self::Http(_)
                | Self::Octocrab(_)
                | Self::MergeFailed(_)
        )
    }
}

/// Result alias using the crate error type
pub type Result<T> = std::result::Result<T, Error>;
