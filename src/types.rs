//! Core types for issue-queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A locally authored unit of work (one numbered Markdown file)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    /// Number parsed from the filename prefix; defines queue order
    pub sequence_number: u32,
    /// File name (no directory), e.g. `001-set-up-ci.md`
    pub filename: String,
    /// First line of the file
    pub title: String,
    /// Everything after the title line
    pub body: String,
    /// Labels parsed from the "Labels" section
    pub labels: Vec<String>,
}

/// Issue state on the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    /// Issue is open
    Open,
    /// Issue was closed (by a merged change or manually)
    Closed,
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The tracker's representation of a dispatched work item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedIssue {
    /// Tracker-assigned number (GitHub number / GitLab iid)
    pub remote_id: u64,
    /// Issue title
    pub title: String,
    /// Issue body/description
    pub body: String,
    /// Open or closed
    pub state: IssueState,
    /// Logins of assigned users
    pub assignees: Vec<String>,
    /// Label names
    pub labels: Vec<String>,
    /// When the issue was created
    pub created_at: DateTime<Utc>,
    /// When the issue was closed, if it is
    pub closed_at: Option<DateTime<Utc>>,
    /// Web URL for the issue
    pub html_url: String,
}

impl TrackedIssue {
    /// Whether the issue is closed
    pub fn is_closed(&self) -> bool {
        self.state == IssueState::Closed
    }
}

/// Request to create an issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    /// Issue title
    pub title: String,
    /// Issue body
    pub body: String,
    /// Labels to apply (must already exist on the tracker)
    pub labels: Vec<String>,
    /// Validated assignee logins
    pub assignees: Vec<String>,
}

/// A timeline event on an issue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueEvent {
    /// Event kind as reported by the tracker (e.g. `subscribed`, `closed`)
    pub kind: String,
    /// Login of the user that caused the event
    pub actor: Option<String>,
    /// Commit that caused the event (closing commits)
    pub commit_id: Option<String>,
    /// When the event happened
    pub created_at: Option<DateTime<Utc>>,
}

impl IssueEvent {
    /// Kind reported for the event that closed an issue
    pub const CLOSED: &'static str = "closed";

    /// Whether this event closed the issue
    pub fn is_close(&self) -> bool {
        self.kind == Self::CLOSED
    }
}

/// PR/MR state (open, closed, merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrState {
    /// PR is open
    Open,
    /// PR was closed without merging
    Closed,
    /// PR was merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// Tri-state mergeability as computed by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mergeable {
    /// No conflicts
    Yes,
    /// Has conflicts
    No,
    /// Tracker has not computed it yet
    #[default]
    Unknown,
}

impl From<Option<bool>> for Mergeable {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Yes,
            Some(false) => Self::No,
            None => Self::Unknown,
        }
    }
}

/// A reviewer's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewVerdict {
    /// Approved the change
    Approved,
    /// Requested changes
    ChangesRequested,
    /// Review started but not submitted
    Pending,
    /// Commented without a decision
    Commented,
    /// Earlier review was dismissed
    Dismissed,
}

/// One submitted review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Review {
    /// Reviewer login
    pub reviewer: String,
    /// Verdict of this review
    pub verdict: ReviewVerdict,
}

/// Outcome of a CI status check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckOutcome {
    /// Queued, not started
    Pending,
    /// Running
    InProgress,
    /// Passed
    Success,
    /// Failed, errored, cancelled or timed out
    Failure,
    /// Skipped or neutral; does not block
    Skipped,
}

/// One CI status check
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCheck {
    /// Check/context name
    pub name: String,
    /// Outcome
    pub outcome: CheckOutcome,
}

/// A pull/merge request that may resolve a tracked issue
///
/// List endpoints only populate the summary fields; `reviews`,
/// `requested_reviewers` and `status_checks` are filled in by
/// `TrackerService::get_request`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateRequest {
    /// PR number / MR iid
    pub number: u64,
    /// Title
    pub title: String,
    /// Body/description
    pub body: String,
    /// Author login
    pub author: String,
    /// Open, merged or closed
    pub state: PrState,
    /// Whether the request is a draft
    pub is_draft: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Submitted reviews, oldest first
    pub reviews: Vec<Review>,
    /// Logins whose review is requested but not yet given
    pub requested_reviewers: Vec<String>,
    /// CI checks on the head commit
    pub status_checks: Vec<StatusCheck>,
    /// Conflict status
    pub mergeable: Mergeable,
    /// Web URL
    pub html_url: String,
}

/// Detected platform type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    /// GitHub or GitHub Enterprise
    GitHub,
    /// GitLab or self-hosted GitLab
    GitLab,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GitHub => write!(f, "GitHub"),
            Self::GitLab => write!(f, "GitLab"),
        }
    }
}

/// Platform configuration
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Platform type
    pub platform: Platform,
    /// Repository owner (user, organization or group path)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// API base URL (e.g. `https://api.github.com`, `https://gitlab.com`)
    pub base_url: String,
}

/// Result of a merge operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Whether the merge was successful
    pub merged: bool,
    /// The SHA of the merge commit (if successful)
    pub sha: Option<String>,
    /// Message from the merge operation (especially on failure)
    pub message: Option<String>,
}

/// Commit metadata for a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCommit {
    /// Commit title
    pub title: String,
    /// Commit message body
    pub message: String,
}
