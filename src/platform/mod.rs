//! Tracker services for GitHub and GitLab
//!
//! Provides a unified interface over issues and pull/merge requests so the
//! workflow can drive either platform.

mod cache;
mod github;
mod gitlab;

pub use github::GitHubService;
pub use gitlab::GitLabService;

use crate::config::Config;
use crate::error::Result;
use crate::types::{
    CandidateRequest, IssueEvent, MergeCommit, MergeResult, NewIssue, Platform, TrackedIssue,
};
use async_trait::async_trait;

/// Color given to labels created during dispatch
pub const DEFAULT_LABEL_COLOR: &str = "ededed";

/// Upper bound on cached user lookups per client
pub(crate) const USER_CACHE_CAPACITY: usize = 256;

/// Tracker service trait
///
/// This trait abstracts GitHub and GitLab operations, allowing the same
/// workflow to run against either platform. Request numbers are PR numbers
/// on GitHub and MR iids on GitLab.
#[async_trait]
pub trait TrackerService: Send + Sync {
    /// Login of the authenticated user
    async fn current_user(&self) -> Result<String>;

    /// All issues carrying `label`, in any state, oldest first
    async fn list_tracked_issues(&self, label: &str) -> Result<Vec<TrackedIssue>>;

    /// Fetch one issue
    async fn get_issue(&self, number: u64) -> Result<TrackedIssue>;

    /// Create an issue
    async fn create_issue(&self, issue: &NewIssue) -> Result<TrackedIssue>;

    /// Close an issue as the authenticated user
    async fn close_issue(&self, number: u64) -> Result<()>;

    /// Names of every label defined on the repository
    async fn list_labels(&self) -> Result<Vec<String>>;

    /// Create a label with the default color
    async fn create_label(&self, name: &str) -> Result<()>;

    /// Keep only the logins that exist on the tracker
    ///
    /// Lookups are cached for the lifetime of the client.
    async fn resolve_assignees(&self, logins: &[String]) -> Result<Vec<String>>;

    /// Timeline events of an issue, oldest first
    ///
    /// Closing events carry the commit that closed the issue, when one did.
    async fn list_issue_events(&self, number: u64) -> Result<Vec<IssueEvent>>;

    /// Numbers of requests that reference the issue as one they close
    async fn closing_requests(&self, number: u64) -> Result<Vec<u64>>;

    /// Most recently created requests in any state, summaries only
    async fn list_recent_requests(&self, limit: u8) -> Result<Vec<CandidateRequest>>;

    /// Full request record including reviews, checks and mergeability
    async fn get_request(&self, number: u64) -> Result<CandidateRequest>;

    /// Submit an approving review
    async fn approve_request(&self, number: u64, body: &str) -> Result<()>;

    /// Squash-merge a request with the given commit metadata
    async fn merge_request(&self, number: u64, commit: &MergeCommit) -> Result<MergeResult>;
}

/// Create the tracker service selected by `config`
pub fn create_tracker_service(config: &Config) -> Result<Box<dyn TrackerService>> {
    let platform_config = config.platform_config();
    Ok(match config.platform {
        Platform::GitHub => Box::new(GitHubService::new(&config.token, platform_config)?),
        Platform::GitLab => Box::new(GitLabService::new(&config.token, platform_config)?),
    })
}
