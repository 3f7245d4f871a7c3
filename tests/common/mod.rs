//! Shared test fixtures

#![allow(dead_code)]

mod mock_tracker;

pub use mock_tracker::{MergeCall, MockTrackerService};

use chrono::{DateTime, Utc};
use issue_queue::config::{MergeSettings, WorkflowSettings};
use issue_queue::types::{
    CandidateRequest, CheckOutcome, IssueState, Mergeable, PrState, Review, ReviewVerdict,
    StatusCheck, TrackedIssue,
};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Parse an RFC 3339 timestamp
pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid timestamp")
}

/// Open issue created at `created_at`, labelled for tracking
pub fn make_issue(number: u64, title: &str, created_at: DateTime<Utc>) -> TrackedIssue {
    TrackedIssue {
        remote_id: number,
        title: title.to_string(),
        body: String::new(),
        state: IssueState::Open,
        assignees: vec!["copilot-swe-agent".to_string()],
        labels: vec!["auto-generated".to_string()],
        created_at,
        closed_at: None,
        html_url: format!("https://github.com/octo/widgets/issues/{number}"),
    }
}

/// Closed variant of [`make_issue`]
pub fn make_closed_issue(number: u64, title: &str, created_at: DateTime<Utc>) -> TrackedIssue {
    TrackedIssue {
        state: IssueState::Closed,
        closed_at: Some(created_at + chrono::Duration::hours(1)),
        ..make_issue(number, title, created_at)
    }
}

/// Open, mergeable, agent-authored request with no reviews or checks
pub fn make_request(number: u64, title: &str, created_at: DateTime<Utc>) -> CandidateRequest {
    CandidateRequest {
        number,
        title: title.to_string(),
        body: String::new(),
        author: "Copilot".to_string(),
        state: PrState::Open,
        is_draft: false,
        created_at,
        reviews: vec![],
        requested_reviewers: vec![],
        status_checks: vec![],
        mergeable: Mergeable::Yes,
        html_url: format!("https://github.com/octo/widgets/pull/{number}"),
    }
}

/// Submitted review
pub fn review(reviewer: &str, verdict: ReviewVerdict) -> Review {
    Review {
        reviewer: reviewer.to_string(),
        verdict,
    }
}

/// CI check
pub fn check(name: &str, outcome: CheckOutcome) -> StatusCheck {
    StatusCheck {
        name: name.to_string(),
        outcome,
    }
}

/// Workflow settings that never sleep
pub fn test_settings() -> WorkflowSettings {
    WorkflowSettings {
        merge: MergeSettings {
            settle_delay: Duration::ZERO,
            retry_interval: Duration::from_millis(5),
            timeout: Duration::ZERO,
        },
        ..WorkflowSettings::default()
    }
}

/// Temp directory holding an `issues/` work item directory
pub struct TempQueue {
    pub dir: TempDir,
}

impl TempQueue {
    /// Create with the given `(filename, content)` work items
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir(dir.path().join("issues")).expect("issues dir");
        let queue = Self { dir };
        for (name, content) in files {
            queue.write(name, content);
        }
        queue
    }

    /// Add or replace a work item
    pub fn write(&self, name: &str, content: &str) {
        fs::write(self.issues_dir().join(name), content).expect("write work item");
    }

    pub fn issues_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("issues")
    }

    pub fn state_file(&self) -> std::path::PathBuf {
        self.dir.path().join("processed_files.json")
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
