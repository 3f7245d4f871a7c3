//! Mock tracker service for testing
//!
//! These are test utilities - not all may be used in current tests but are
//! available for future test development.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use issue_queue::error::{Error, Result};
use issue_queue::platform::TrackerService;
use issue_queue::types::{
    CandidateRequest, IssueEvent, IssueState, MergeCommit, MergeResult, NewIssue, PrState,
    TrackedIssue,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Call record for `merge_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCall {
    pub number: u64,
    pub commit: MergeCommit,
}

/// In-memory tracker for testing
///
/// This manually implements `TrackerService` rather than using mockall,
/// because mockall has issues with methods returning references.
///
/// Features:
/// - Auto-incrementing issue numbers, creation times one minute apart
/// - Issues, labels, requests, events and closing references held in memory
/// - Call tracking for verification
/// - Error injection for failure path testing
pub struct MockTrackerService {
    current_user: String,
    next_issue_number: AtomicU64,
    clock: Mutex<DateTime<Utc>>,
    issues: Mutex<Vec<TrackedIssue>>,
    labels: Mutex<Vec<String>>,
    /// None means every login exists
    known_users: Mutex<Option<Vec<String>>>,
    events: Mutex<HashMap<u64, Vec<IssueEvent>>>,
    closing: Mutex<HashMap<u64, Vec<u64>>>,
    requests: Mutex<Vec<CandidateRequest>>,
    // Call tracking
    create_issue_calls: Mutex<Vec<NewIssue>>,
    create_label_calls: Mutex<Vec<String>>,
    approve_calls: Mutex<Vec<u64>>,
    merge_calls: Mutex<Vec<MergeCall>>,
    close_issue_calls: Mutex<Vec<u64>>,
    // Error injection
    error_on_list_issues: Mutex<Option<String>>,
    error_on_create_issue: Mutex<Option<String>>,
    error_on_merge: Mutex<Option<String>>,
}

impl Default for MockTrackerService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTrackerService {
    /// Create an empty tracker authenticated as `maintainer`
    pub fn new() -> Self {
        Self {
            current_user: "maintainer".to_string(),
            next_issue_number: AtomicU64::new(1),
            clock: Mutex::new(
                "2024-01-01T00:00:00Z"
                    .parse()
                    .expect("valid timestamp"),
            ),
            issues: Mutex::new(Vec::new()),
            labels: Mutex::new(Vec::new()),
            known_users: Mutex::new(None),
            events: Mutex::new(HashMap::new()),
            closing: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            create_issue_calls: Mutex::new(Vec::new()),
            create_label_calls: Mutex::new(Vec::new()),
            approve_calls: Mutex::new(Vec::new()),
            merge_calls: Mutex::new(Vec::new()),
            close_issue_calls: Mutex::new(Vec::new()),
            error_on_list_issues: Mutex::new(None),
            error_on_create_issue: Mutex::new(None),
            error_on_merge: Mutex::new(None),
        }
    }


    fn tick_clock(&self) -> DateTime<Utc> {
        let mut clock = self.clock.lock().unwrap();
        *clock += chrono::Duration::minutes(1);
        *clock
    }

    // === Error injection methods ===

    /// Make `list_tracked_issues` return an error
    pub fn fail_list_issues(&self, msg: &str) {
        *self.error_on_list_issues.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `create_issue` return an error
    pub fn fail_create_issue(&self, msg: &str) {
        *self.error_on_create_issue.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `merge_request` return an error
    pub fn fail_merge(&self, msg: &str) {
        *self.error_on_merge.lock().unwrap() = Some(msg.to_string());
    }

    // === State setup ===

    /// Add an existing issue
    pub fn add_issue(&self, issue: TrackedIssue) {
        let mut issues = self.issues.lock().unwrap();
        issues.push(issue);
        issues.sort_by_key(|i| (i.created_at, i.remote_id));
        let max = issues.iter().map(|i| i.remote_id).max().unwrap_or(0);
        self.next_issue_number.store(max + 1, Ordering::SeqCst);
    }

    /// Close an issue by hand; `referenced_by` requests say they close it
    pub fn close_manually(&self, number: u64, referenced_by: &[u64]) {
        self.close(number, "maintainer", None, referenced_by);
    }

    /// Close an issue through a landed commit
    pub fn close_by_commit(&self, number: u64, sha: &str, referenced_by: &[u64]) {
        self.close(number, "maintainer", Some(sha), referenced_by);
    }

    fn close(&self, number: u64, actor: &str, sha: Option<&str>, referenced_by: &[u64]) {
        let closed_at = self.tick_clock();
        if let Some(issue) = self
            .issues
            .lock()
            .unwrap()
            .iter_mut()
            .find(|i| i.remote_id == number)
        {
            issue.state = IssueState::Closed;
            issue.closed_at = Some(closed_at);
        }
        self.events
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .push(IssueEvent {
                kind: IssueEvent::CLOSED.to_string(),
                actor: Some(actor.to_string()),
                commit_id: sha.map(ToString::to_string),
                created_at: Some(closed_at),
            });
        let mut closing = self.closing.lock().unwrap();
        let refs = closing.entry(number).or_default();
        for request in referenced_by {
            if !refs.contains(request) {
                refs.push(*request);
            }
        }
    }

    /// Replace an issue's assignees
    pub fn assign(&self, number: u64, logins: &[&str]) {
        if let Some(issue) = self
            .issues
            .lock()
            .unwrap()
            .iter_mut()
            .find(|i| i.remote_id == number)
        {
            issue.assignees = logins.iter().map(ToString::to_string).collect();
        }
    }

    /// Add a timeline event
    pub fn add_event(&self, number: u64, kind: &str, actor: &str) {
        self.events
            .lock()
            .unwrap()
            .entry(number)
            .or_default()
            .push(IssueEvent {
                kind: kind.to_string(),
                actor: Some(actor.to_string()),
                commit_id: None,
                created_at: None,
            });
    }

    /// Add or replace a request
    pub fn set_request(&self, request: CandidateRequest) {
        let mut requests = self.requests.lock().unwrap();
        requests.retain(|r| r.number != request.number);
        requests.push(request);
    }

    /// Pre-existing repository labels
    pub fn set_labels(&self, labels: &[&str]) {
        *self.labels.lock().unwrap() = labels.iter().map(ToString::to_string).collect();
    }

    /// Restrict which logins exist
    pub fn set_known_users(&self, logins: &[&str]) {
        *self.known_users.lock().unwrap() =
            Some(logins.iter().map(ToString::to_string).collect());
    }

    /// Time the next created issue will get, minus one tick
    pub fn now(&self) -> DateTime<Utc> {
        *self.clock.lock().unwrap()
    }

    // === Call tracking ===

    pub fn issues(&self) -> Vec<TrackedIssue> {
        self.issues.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().unwrap().clone()
    }

    pub fn get_create_issue_calls(&self) -> Vec<NewIssue> {
        self.create_issue_calls.lock().unwrap().clone()
    }

    pub fn get_create_label_calls(&self) -> Vec<String> {
        self.create_label_calls.lock().unwrap().clone()
    }

    pub fn get_approve_calls(&self) -> Vec<u64> {
        self.approve_calls.lock().unwrap().clone()
    }

    pub fn get_merge_calls(&self) -> Vec<MergeCall> {
        self.merge_calls.lock().unwrap().clone()
    }

    pub fn get_close_issue_calls(&self) -> Vec<u64> {
        self.close_issue_calls.lock().unwrap().clone()
    }

    /// Tracker state of one issue
    pub fn issue(&self, number: u64) -> Option<TrackedIssue> {
        self.issues()
            .into_iter()
            .find(|i| i.remote_id == number)
    }

    pub fn create_issue_count(&self) -> usize {
        self.create_issue_calls.lock().unwrap().len()
    }

    pub fn merge_call_count(&self) -> usize {
        self.merge_calls.lock().unwrap().len()
    }

    pub fn assert_issue_created(&self, title: &str) {
        let calls = self.get_create_issue_calls();
        assert!(
            calls.iter().any(|c| c.title == title),
            "Expected create_issue with title '{title}', got: {calls:?}"
        );
    }

    pub fn assert_no_issue_created(&self) {
        let calls = self.get_create_issue_calls();
        assert!(calls.is_empty(), "Expected no create_issue, got: {calls:?}");
    }

    pub fn assert_merge_called(&self, number: u64) {
        let calls = self.get_merge_calls();
        assert!(
            calls.iter().any(|c| c.number == number),
            "Expected merge_request({number}), got: {calls:?}"
        );
    }

    pub fn assert_merge_not_called(&self) {
        let calls = self.get_merge_calls();
        assert!(calls.is_empty(), "Expected no merge_request, got: {calls:?}");
    }
}

#[async_trait]
impl TrackerService for MockTrackerService {
    async fn current_user(&self) -> Result<String> {
        Ok(self.current_user.clone())
    }

    async fn list_tracked_issues(&self, label: &str) -> Result<Vec<TrackedIssue>> {
        if let Some(msg) = self.error_on_list_issues.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }
        Ok(self
            .issues
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.labels.iter().any(|l| l.eq_ignore_ascii_case(label)))
            .cloned()
            .collect())
    }

    async fn get_issue(&self, number: u64) -> Result<TrackedIssue> {
        self.issues
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.remote_id == number)
            .cloned()
            .ok_or_else(|| Error::Platform(format!("issue #{number} not found")))
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<TrackedIssue> {
        if let Some(msg) = self.error_on_create_issue.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }
        self.create_issue_calls.lock().unwrap().push(issue.clone());

        let number = self.next_issue_number.fetch_add(1, Ordering::SeqCst);
        let created = TrackedIssue {
            remote_id: number,
            title: issue.title.clone(),
            body: issue.body.clone(),
            state: IssueState::Open,
            assignees: issue.assignees.clone(),
            labels: issue.labels.clone(),
            created_at: self.tick_clock(),
            closed_at: None,
            html_url: format!("https://github.com/octo/widgets/issues/{number}"),
        };
        self.issues.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn close_issue(&self, number: u64) -> Result<()> {
        self.close_issue_calls.lock().unwrap().push(number);
        if self.issue(number).is_none() {
            return Err(Error::Platform(format!("issue #{number} not found")));
        }
        let actor = self.current_user.clone();
        self.close(number, &actor, None, &[]);
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<String>> {
        Ok(self.labels())
    }

    async fn create_label(&self, name: &str) -> Result<()> {
        self.create_label_calls.lock().unwrap().push(name.to_string());
        self.labels.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn resolve_assignees(&self, logins: &[String]) -> Result<Vec<String>> {
        let known = self.known_users.lock().unwrap().clone();
        Ok(logins
            .iter()
            .filter(|l| {
                known
                    .as_ref()
                    .is_none_or(|k| k.iter().any(|u| u.eq_ignore_ascii_case(l)))
            })
            .cloned()
            .collect())
    }

    async fn list_issue_events(&self, number: u64) -> Result<Vec<IssueEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn closing_requests(&self, number: u64) -> Result<Vec<u64>> {
        Ok(self
            .closing
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_recent_requests(&self, limit: u8) -> Result<Vec<CandidateRequest>> {
        let mut requests = self.requests.lock().unwrap().clone();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests.truncate(usize::from(limit));
        Ok(requests)
    }

    async fn get_request(&self, number: u64) -> Result<CandidateRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.number == number)
            .cloned()
            .ok_or_else(|| Error::Platform(format!("request #{number} not found")))
    }

    async fn approve_request(&self, number: u64, _body: &str) -> Result<()> {
        self.approve_calls.lock().unwrap().push(number);
        Ok(())
    }

    async fn merge_request(&self, number: u64, commit: &MergeCommit) -> Result<MergeResult> {
        if let Some(msg) = self.error_on_merge.lock().unwrap().as_ref() {
            return Err(Error::Platform(msg.clone()));
        }
        self.merge_calls.lock().unwrap().push(MergeCall {
            number,
            commit: commit.clone(),
        });
        if let Some(request) = self
            .requests
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.number == number)
        {
            request.state = PrState::Merged;
        }
        // Like the real trackers, "Resolves #N" in the squash commit closes the issue
        let sha = format!("sha{number}");
        if let Some(issue) = commit
            .message
            .strip_prefix("Resolves #")
            .and_then(|n| n.trim().parse::<u64>().ok())
        {
            self.close_by_commit(issue, &sha, &[number]);
        }
        Ok(MergeResult {
            merged: true,
            sha: Some(sha),
            message: None,
        })
    }
}
