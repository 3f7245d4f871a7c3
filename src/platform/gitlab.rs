//! GitLab tracker service implementation

use super::cache::UserCache;
use super::{DEFAULT_LABEL_COLOR, TrackerService, USER_CACHE_CAPACITY};
use crate::error::{Error, Result};
use crate::types::{
    CandidateRequest, CheckOutcome, IssueEvent, IssueState, MergeCommit, MergeResult,
    Mergeable, NewIssue, PlatformConfig, PrState, Review, ReviewVerdict, StatusCheck,
    TrackedIssue,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PAGE_SIZE: u8 = 100;

/// GitLab service using reqwest
pub struct GitLabService {
    client: Client,
    token: String,
    config: PlatformConfig,
    project_path: String,
    /// Login -> user id (None when the user does not exist)
    users: UserCache<Option<u64>>,
}

#[derive(Deserialize)]
struct User {
    id: u64,
    username: String,
}

#[derive(Deserialize)]
struct Issue {
    iid: u64,
    title: String,
    description: Option<String>,
    state: String, // "opened", "closed"
    #[serde(default)]
    assignees: Vec<User>,
    #[serde(default)]
    labels: Vec<String>,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    web_url: String,
}

impl From<Issue> for TrackedIssue {
    fn from(issue: Issue) -> Self {
        Self {
            remote_id: issue.iid,
            title: issue.title,
            body: issue.description.unwrap_or_default(),
            state: if issue.state == "opened" {
                IssueState::Open
            } else {
                IssueState::Closed
            },
            assignees: issue.assignees.into_iter().map(|u| u.username).collect(),
            labels: issue.labels,
            created_at: issue.created_at,
            closed_at: issue.closed_at,
            html_url: issue.web_url,
        }
    }
}

#[derive(Serialize)]
struct CreateIssuePayload {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    assignee_ids: Vec<u64>,
}

#[derive(Deserialize)]
struct Label {
    name: String,
}

#[derive(Deserialize)]
struct Note {
    author: Option<User>,
    #[serde(default)]
    system: bool,
    created_at: Option<DateTime<Utc>>,
}

/// Entry of `resource_state_events`
#[derive(Deserialize)]
struct StateEvent {
    user: Option<User>,
    state: String, // "closed", "reopened"
    created_at: Option<DateTime<Utc>>,
    source_commit: Option<String>,
    source_merge_request: Option<StateEventSource>,
}

#[derive(Deserialize)]
struct StateEventSource {
    merge_commit_sha: Option<String>,
    squash_commit_sha: Option<String>,
}

impl From<StateEvent> for IssueEvent {
    fn from(event: StateEvent) -> Self {
        // A merge request closing the issue is identified by the commit it landed as
        let commit_id = event.source_commit.or_else(|| {
            event
                .source_merge_request
                .and_then(|mr| mr.squash_commit_sha.or(mr.merge_commit_sha))
        });
        Self {
            kind: event.state,
            actor: event.user.map(|u| u.username),
            commit_id,
            created_at: event.created_at,
        }
    }
}

#[derive(Deserialize)]
struct MergeRequestRef {
    iid: u64,
}

#[derive(Deserialize)]
struct MergeRequest {
    iid: u64,
    title: String,
    description: Option<String>,
    author: Option<User>,
    state: String, // "opened", "closed", "locked", "merged"
    #[serde(default)]
    draft: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    merge_status: String, // "can_be_merged", "cannot_be_merged", "checking", ...
    web_url: String,
}

impl From<MergeRequest> for CandidateRequest {
    fn from(mr: MergeRequest) -> Self {
        let state = match mr.state.as_str() {
            "opened" => PrState::Open,
            "merged" => PrState::Merged,
            _ => PrState::Closed,
        };
        let mergeable = match mr.merge_status.as_str() {
            "can_be_merged" => Mergeable::Yes,
            "cannot_be_merged" => Mergeable::No,
            _ => Mergeable::Unknown,
        };
        Self {
            number: mr.iid,
            title: mr.title,
            body: mr.description.unwrap_or_default(),
            author: mr.author.map(|a| a.username).unwrap_or_default(),
            state,
            is_draft: mr.draft,
            created_at: mr.created_at,
            reviews: Vec::new(),
            requested_reviewers: Vec::new(),
            status_checks: Vec::new(),
            mergeable,
            html_url: mr.web_url,
        }
    }
}

/// Reviewer assignment with its review state
#[derive(Deserialize)]
struct MrReviewer {
    user: User,
    state: String, // "unreviewed", "reviewed", "requested_changes", "approved", "unapproved"
}

/// MR approvals response
#[derive(Deserialize)]
struct MrApprovals {
    #[serde(default)]
    approved_by: Vec<Approver>,
}

#[derive(Deserialize)]
struct Approver {
    user: User,
}

/// Pipeline status
#[derive(Deserialize)]
struct Pipeline {
    status: String,
}

/// Merge response
#[derive(Deserialize)]
struct MergeResponse {
    state: String,
    merge_commit_sha: Option<String>,
    squash_commit_sha: Option<String>,
}

fn pipeline_outcome(status: &str) -> CheckOutcome {
    match status {
        "success" => CheckOutcome::Success,
        "running" => CheckOutcome::InProgress,
        "skipped" | "manual" => CheckOutcome::Skipped,
        "failed" | "canceled" => CheckOutcome::Failure,
        _ => CheckOutcome::Pending,
    }
}

fn reviews_from(reviewers: Vec<MrReviewer>, approvals: MrApprovals) -> (Vec<Review>, Vec<String>) {
    let mut reviews = Vec::new();
    let mut requested = Vec::new();
    for reviewer in reviewers {
        let verdict = match reviewer.state.as_str() {
            "requested_changes" => ReviewVerdict::ChangesRequested,
            "approved" => ReviewVerdict::Approved,
            "reviewed" => ReviewVerdict::Commented,
            "unapproved" => ReviewVerdict::Dismissed,
            _ => {
                requested.push(reviewer.user.username);
                continue;
            }
        };
        reviews.push(Review {
            reviewer: reviewer.user.username,
            verdict,
        });
    }
    // Approvals can come from users who were never requested as reviewers
    for approver in approvals.approved_by {
        let login = approver.user.username;
        if !reviews
            .iter()
            .any(|r| r.reviewer == login && r.verdict == ReviewVerdict::Approved)
        {
            requested.retain(|r| *r != login);
            reviews.push(Review {
                reviewer: login,
                verdict: ReviewVerdict::Approved,
            });
        }
    }
    (reviews, requested)
}

impl GitLabService {
    /// Create a new GitLab service
    pub fn new(token: &str, config: PlatformConfig) -> Result<Self> {
        let project_path = format!("{}/{}", config.owner, config.repo);

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::GitLabApi(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: token.to_string(),
            config,
            project_path,
            users: UserCache::new(USER_CACHE_CAPACITY),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.config.base_url, path)
    }

    fn project_url(&self, path: &str) -> String {
        self.api_url(&format!(
            "/projects/{}{}",
            urlencoding::encode(&self.project_path),
            path
        ))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        Ok(self
            .request(Method::GET, url)
            .query(query)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?
            .json()
            .await?)
    }

    /// Fetch every page of a list endpoint
    async fn get_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let mut params = query.to_vec();
            params.push(("per_page", PAGE_SIZE.to_string()));
            params.push(("page", page.to_string()));
            let batch: Vec<T> = self.get_json(url, &params).await?;
            let done = batch.len() < usize::from(PAGE_SIZE);
            items.extend(batch);
            if done {
                return Ok(items);
            }
            page += 1;
        }
    }

    async fn user_id(&self, login: &str) -> Result<Option<u64>> {
        if let Some(cached) = self.users.get(login) {
            return Ok(cached);
        }
        let users: Vec<User> = self
            .get_json(&self.api_url("/users"), &[("username", login.to_string())])
            .await?;
        let id = users
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(login))
            .map(|u| u.id);
        self.users.insert(login, id);
        Ok(id)
    }

    async fn user_ids(&self, logins: &[String]) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for login in logins {
            if let Some(id) = self.user_id(login).await? {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl TrackerService for GitLabService {
    async fn current_user(&self) -> Result<String> {
        let user: User = self.get_json(&self.api_url("/user"), &[]).await?;
        debug!(login = %user.username, "resolved current user");
        Ok(user.username)
    }

    async fn list_tracked_issues(&self, label: &str) -> Result<Vec<TrackedIssue>> {
        debug!(label, "listing tracked issues");
        let issues: Vec<Issue> = self
            .get_all(
                &self.project_url("/issues"),
                &[
                    ("labels", label.to_string()),
                    ("scope", "all".to_string()),
                    ("order_by", "created_at".to_string()),
                    ("sort", "asc".to_string()),
                ],
            )
            .await?;
        let mut result: Vec<TrackedIssue> = issues.into_iter().map(Into::into).collect();
        result.sort_by_key(|i| (i.created_at, i.remote_id));
        debug!(count = result.len(), "listed tracked issues");
        Ok(result)
    }

    async fn get_issue(&self, number: u64) -> Result<TrackedIssue> {
        debug!(issue = number, "getting issue");
        let issue: Issue = self
            .get_json(&self.project_url(&format!("/issues/{number}")), &[])
            .await?;
        Ok(issue.into())
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<TrackedIssue> {
        debug!(title = %issue.title, "creating issue");
        let payload = CreateIssuePayload {
            title: issue.title.clone(),
            description: issue.body.clone(),
            labels: (!issue.labels.is_empty()).then(|| issue.labels.join(",")),
            assignee_ids: self.user_ids(&issue.assignees).await?,
        };

        let created: Issue = self
            .request(Method::POST, &self.project_url("/issues"))
            .json(&payload)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?
            .json()
            .await?;

        let result: TrackedIssue = created.into();
        debug!(issue = result.remote_id, "created issue");
        Ok(result)
    }

    async fn close_issue(&self, number: u64) -> Result<()> {
        debug!(issue = number, "closing issue");
        self.request(Method::PUT, &self.project_url(&format!("/issues/{number}")))
            .json(&serde_json::json!({ "state_event": "close" }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(format!("failed to close issue #{number}: {e}")))?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<String>> {
        debug!("listing labels");
        let labels: Vec<Label> = self.get_all(&self.project_url("/labels"), &[]).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn create_label(&self, name: &str) -> Result<()> {
        debug!(name, "creating label");
        self.request(Method::POST, &self.project_url("/labels"))
            .json(&serde_json::json!({ "name": name, "color": format!("#{DEFAULT_LABEL_COLOR}") }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(format!("failed to create label {name}: {e}")))?;
        Ok(())
    }

    async fn resolve_assignees(&self, logins: &[String]) -> Result<Vec<String>> {
        let mut valid = Vec::new();
        for login in logins {
            if self.user_id(login).await?.is_some() {
                valid.push(login.clone());
            } else {
                debug!(login = %login, "dropping unknown assignee");
            }
        }
        Ok(valid)
    }

    async fn list_issue_events(&self, number: u64) -> Result<Vec<IssueEvent>> {
        debug!(issue = number, "listing issue notes and state events");
        let notes: Vec<Note> = self
            .get_all(
                &self.project_url(&format!("/issues/{number}/notes")),
                &[("sort", "asc".to_string())],
            )
            .await?;
        let states: Vec<StateEvent> = self
            .get_all(
                &self.project_url(&format!("/issues/{number}/resource_state_events")),
                &[],
            )
            .await?;

        let mut result: Vec<IssueEvent> = notes
            .into_iter()
            .map(|n| IssueEvent {
                kind: if n.system { "system" } else { "note" }.to_string(),
                actor: n.author.map(|a| a.username),
                commit_id: None,
                created_at: n.created_at,
            })
            .chain(states.into_iter().map(Into::into))
            .collect();
        result.sort_by_key(|e| e.created_at);
        debug!(issue = number, count = result.len(), "listed issue events");
        Ok(result)
    }

    async fn closing_requests(&self, number: u64) -> Result<Vec<u64>> {
        debug!(issue = number, "listing closing merge requests");
        let mrs: Vec<MergeRequestRef> = self
            .get_json(&self.project_url(&format!("/issues/{number}/closed_by")), &[])
            .await?;
        Ok(mrs.into_iter().map(|mr| mr.iid).collect())
    }

    async fn list_recent_requests(&self, limit: u8) -> Result<Vec<CandidateRequest>> {
        debug!(limit, "listing recent MRs");
        let mrs: Vec<MergeRequest> = self
            .get_json(
                &self.project_url("/merge_requests"),
                &[
                    ("state", "all".to_string()),
                    ("order_by", "created_at".to_string()),
                    ("sort", "desc".to_string()),
                    ("per_page", limit.to_string()),
                ],
            )
            .await?;
        let result: Vec<CandidateRequest> = mrs.into_iter().map(Into::into).collect();
        debug!(count = result.len(), "listed recent MRs");
        Ok(result)
    }

    async fn get_request(&self, number: u64) -> Result<CandidateRequest> {
        debug!(mr_iid = number, "getting MR details");
        let mr: MergeRequest = self
            .get_json(&self.project_url(&format!("/merge_requests/{number}")), &[])
            .await?;
        let mut request: CandidateRequest = mr.into();

        let reviewers: Vec<MrReviewer> = self
            .get_json(
                &self.project_url(&format!("/merge_requests/{number}/reviewers")),
                &[],
            )
            .await?;
        let approvals: MrApprovals = self
            .get_json(
                &self.project_url(&format!("/merge_requests/{number}/approvals")),
                &[],
            )
            .await?;
        (request.reviews, request.requested_reviewers) = reviews_from(reviewers, approvals);

        // Most recent pipeline stands in for the MR's checks
        let pipelines: Vec<Pipeline> = self
            .get_json(
                &self.project_url(&format!("/merge_requests/{number}/pipelines")),
                &[],
            )
            .await?;
        request.status_checks = pipelines
            .first()
            .map(|p| StatusCheck {
                name: "pipeline".to_string(),
                outcome: pipeline_outcome(&p.status),
            })
            .into_iter()
            .collect();

        debug!(
            mr_iid = number,
            state = %request.state,
            mergeable = ?request.mergeable,
            "got MR details"
        );
        Ok(request)
    }

    async fn approve_request(&self, number: u64, body: &str) -> Result<()> {
        debug!(mr_iid = number, "approving MR");
        self.request(
            Method::POST,
            &self.project_url(&format!("/merge_requests/{number}/approve")),
        )
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::GitLabApi(format!("approval failed: {e}")))?;

        if !body.is_empty() {
            self.request(
                Method::POST,
                &self.project_url(&format!("/merge_requests/{number}/notes")),
            )
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(e.to_string()))?;
        }
        debug!(mr_iid = number, "approved MR");
        Ok(())
    }

    async fn merge_request(&self, number: u64, commit: &MergeCommit) -> Result<MergeResult> {
        debug!(mr_iid = number, "squash-merging MR");

        let body = serde_json::json!({
            "squash": true,
            "squash_commit_message": format!("{}\n\n{}", commit.title, commit.message),
        });

        let response: MergeResponse = self
            .request(
                Method::PUT,
                &self.project_url(&format!("/merge_requests/{number}/merge")),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitLabApi(format!("Merge failed: {e}")))?
            .json()
            .await?;

        let merge_result = MergeResult {
            merged: response.state == "merged",
            sha: response.squash_commit_sha.or(response.merge_commit_sha),
            message: None,
        };

        debug!(
            mr_iid = number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }
}
