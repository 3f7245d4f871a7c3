//! GitHub tracker service implementation

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
use octocrab::Octocrab;
use octocrab::params::{Direction, State};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: u8 = 100;

// GraphQL response types for the closing-references query

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct ClosingData {
    repository: Option<ClosingRepository>,
}

#[derive(Deserialize)]
struct ClosingRepository {
    issue: Option<ClosingIssue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClosingIssue {
    closed_by_pull_requests_references: ClosingConnection,
}

#[derive(Deserialize)]
struct ClosingConnection {
    nodes: Vec<ClosingNode>,
}

#[derive(Deserialize)]
struct ClosingNode {
    number: u64,
}

// Raw REST payloads not covered by octocrab models

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
struct LabelPayload {
    name: String,
}

#[derive(Deserialize)]
struct TimelineEvent {
    #[serde(default)]
    event: Option<String>,
    actor: Option<Login>,
    user: Option<Login>,
    commit_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct CheckRunsResponse {
    check_runs: Vec<CheckRun>,
}

#[derive(Deserialize)]
struct CheckRun {
    name: String,
    status: String,
    conclusion: Option<String>,
}

#[derive(Deserialize)]
struct CombinedStatus {
    statuses: Vec<CommitStatus>,
}

#[derive(Deserialize)]
struct CommitStatus {
    context: String,
    state: String,
}

/// GitHub service using octocrab
pub struct GitHubService {
    client: Octocrab,
    config: PlatformConfig,
    /// Token for raw HTTP requests
    token: String,
    /// HTTP client for endpoints octocrab does not model
    http_client: Client,
    users: UserCache<bool>,
}

impl GitHubService {
    /// Create a new GitHub service
    pub fn new(token: &str, config: PlatformConfig) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .base_uri(config.base_url.as_str())
            .map_err(|e| Error::GitHubApi(e.to_string()))?
            .build()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;

        let http_client = Client::builder()
            .user_agent(concat!("issue-queue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::GitHubApi(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            token: token.to_string(),
            http_client,
            users: UserCache::new(USER_CACHE_CAPACITY),
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.config.base_url, self.config.owner, self.config.repo, path
        )
    }

    fn raw(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .raw(Method::GET, url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitHubApi(e.to_string()))?;
        Ok(response.json().await?)
    }

    /// Combine check runs (GitHub Actions) and legacy commit statuses
    ///
    /// Either API answering with an error status is treated as "no checks
    /// configured" for that API.
    async fn status_checks(&self, sha: &str) -> Result<Vec<StatusCheck>> {
        let mut checks = Vec::new();

        let response = self
            .raw(Method::GET, &self.repo_url(&format!("/commits/{sha}/check-runs")))
            .query(&[("per_page", PAGE_SIZE)])
            .send()
            .await?;
        if response.status().is_success() {
            let runs: CheckRunsResponse = response.json().await?;
            checks.extend(runs.check_runs.into_iter().map(|run| StatusCheck {
                outcome: check_run_outcome(&run.status, run.conclusion.as_deref()),
                name: run.name,
            }));
        } else {
            debug!(status = %response.status(), "check runs unavailable");
        }

        let response = self
            .raw(Method::GET, &self.repo_url(&format!("/commits/{sha}/status")))
            .send()
            .await?;
        if response.status().is_success() {
            let combined: CombinedStatus = response.json().await?;
            checks.extend(combined.statuses.into_iter().map(|s| StatusCheck {
                outcome: commit_status_outcome(&s.state),
                name: s.context,
            }));
        } else {
            debug!(status = %response.status(), "commit statuses unavailable");
        }

        Ok(checks)
    }

    async fn user_exists(&self, login: &str) -> Result<bool> {
        let url = format!(
            "{}/users/{}",
            self.config.base_url,
            urlencoding::encode(login)
        );
        let response = self.raw(Method::GET, &url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(Error::GitHubApi(format!(
                "user lookup for {login} returned {status}"
            ))),
        }
    }
}

fn check_run_outcome(status: &str, conclusion: Option<&str>) -> CheckOutcome {
    match (status, conclusion) {
        ("completed", Some("success")) => CheckOutcome::Success,
        ("completed", Some("neutral" | "skipped")) => CheckOutcome::Skipped,
        ("completed", _) => CheckOutcome::Failure,
        ("in_progress", _) => CheckOutcome::InProgress,
        _ => CheckOutcome::Pending,
    }
}

fn commit_status_outcome(state: &str) -> CheckOutcome {
    match state {
        "success" => CheckOutcome::Success,
        "pending" => CheckOutcome::Pending,
        _ => CheckOutcome::Failure,
    }
}

/// Helper to convert an octocrab issue to our `TrackedIssue` type
fn issue_from_octocrab(issue: octocrab::models::issues::Issue) -> TrackedIssue {
    let state = match issue.state {
        octocrab::models::IssueState::Open => IssueState::Open,
        // IssueState is non-exhaustive
        _ => IssueState::Closed,
    };
    TrackedIssue {
        remote_id: issue.number,
        title: issue.title,
        body: issue.body.unwrap_or_default(),
        state,
        assignees: issue.assignees.into_iter().map(|a| a.login).collect(),
        labels: issue.labels.into_iter().map(|l| l.name).collect(),
        created_at: issue.created_at,
        closed_at: issue.closed_at,
        html_url: issue.html_url.to_string(),
    }
}

/// Helper to convert an octocrab PR to a summary `CandidateRequest`
fn request_from_octocrab(pr: &octocrab::models::pulls::PullRequest) -> CandidateRequest {
    let state = match pr.state {
        Some(octocrab::models::IssueState::Open) => PrState::Open,
        _ if pr.merged_at.is_some() => PrState::Merged,
        _ => PrState::Closed,
    };
    CandidateRequest {
        number: pr.number,
        title: pr.title.clone().unwrap_or_default(),
        body: pr.body.clone().unwrap_or_default(),
        author: pr
            .user
            .as_ref()
            .map(|u| u.login.clone())
            .unwrap_or_default(),
        state,
        is_draft: pr.draft.unwrap_or(false),
        created_at: pr.created_at.unwrap_or_default(),
        reviews: Vec::new(),
        requested_reviewers: pr
            .requested_reviewers
            .as_ref()
            .map(|r| r.iter().map(|u| u.login.clone()).collect())
            .unwrap_or_default(),
        status_checks: Vec::new(),
        mergeable: Mergeable::from(pr.mergeable),
        html_url: pr
            .html_url
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
    }
}

fn review_from_octocrab(review: octocrab::models::pulls::Review) -> Option<Review> {
    use octocrab::models::pulls::ReviewState;

    let verdict = match review.state? {
        ReviewState::Approved => ReviewVerdict::Approved,
        ReviewState::ChangesRequested => ReviewVerdict::ChangesRequested,
        ReviewState::Pending => ReviewVerdict::Pending,
        ReviewState::Dismissed => ReviewVerdict::Dismissed,
        _ => ReviewVerdict::Commented,
    };
    Some(Review {
        reviewer: review.user?.login,
        verdict,
    })
}

#[async_trait]
impl TrackerService for GitHubService {
    async fn current_user(&self) -> Result<String> {
        let user = self.client.current().user().await?;
        debug!(login = %user.login, "resolved current user");
        Ok(user.login)
    }

    async fn list_tracked_issues(&self, label: &str) -> Result<Vec<TrackedIssue>> {
        debug!(label, "listing tracked issues");
        let labels = [label.to_string()];
        let page = self
            .client
            .issues(&self.config.owner, &self.config.repo)
            .list()
            .labels(&labels)
            .state(State::All)
            .direction(Direction::Ascending)
            .per_page(PAGE_SIZE)
            .send()
            .await?;
        let issues = self.client.all_pages(page).await?;

        let mut result: Vec<TrackedIssue> = issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(issue_from_octocrab)
            .collect();
        result.sort_by_key(|i| (i.created_at, i.remote_id));
        debug!(count = result.len(), "listed tracked issues");
        Ok(result)
    }

    async fn get_issue(&self, number: u64) -> Result<TrackedIssue> {
        debug!(issue = number, "getting issue");
        let issue = self
            .client
            .issues(&self.config.owner, &self.config.repo)
            .get(number)
            .await?;
        Ok(issue_from_octocrab(issue))
    }

    async fn create_issue(&self, issue: &NewIssue) -> Result<TrackedIssue> {
        debug!(title = %issue.title, "creating issue");
        let issues = self.client.issues(&self.config.owner, &self.config.repo);
        let mut builder = issues.create(&issue.title).body(&issue.body);
        if !issue.labels.is_empty() {
            builder = builder.labels(issue.labels.clone());
        }
        if !issue.assignees.is_empty() {
            builder = builder.assignees(issue.assignees.clone());
        }
        let created = builder.send().await?;

        let result = issue_from_octocrab(created);
        debug!(issue = result.remote_id, "created issue");
        Ok(result)
    }

    async fn close_issue(&self, number: u64) -> Result<()> {
        debug!(issue = number, "closing issue");
        self.client
            .issues(&self.config.owner, &self.config.repo)
            .update(number)
            .state(octocrab::models::IssueState::Closed)
            .send()
            .await?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<String>> {
        debug!("listing labels");
        let mut names = Vec::new();
        let mut page = 1u32;
        loop {
            let url = self.repo_url(&format!("/labels?per_page={PAGE_SIZE}&page={page}"));
            let batch: Vec<LabelPayload> = self.get_json(&url).await?;
            let done = batch.len() < usize::from(PAGE_SIZE);
            names.extend(batch.into_iter().map(|l| l.name));
            if done {
                break;
            }
            page += 1;
        }
        debug!(count = names.len(), "listed labels");
        Ok(names)
    }

    async fn create_label(&self, name: &str) -> Result<()> {
        debug!(name, "creating label");
        self.raw(Method::POST, &self.repo_url("/labels"))
            .json(&serde_json::json!({ "name": name, "color": DEFAULT_LABEL_COLOR }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitHubApi(format!("Failed to create label {name}: {e}")))?;
        Ok(())
    }

    async fn resolve_assignees(&self, logins: &[String]) -> Result<Vec<String>> {
        let mut valid = Vec::new();
        for login in logins {
            let exists = match self.users.get(login) {
                Some(cached) => cached,
                None => {
                    let exists = self.user_exists(login).await?;
                    self.users.insert(login, exists);
                    exists
                }
            };
            if exists {
                valid.push(login.clone());
            } else {
                debug!(login = %login, "dropping unknown assignee");
            }
        }
        Ok(valid)
    }

    async fn list_issue_events(&self, number: u64) -> Result<Vec<IssueEvent>> {
        debug!(issue = number, "listing issue timeline");
        let url = self.repo_url(&format!("/issues/{number}/timeline?per_page={PAGE_SIZE}"));
        let events: Vec<TimelineEvent> = self.get_json(&url).await?;
        let result: Vec<IssueEvent> = events
            .into_iter()
            .map(|e| IssueEvent {
                kind: e.event.unwrap_or_default(),
                actor: e.actor.or(e.user).map(|l| l.login),
                commit_id: e.commit_id,
                created_at: e.created_at,
            })
            .collect();
        debug!(issue = number, count = result.len(), "listed issue timeline");
        Ok(result)
    }

    async fn closing_requests(&self, number: u64) -> Result<Vec<u64>> {
        debug!(issue = number, "querying closing pull requests");
        let response: GraphQlResponse<ClosingData> = self
            .client
            .graphql(&serde_json::json!({
                "query": r"
                    query ClosingPullRequests($owner: String!, $repo: String!, $number: Int!) {
                        repository(owner: $owner, name: $repo) {
                            issue(number: $number) {
                                closedByPullRequestsReferences(first: 25, includeClosedPrs: true) {
                                    nodes { number }
                                }
                            }
                        }
                    }
                ",
                "variables": {
                    "owner": self.config.owner,
                    "repo": self.config.repo,
                    "number": number,
                }
            }))
            .await
            .map_err(|e| Error::GitHubApi(format!("GraphQL query failed: {e}")))?;

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(Error::GitHubApi(format!(
                "GraphQL error: {}",
                messages.join(", ")
            )));
        }

        let numbers: Vec<u64> = response
            .data
            .and_then(|d| d.repository)
            .and_then(|r| r.issue)
            .map(|i| {
                i.closed_by_pull_requests_references
                    .nodes
                    .into_iter()
                    .map(|n| n.number)
                    .collect()
            })
            .unwrap_or_default();
        debug!(issue = number, ?numbers, "closing pull requests");
        Ok(numbers)
    }

    async fn list_recent_requests(&self, limit: u8) -> Result<Vec<CandidateRequest>> {
        debug!(limit, "listing recent pull requests");
        let page = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .list()
            .state(State::All)
            .sort(octocrab::params::pulls::Sort::Created)
            .direction(Direction::Descending)
            .per_page(limit)
            .send()
            .await?;
        let result: Vec<CandidateRequest> = page.items.iter().map(request_from_octocrab).collect();
        debug!(count = result.len(), "listed recent pull requests");
        Ok(result)
    }

    async fn get_request(&self, number: u64) -> Result<CandidateRequest> {
        debug!(pr_number = number, "getting PR details");
        let pulls = self.client.pulls(&self.config.owner, &self.config.repo);
        let pr = pulls.get(number).await?;
        let mut request = request_from_octocrab(&pr);

        let reviews = pulls.list_reviews(number).per_page(PAGE_SIZE).send().await?;
        request.reviews = reviews
            .items
            .into_iter()
            .filter_map(review_from_octocrab)
            .collect();
        request.status_checks = self.status_checks(&pr.head.sha).await?;

        debug!(
            pr_number = number,
            state = %request.state,
            mergeable = ?request.mergeable,
            reviews = request.reviews.len(),
            checks = request.status_checks.len(),
            "got PR details"
        );
        Ok(request)
    }

    async fn approve_request(&self, number: u64, body: &str) -> Result<()> {
        debug!(pr_number = number, "approving PR");
        self.raw(Method::POST, &self.repo_url(&format!("/pulls/{number}/reviews")))
            .json(&serde_json::json!({ "event": "APPROVE", "body": body }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::GitHubApi(format!("Approval failed: {e}")))?;
        debug!(pr_number = number, "approved PR");
        Ok(())
    }

    async fn merge_request(&self, number: u64, commit: &MergeCommit) -> Result<MergeResult> {
        debug!(pr_number = number, "squash-merging PR");

        let result = self
            .client
            .pulls(&self.config.owner, &self.config.repo)
            .merge(number)
            .method(octocrab::params::pulls::MergeMethod::Squash)
            .title(commit.title.as_str())
            .message(commit.message.as_str())
            .send()
            .await
            .map_err(|e| Error::GitHubApi(format!("Merge failed: {e}")))?;

        let merge_result = MergeResult {
            merged: result.merged,
            sha: result.sha,
            message: result.message,
        };

        debug!(
            pr_number = number,
            merged = merge_result.merged,
            sha = ?merge_result.sha,
            "merge complete"
        );
        Ok(merge_result)
    }
}
