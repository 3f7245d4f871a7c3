//! Workflow execution - effectful operations
//!
//! Performs the side effects a [`Decision`](super::Decision) calls for:
//! approving and merging a ready request, and promoting the next work item
//! to a tracker issue.

use crate::config::{MergeSettings, WorkflowSettings};
use crate::error::{Error, Result};
use crate::platform::TrackerService;
use crate::readiness::{ReviewContext, wait_for_readiness};
use crate::types::{MergeCommit, MergeResult, NewIssue, TrackedIssue, WorkItem};
use tracing::{debug, info, warn};

const APPROVAL_BODY: &str = "Approved automatically: all readiness checks passed.";

/// Approve a ready request, re-check it, then squash-merge it
///
/// A successful approval is not rolled back when a later step fails.
pub async fn approve_then_merge(
    tracker: &dyn TrackerService,
    request_number: u64,
    issue_number: u64,
    context: &ReviewContext<'_>,
    settings: &MergeSettings,
) -> Result<MergeResult> {
    tracker
        .approve_request(request_number, APPROVAL_BODY)
        .await?;
    info!(request = request_number, "approved request");

    tokio::time::sleep(settings.settle_delay).await;

    let (request, readiness) = wait_for_readiness(tracker, request_number, context, settings).await?;
    if !readiness.ready {
        return Err(Error::MergeFailed(format!(
            "request #{request_number} not ready after approval: {}",
            readiness.reason
        )));
    }

    let commit = merge_commit(&request.title, request_number, issue_number);
    let result = tracker
        .merge_request(request_number, &commit)
        .await
        .map_err(|e| Error::MergeFailed(format!("request #{request_number}: {e}")))?;
    if !result.merged {
        return Err(Error::MergeFailed(format!(
            "request #{request_number} was not merged: {}",
            result.message.as_deref().unwrap_or("no reason given")
        )));
    }

    info!(
        request = request_number,
        sha = result.sha.as_deref().unwrap_or("-"),
        "merged request"
    );
    Ok(result)
}

/// Commit metadata for squash-merging a request that resolves an issue
#[must_use]
pub fn merge_commit(title: &str, request_number: u64, issue_number: u64) -> MergeCommit {
    MergeCommit {
        title: format!("{title} (#{request_number})"),
        message: format!("Resolves #{issue_number}"),
    }
}

/// Labels for a dispatched issue: tracking label first, then the item's own
///
/// Duplicates are dropped case-insensitively, keeping the first spelling.
#[must_use]
pub fn issue_labels(tracking_label: &str, item_labels: &[String]) -> Vec<String> {
    dedup_case_insensitive(std::iter::once(tracking_label).chain(item_labels.iter().map(String::as_str)))
}

/// Candidate assignees before validation: agent assignee, then extras
#[must_use]
pub fn dispatch_assignees(settings: &WorkflowSettings) -> Vec<String> {
    dedup_case_insensitive(
        settings
            .agent_assignee
            .iter()
            .chain(settings.extra_assignees.iter())
            .map(String::as_str),
    )
}

fn dedup_case_insensitive<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        if !out.iter().any(|o| o.eq_ignore_ascii_case(value)) {
            out.push(value.to_string());
        }
    }
    out
}

/// Create every label in `labels` that the tracker does not have yet
pub async fn ensure_labels(tracker: &dyn TrackerService, labels: &[String]) -> Result<()> {
    let existing = tracker.list_labels().await?;
    for label in labels {
        if existing.iter().any(|e| e.eq_ignore_ascii_case(label)) {
            continue;
        }
        tracker.create_label(label).await?;
        info!(label = %label, "created label");
    }
    Ok(())
}

/// Promote a work item to a tracker issue
///
/// The caller records the returned issue as processing.
pub async fn dispatch(
    tracker: &dyn TrackerService,
    item: &WorkItem,
    settings: &WorkflowSettings,
) -> Result<TrackedIssue> {
    let labels = issue_labels(&settings.tracking_label, &item.labels);
    ensure_labels(tracker, &labels).await?;

    let candidates = dispatch_assignees(settings);
    let assignees = tracker.resolve_assignees(&candidates).await?;
    if assignees.len() < candidates.len() {
        warn!(
            requested = ?candidates,
            valid = ?assignees,
            "some assignees do not exist on the tracker"
        );
    }
    debug!(filename = %item.filename, ?labels, ?assignees, "dispatching work item");

    let issue = tracker
        .create_issue(&NewIssue {
            title: item.title.clone(),
            body: item.body.clone(),
            labels,
            assignees,
        })
        .await?;
    info!(
        filename = %item.filename,
        issue = issue.remote_id,
        url = %issue.html_url,
        "dispatched work item"
    );
    Ok(issue)
}
