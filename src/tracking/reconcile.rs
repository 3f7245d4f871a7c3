//! Reconciliation of local queue state against tracker truth
//!
//! Pure: callers fetch the tracker issues and work items, this module decides
//! what the records should say.

use super::{QueueRecord, QueueState, RecordStatus};
use crate::queue::extract_sequence_number;
use crate::types::{TrackedIssue, WorkItem};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Human-readable description of each change
    pub changes: Vec<String>,
    /// Open tracked issues that could not be matched to a work item
    pub unmatched_open: Vec<u64>,
}

impl ReconcileReport {
    /// Whether any record was modified
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Re-derive every record from the tracker's issue history
///
/// Issues are replayed oldest first. Each is matched to a local filename by
/// its stored issue number, then by the sequence number in its title, then by
/// exact title. Open issues are processing and closed issues completed, except
/// that the newest closed issue stays processing until the workflow has
/// verified how it was closed. Records are only touched when they disagree
/// with the tracker, so repeated passes are no-ops.
pub fn reconcile(
    state: &mut QueueState,
    issues: &[TrackedIssue],
    items: &[WorkItem],
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let mut ordered: Vec<&TrackedIssue> = issues.iter().collect();
    ordered.sort_by_key(|i| (i.created_at, i.remote_id));
    let newest = ordered.last().map(|i| i.remote_id);

    for issue in ordered {
        let Some(filename) = match_filename(state, issue, items) else {
            if !issue.is_closed() {
                warn!(
                    issue = issue.remote_id,
                    title = %issue.title,
                    "open tracked issue does not match any work item"
                );
                report.unmatched_open.push(issue.remote_id);
            } else {
                debug!(issue = issue.remote_id, "closed issue has no matching work item");
            }
            continue;
        };

        let existing = state.get(&filename).map(|r| r.status);
        let status = if !issue.is_closed() {
            RecordStatus::Processing
        } else if Some(issue.remote_id) == newest && existing != Some(RecordStatus::Completed) {
            RecordStatus::Processing
        } else {
            RecordStatus::Completed
        };

        apply(state, &filename, issue, status, now, &mut report);
    }

    let last = state
        .processed_files
        .iter()
        .filter(|r| r.status == RecordStatus::Completed)
        .max_by_key(|r| r.sequence_number().unwrap_or(0))
        .map(|r| r.filename.clone());
    if last.is_some() && last != state.last_completed_file {
        report
            .changes
            .push(format!("last completed file -> {}", last.as_deref().unwrap_or_default()));
        state.last_completed_file = last;
    }

    report
}

fn match_filename(state: &QueueState, issue: &TrackedIssue, items: &[WorkItem]) -> Option<String> {
    if let Some(record) = state.by_issue(issue.remote_id) {
        return Some(record.filename.clone());
    }
    if let Some(seq) = extract_sequence_number(&issue.title)
        && let Some(item) = items.iter().find(|i| i.sequence_number == seq)
    {
        return Some(item.filename.clone());
    }
    items
        .iter()
        .find(|i| i.title.trim() == issue.title.trim())
        .map(|i| i.filename.clone())
}

fn apply(
    state: &mut QueueState,
    filename: &str,
    issue: &TrackedIssue,
    status: RecordStatus,
    now: DateTime<Utc>,
    report: &mut ReconcileReport,
) {
    let completed_at = (status == RecordStatus::Completed).then(|| issue.closed_at.unwrap_or(now));

    let Some(record) = state
        .processed_files
        .iter_mut()
        .find(|r| r.filename == filename)
    else {
        report.changes.push(format!(
            "{filename}: added as {status} (issue #{})",
            issue.remote_id
        ));
        state.processed_files.push(QueueRecord {
            filename: filename.to_string(),
            issue_number: issue.remote_id,
            status,
            created_at: issue.created_at,
            completed_at,
        });
        return;
    };

    if record.issue_number != issue.remote_id {
        report.changes.push(format!(
            "{filename}: issue #{} -> #{}",
            record.issue_number, issue.remote_id
        ));
        record.issue_number = issue.remote_id;
    }
    if record.status != status {
        report
            .changes
            .push(format!("{filename}: {} -> {status}", record.status));
        record.status = status;
        record.completed_at = completed_at;
    }
}
