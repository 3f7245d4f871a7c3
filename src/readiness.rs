//! Merge readiness evaluation
//!
//! Decides whether a matched request is safe to merge automatically. Checks
//! run in a fixed order and the first failing one is reported.

use crate::config::{AgentIdentity, MergeSettings};
use crate::error::Result;
use crate::matcher::has_wip_marker;
use crate::platform::TrackerService;
use crate::types::{CandidateRequest, CheckOutcome, Mergeable, Review, ReviewVerdict};
use std::time::Instant;
use tracing::debug;

/// Outcome of a readiness evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReadiness {
    /// Safe to merge now
    pub ready: bool,
    /// Why (first failing check, or what made it ready)
    pub reason: String,
    /// The blocker may clear without anyone acting (checks running,
    /// mergeability still being computed)
    pub retryable: bool,
}

impl MergeReadiness {
    fn ready(reason: &str) -> Self {
        Self {
            ready: true,
            reason: reason.to_string(),
            retryable: false,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: reason.into(),
            retryable: false,
        }
    }

    fn pending(reason: impl Into<String>) -> Self {
        Self {
            ready: false,
            reason: reason.into(),
            retryable: true,
        }
    }
}

/// Who is who when judging reviews
#[derive(Debug, Clone, Copy)]
pub struct ReviewContext<'a> {
    /// Identities of the automated agent
    pub agent: &'a AgentIdentity,
    /// Login this tool acts as; its own pending review request is ignored
    pub operator: Option<&'a str>,
}

/// Latest decisive verdict per reviewer, in first-seen order
///
/// Approvals and change requests replace earlier verdicts, a dismissal clears
/// the reviewer, and comments or pending reviews are ignored.
pub fn latest_verdicts(reviews: &[Review]) -> Vec<(String, ReviewVerdict)> {
    let mut verdicts: Vec<(String, ReviewVerdict)> = Vec::new();
    for review in reviews {
        let key = review.reviewer.to_lowercase();
        match review.verdict {
            ReviewVerdict::Approved | ReviewVerdict::ChangesRequested => {
                if let Some(entry) = verdicts.iter_mut().find(|(r, _)| *r == key) {
                    entry.1 = review.verdict;
                } else {
                    verdicts.push((key, review.verdict));
                }
            }
            ReviewVerdict::Dismissed => verdicts.retain(|(r, _)| *r != key),
            ReviewVerdict::Commented | ReviewVerdict::Pending => {}
        }
    }
    verdicts
}

/// Evaluate whether `request` may be merged
pub fn is_ready_to_merge(request: &CandidateRequest, context: &ReviewContext<'_>) -> MergeReadiness {
    if request.mergeable == Mergeable::No {
        return MergeReadiness::blocked("has merge conflicts");
    }
    if request.is_draft {
        return MergeReadiness::blocked("request is a draft");
    }
    if has_wip_marker(&request.title) {
        return MergeReadiness::blocked("title is marked work in progress");
    }

    let verdicts = latest_verdicts(&request.reviews);
    if let Some((reviewer, _)) = verdicts
        .iter()
        .find(|(_, v)| *v == ReviewVerdict::ChangesRequested)
    {
        return MergeReadiness::blocked(format!("changes requested by {reviewer}"));
    }
    let approvals = verdicts
        .iter()
        .filter(|(_, v)| *v == ReviewVerdict::Approved)
        .count();

    if context.agent.matches(&request.author) {
        let pending: Vec<&str> = request
            .requested_reviewers
            .iter()
            .map(String::as_str)
            .filter(|r| !context.operator.is_some_and(|op| op.eq_ignore_ascii_case(r)))
            .collect();
        if !pending.is_empty() && approvals == 0 {
            return MergeReadiness::blocked(format!("awaiting review from {}", pending.join(", ")));
        }

        let failed: Vec<&str> = request
            .status_checks
            .iter()
            .filter(|c| c.outcome == CheckOutcome::Failure)
            .map(|c| c.name.as_str())
            .collect();
        if !failed.is_empty() {
            return MergeReadiness::blocked(format!("checks failed: {}", failed.join(", ")));
        }
        let running: Vec<&str> = request
            .status_checks
            .iter()
            .filter(|c| matches!(c.outcome, CheckOutcome::Pending | CheckOutcome::InProgress))
            .map(|c| c.name.as_str())
            .collect();
        if !running.is_empty() {
            return MergeReadiness::pending(format!("checks still running: {}", running.join(", ")));
        }

        return MergeReadiness::ready("agent PR clear");
    }

    if approvals == 0 {
        return MergeReadiness::blocked("no approving review");
    }
    MergeReadiness::ready("approved")
}

/// Re-fetch and re-evaluate a request until it is ready to merge
///
/// Retries every `settings.retry_interval` while the only blockers are
/// running checks or unknown mergeability, and gives up after
/// `settings.timeout`. A ready verdict with mergeability still unknown is
/// retried too. Returns the last fetched request with its verdict.
pub async fn wait_for_readiness(
    tracker: &dyn TrackerService,
    number: u64,
    context: &ReviewContext<'_>,
    settings: &MergeSettings,
) -> Result<(CandidateRequest, MergeReadiness)> {
    let started = Instant::now();
    loop {
        let request = tracker.get_request(number).await?;
        let mut readiness = is_ready_to_merge(&request, context);
        if readiness.ready && request.mergeable == Mergeable::Unknown {
            readiness = MergeReadiness::pending("mergeability still being computed");
        }

        if readiness.ready || !readiness.retryable {
            debug!(request = number, ready = readiness.ready, reason = %readiness.reason, "readiness settled");
            return Ok((request, readiness));
        }

        let elapsed = started.elapsed();
        if elapsed >= settings.timeout {
            debug!(request = number, reason = %readiness.reason, "readiness timed out");
            let reason = format!("timed out waiting: {}", readiness.reason);
            return Ok((request, MergeReadiness::blocked(reason)));
        }

        debug!(request = number, reason = %readiness.reason, "not ready yet, retrying");
        tokio::time::sleep(settings.retry_interval.min(settings.timeout - elapsed)).await;
    }
}
