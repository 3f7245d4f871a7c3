//! Resolution matcher
//!
//! Correlates a tracked issue with the pull/merge requests the agent opened
//! for it. Agents do not reliably reference the issue, so three independent
//! strategies are tried: a direct issue reference, a WIP marker shortly after
//! the issue was created, and the work item's sequence number.

use crate::config::{AgentIdentity, MatchSettings};
use crate::error::Result;
use crate::platform::TrackerService;
use crate::types::{CandidateRequest, TrackedIssue};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static WIP_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\[wip\]|wip\b|draft:|\[draft\])").expect("valid regex")
});

/// Whether `text` references issue `id` directly
///
/// Recognizes `#<id>`, `issue <id>`, `issue #<id>`, `fixes #<id>` and
/// `closes #<id>` (any case), bounded so `#12` does not match `#123`.
pub fn references_issue(text: &str, id: u64) -> bool {
    let pattern = format!(r"(?i)(?:^|[^\w#])(?:(?:fix(?:es|ed)?|close[sd]?|resolve[sd]?)\s+)?(?:issue\s+#?|#){id}\b");
    Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}

/// Whether a title carries a work-in-progress marker
///
/// `[WIP]`, a leading `WIP`, `Draft:` and `[Draft]`.
pub fn has_wip_marker(title: &str) -> bool {
    WIP_MARKER.is_match(title)
}

/// Whether `text` mentions `sequence` as a standalone number
///
/// Zero-padded and bare forms both count: `001`, `01` and `1` all match 1.
pub fn references_sequence(text: &str, sequence: u32) -> bool {
    let pattern = format!(r"\b0*{sequence}\b");
    Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}

/// Whether `created` is at or after `issue_created` and within `window` of it
pub fn within_window(
    created: DateTime<Utc>,
    issue_created: DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    created >= issue_created && created - issue_created <= window
}

/// Whether `created` is too far before the issue to be related
pub fn predates_issue(
    created: DateTime<Utc>,
    issue_created: DateTime<Utc>,
    buffer: chrono::Duration,
) -> bool {
    created < issue_created - buffer
}

/// Pick the requests that plausibly resolve `issue`, most recent first
///
/// `candidates` are request summaries in any order. Only agent-authored
/// requests created no earlier than `buffer` before the issue qualify, and
/// one of the correlation strategies must accept them.
pub fn select_linked_requests(
    candidates: Vec<CandidateRequest>,
    issue: &TrackedIssue,
    sequence: Option<u32>,
    agent: &AgentIdentity,
    settings: &MatchSettings,
) -> Vec<CandidateRequest> {
    let mut linked: Vec<CandidateRequest> = candidates
        .into_iter()
        .filter(|r| !predates_issue(r.created_at, issue.created_at, settings.buffer))
        .filter(|r| agent.matches(&r.author))
        .filter(|r| {
            let text = format!("{}\n{}", r.title, r.body);
            let in_window = within_window(r.created_at, issue.created_at, settings.window);

            let direct = references_issue(&text, issue.remote_id);
            let wip = in_window && has_wip_marker(&r.title);
            let numbered = in_window && sequence.is_some_and(|s| references_sequence(&text, s));

            if direct || wip || numbered {
                debug!(
                    request = r.number,
                    issue = issue.remote_id,
                    direct,
                    wip,
                    numbered,
                    "request matched"
                );
            }
            direct || wip || numbered
        })
        .collect();

    linked.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    linked
}

/// Fetch recent requests and select those linked to `issue`
pub async fn find_linked_requests(
    tracker: &dyn TrackerService,
    issue: &TrackedIssue,
    sequence: Option<u32>,
    agent: &AgentIdentity,
    settings: &MatchSettings,
) -> Result<Vec<CandidateRequest>> {
    let recent = tracker.list_recent_requests(settings.page_size).await?;
    let linked = select_linked_requests(recent, issue, sequence, agent, settings);
    debug!(
        issue = issue.remote_id,
        count = linked.len(),
        "found linked requests"
    );
    Ok(linked)
}
