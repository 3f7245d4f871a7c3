//! Workflow planning - pure decision over gathered facts
//!
//! No I/O happens here. The orchestrator fetches everything up front into
//! [`IssueFacts`], and [`determine_state`] turns it into a [`Decision`].

use crate::readiness::MergeReadiness;
use crate::types::{CandidateRequest, IssueEvent, PrState, TrackedIssue};

/// Where the active work item stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// Nobody is working on the issue yet (or closure is unverified)
    WaitingForAgent,
    /// The agent has picked the issue up
    AgentWorking,
    /// A linked request passed readiness and can be approved and merged
    PrReadyForReview,
    /// Resolved; the next work item may be dispatched
    Completed,
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForAgent => write!(f, "waiting_for_agent"),
            Self::AgentWorking => write!(f, "agent_working"),
            Self::PrReadyForReview => write!(f, "pr_ready_for_review"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Everything the decision needs, fetched beforehand
#[derive(Debug, Clone)]
pub struct IssueFacts {
    /// Fresh issue state
    pub issue: TrackedIssue,
    /// Any assignee is the agent
    pub agent_assigned: bool,
    /// The agent has left any trace on the issue timeline
    pub agent_acknowledged: bool,
    /// Requests that reference the issue as one they close
    pub closing_requests: Vec<CandidateRequest>,
    /// Commit recorded on the most recent close, `None` for a manual close
    pub closing_commit: Option<String>,
    /// Best matched request (see [`choose_linked_request`])
    pub linked_request: Option<CandidateRequest>,
    /// Readiness of the linked request, when it is open
    pub readiness: Option<MergeReadiness>,
}

/// Policy knobs for the decision
#[derive(Debug, Clone, Copy)]
pub struct PlanOptions {
    /// Treat a closed issue with no closing request as resolved
    pub accept_manual_close: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            accept_manual_close: true,
        }
    }
}

/// Result of planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// New workflow state
    pub state: WorkflowState,
    /// Human-readable explanation
    pub reason: String,
    /// Request the decision is about
    pub request: Option<u64>,
}

impl Decision {
    fn new(state: WorkflowState, reason: impl Into<String>, request: Option<u64>) -> Self {
        Self {
            state,
            reason: reason.into(),
            request,
        }
    }
}

/// Commit recorded on the most recent `closed` timeline event
///
/// Events without a timestamp sort before those with one; ties keep
/// timeline order.
#[must_use]
pub fn closing_commit(events: &[IssueEvent]) -> Option<String> {
    events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_close())
        .max_by_key(|(position, e)| (e.created_at, *position))
        .and_then(|(_, e)| e.commit_id.clone())
}

/// Pick the linked request from matcher output (most recent first)
///
/// Requests that were closed without merging are skipped.
#[must_use]
pub fn choose_linked_request(linked: Vec<CandidateRequest>) -> Option<CandidateRequest> {
    linked.into_iter().find(|r| r.state != PrState::Closed)
}

/// Decide the workflow state (PURE - no I/O, easily testable)
///
/// Rules are evaluated in order and the first that applies wins:
/// closure verification, agent assignment, then the linked request's state
/// and readiness, then agent acknowledgment.
#[must_use]
pub fn determine_state(facts: &IssueFacts, options: &PlanOptions) -> Decision {
    use WorkflowState::{AgentWorking, Completed, PrReadyForReview, WaitingForAgent};

    if facts.issue.is_closed() {
        if let Some(merged) = facts
            .closing_requests
            .iter()
            .find(|r| r.state == PrState::Merged)
        {
            return Decision::new(
                Completed,
                format!("closed by merged request #{}", merged.number),
                Some(merged.number),
            );
        }
        // Referencing requests only matter when a commit closed the issue
        let how = match &facts.closing_commit {
            None => Some("closed manually".to_string()),
            Some(sha) if facts.closing_requests.is_empty() => {
                Some(format!("closed by commit {sha}"))
            }
            Some(_) => None,
        };
        if let Some(how) = how {
            return if options.accept_manual_close {
                Decision::new(Completed, how, None)
            } else {
                Decision::new(
                    WaitingForAgent,
                    format!("{how} without a merged request, manual closes not accepted"),
                    None,
                )
            };
        }
        let numbers: Vec<String> = facts
            .closing_requests
            .iter()
            .map(|r| format!("#{}", r.number))
            .collect();
        return Decision::new(
            WaitingForAgent,
            format!("closed but closing request {} not merged", numbers.join(", ")),
            None,
        );
    }

    if !facts.agent_assigned {
        return Decision::new(WaitingForAgent, "agent not assigned", None);
    }

    if let Some(request) = &facts.linked_request {
        let number = Some(request.number);
        match request.state {
            PrState::Merged => {
                return Decision::new(
                    Completed,
                    format!("linked request #{} merged", request.number),
                    number,
                );
            }
            PrState::Open => {
                return match &facts.readiness {
                    Some(r) if r.ready => Decision::new(PrReadyForReview, r.reason.clone(), number),
                    Some(r) => Decision::new(AgentWorking, r.reason.clone(), number),
                    None => Decision::new(AgentWorking, "readiness not evaluated", number),
                };
            }
            PrState::Closed => {}
        }
    }

    if facts.agent_acknowledged {
        return Decision::new(AgentWorking, "agent acknowledged the issue", None);
    }

    Decision::new(WaitingForAgent, "no activity from agent yet", None)
}
