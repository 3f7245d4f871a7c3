//! Workflow engine
//!
//! Three-phase pattern per tick:
//! 1. Gather - reconcile local state and fetch issue facts (effectful)
//! 2. Plan - decide the workflow state (pure, testable)
//! 3. Execute - merge or dispatch (effectful)

mod execute;
mod plan;

pub use execute::{
    approve_then_merge, dispatch, dispatch_assignees, ensure_labels, issue_labels, merge_commit,
};
pub use plan::{
    Decision, IssueFacts, PlanOptions, WorkflowState, choose_linked_request, closing_commit,
    determine_state,
};

use crate::config::WorkflowSettings;
use crate::error::{Error, Result};
use crate::matcher::find_linked_requests;
use crate::platform::TrackerService;
use crate::queue::QueueReader;
use crate::readiness::{ReviewContext, is_ready_to_merge};
use crate::tracking::{QueueRecord, QueueState, ReconcileReport, StateStore, reconcile};
use crate::types::{PrState, WorkItem};
use chrono::Utc;
use std::sync::OnceLock;
use tracing::{info, warn};

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A work item was promoted to a new issue
    Dispatched {
        /// Work item filename
        filename: String,
        /// Created issue number
        issue: u64,
    },
    /// A ready request was approved and merged
    Merged {
        /// Work item filename
        filename: String,
        /// Resolved issue number
        issue: u64,
        /// Merged request number
        request: u64,
    },
    /// Resolution was verified and nothing is left to dispatch
    Completed {
        /// Work item filename
        filename: String,
        /// Resolved issue number
        issue: u64,
    },
    /// The active item is not resolved yet
    Waiting {
        /// Work item filename
        filename: String,
        /// Active issue number
        issue: u64,
        /// Current workflow state
        state: WorkflowState,
        /// Explanation
        reason: String,
    },
    /// Dispatch is held back by tracker state that needs attention
    Blocked {
        /// Explanation
        reason: String,
    },
    /// No work item left to dispatch
    QueueEmpty,
}

impl TickOutcome {
    /// Whether the tick changed anything on the tracker
    #[must_use]
    pub const fn action_taken(&self) -> bool {
        matches!(self, Self::Dispatched { .. } | Self::Merged { .. })
    }
}

impl std::fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatched { filename, issue } => write!(f, "dispatched {filename} as #{issue}"),
            Self::Merged {
                filename,
                issue,
                request,
            } => write!(f, "merged #{request} resolving #{issue} ({filename})"),
            Self::Completed { filename, issue } => {
                write!(f, "#{issue} ({filename}) completed, queue drained")
            }
            Self::Waiting {
                filename,
                issue,
                state,
                reason,
            } => write!(f, "#{issue} ({filename}) {state}: {reason}"),
            Self::Blocked { reason } => write!(f, "blocked: {reason}"),
            Self::QueueEmpty => write!(f, "queue empty"),
        }
    }
}

/// Snapshot for `--status`
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Work items found on disk
    pub total_items: usize,
    /// Completed records
    pub completed: usize,
    /// Active record with its current decision
    pub active: Option<(QueueRecord, Decision)>,
    /// Next item that would be dispatched
    pub next_item: Option<WorkItem>,
    /// Most recently completed filename
    pub last_completed_file: Option<String>,
    /// Open tracked issues with no matching work item
    pub unmatched_open: Vec<u64>,
}

/// Drives the queue one decision cycle at a time
pub struct Orchestrator<'a> {
    tracker: &'a dyn TrackerService,
    store: &'a dyn StateStore,
    queue: &'a QueueReader,
    settings: &'a WorkflowSettings,
    operator: OnceLock<Option<String>>,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator over the given collaborators
    pub fn new(
        tracker: &'a dyn TrackerService,
        store: &'a dyn StateStore,
        queue: &'a QueueReader,
        settings: &'a WorkflowSettings,
    ) -> Self {
        Self {
            tracker,
            store,
            queue,
            settings,
            operator: OnceLock::new(),
        }
    }

    /// Run one decision cycle
    pub async fn tick(&self) -> Result<TickOutcome> {
        let (mut state, items, report) = self.sync(false).await?;

        if let Some(record) = state.processing().cloned() {
            if state.processing_count() > 1 {
                warn!(
                    count = state.processing_count(),
                    active = %record.filename,
                    "several records are processing, working on the lowest sequence"
                );
            }
            let (facts, decision) = self.decide(&record, &items).await?;
            info!(
                filename = %record.filename,
                issue = record.issue_number,
                state = %decision.state,
                reason = %decision.reason,
                "evaluated active issue"
            );

            return match decision.state {
                WorkflowState::Completed => {
                    // Reconcile treats an open issue as processing again
                    if !facts.issue.is_closed() {
                        self.tracker.close_issue(record.issue_number).await?;
                        info!(
                            issue = record.issue_number,
                            request = ?decision.request,
                            "closed issue resolved by a merged request"
                        );
                    }
                    state.mark_completed(&record.filename, Utc::now())?;
                    self.store.save(&state)?;
                    info!(filename = %record.filename, "work item completed");
                    match self.dispatch_next(&mut state).await? {
                        TickOutcome::QueueEmpty => Ok(TickOutcome::Completed {
                            filename: record.filename,
                            issue: record.issue_number,
                        }),
                        outcome => Ok(outcome),
                    }
                }
                WorkflowState::PrReadyForReview => {
                    let request = decision.request.ok_or_else(|| {
                        Error::Internal("ready decision without a request".to_string())
                    })?;
                    let operator = self.operator().await;
                    let context = ReviewContext {
                        agent: &self.settings.agent,
                        operator: operator.as_deref(),
                    };
                    approve_then_merge(
                        self.tracker,
                        request,
                        record.issue_number,
                        &context,
                        &self.settings.merge,
                    )
                    .await?;
                    state.mark_completed(&record.filename, Utc::now())?;
                    self.store.save(&state)?;
                    Ok(TickOutcome::Merged {
                        filename: record.filename,
                        issue: record.issue_number,
                        request,
                    })
                }
                state => Ok(TickOutcome::Waiting {
                    filename: record.filename,
                    issue: record.issue_number,
                    state,
                    reason: decision.reason,
                }),
            };
        }

        if !report.unmatched_open.is_empty() {
            let ids: Vec<String> = report
                .unmatched_open
                .iter()
                .map(|id| format!("#{id}"))
                .collect();
            return Ok(TickOutcome::Blocked {
                reason: format!(
                    "open tracked issue(s) {} match no work item",
                    ids.join(", ")
                ),
            });
        }

        self.dispatch_next(&mut state).await
    }

    /// Reconcile and describe the queue without merging or dispatching
    pub async fn status(&self) -> Result<StatusReport> {
        let (state, items, report) = self.sync(false).await?;

        let active = match state.processing().cloned() {
            Some(record) => {
                let (_, decision) = self.decide(&record, &items).await?;
                Some((record, decision))
            }
            None => None,
        };
        let completed = state.completed_filenames();
        let next_item = items
            .iter()
            .find(|i| state.get(&i.filename).is_none())
            .cloned();

        Ok(StatusReport {
            total_items: items.len(),
            completed: completed.len(),
            active,
            next_item,
            last_completed_file: state.last_completed_file,
            unmatched_open: report.unmatched_open,
        })
    }

    /// Rebuild local state from tracker history alone
    pub async fn force_sync(&self) -> Result<ReconcileReport> {
        let (_, _, report) = self.sync(true).await?;
        Ok(report)
    }

    /// Load, reconcile against the tracker and persist when changed
    async fn sync(&self, from_scratch: bool) -> Result<(QueueState, Vec<WorkItem>, ReconcileReport)> {
        let mut state = if from_scratch {
            QueueState::new()
        } else {
            self.store.load()?
        };
        let items = match self.queue.list_pending_items() {
            Ok(items) => items,
            Err(Error::QueueDirNotFound(dir)) => {
                warn!(dir = %dir.display(), "work item directory not found");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let issues = self
            .tracker
            .list_tracked_issues(&self.settings.tracking_label)
            .await?;

        let report = reconcile(&mut state, &issues, &items, Utc::now());
        if report.changed() || from_scratch {
            for change in &report.changes {
                info!(change = %change, "reconciled");
            }
            self.store.save(&state)?;
        }
        Ok((state, items, report))
    }

    /// Gather facts for the active record and plan
    async fn decide(
        &self,
        record: &QueueRecord,
        items: &[WorkItem],
    ) -> Result<(IssueFacts, Decision)> {
        let facts = self.gather(record, items).await?;
        let decision = determine_state(
            &facts,
            &PlanOptions {
                accept_manual_close: self.settings.accept_manual_close,
            },
        );
        Ok((facts, decision))
    }

    async fn gather(&self, record: &QueueRecord, items: &[WorkItem]) -> Result<IssueFacts> {
        let tracker = self.tracker;
        let agent = &self.settings.agent;
        let issue = tracker.get_issue(record.issue_number).await?;

        let mut facts = IssueFacts {
            agent_assigned: agent.any_matches(&issue.assignees),
            agent_acknowledged: false,
            closing_requests: Vec::new(),
            closing_commit: None,
            linked_request: None,
            readiness: None,
            issue,
        };

        if facts.issue.is_closed() {
            let events = tracker.list_issue_events(facts.issue.remote_id).await?;
            facts.closing_commit = closing_commit(&events);
            for number in tracker.closing_requests(facts.issue.remote_id).await? {
                facts.closing_requests.push(tracker.get_request(number).await?);
            }
            return Ok(facts);
        }
        if !facts.agent_assigned {
            return Ok(facts);
        }

        facts.agent_acknowledged = tracker
            .list_issue_events(facts.issue.remote_id)
            .await?
            .iter()
            .any(|e| e.actor.as_deref().is_some_and(|a| agent.matches(a)));

        let sequence = items
            .iter()
            .find(|i| i.filename == record.filename)
            .map(|i| i.sequence_number)
            .or_else(|| record.sequence_number());
        let linked = find_linked_requests(
            tracker,
            &facts.issue,
            sequence,
            agent,
            &self.settings.matching,
        )
        .await?;

        facts.linked_request = match choose_linked_request(linked) {
            Some(summary) if summary.state == PrState::Open => {
                Some(tracker.get_request(summary.number).await?)
            }
            other => other,
        };
        if let Some(request) = facts
            .linked_request
            .as_ref()
            .filter(|r| r.state == PrState::Open)
        {
            let operator = self.operator().await;
            let context = ReviewContext {
                agent,
                operator: operator.as_deref(),
            };
            facts.readiness = Some(is_ready_to_merge(request, &context));
        }
        Ok(facts)
    }

    /// Promote the first work item that has no record yet
    ///
    /// Refuses while any record is still processing.
    async fn dispatch_next(&self, state: &mut QueueState) -> Result<TickOutcome> {
        if let Some(active) = state.processing() {
            warn!(
                filename = %active.filename,
                issue = active.issue_number,
                "not dispatching while a work item is processing"
            );
            return Ok(TickOutcome::Blocked {
                reason: format!(
                    "{} (issue #{}) is still processing",
                    active.filename, active.issue_number
                ),
            });
        }
        let next = match self.queue.next_unprocessed(&state.recorded_filenames()) {
            Ok(next) => next,
            Err(Error::QueueDirNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let Some(item) = next else {
            info!("queue is empty, nothing to dispatch");
            return Ok(TickOutcome::QueueEmpty);
        };

        let issue = dispatch(self.tracker, &item, self.settings).await?;
        state.mark_processing(&item.filename, issue.remote_id, issue.created_at)?;
        self.store.save(state)?;
        Ok(TickOutcome::Dispatched {
            filename: item.filename,
            issue: issue.remote_id,
        })
    }

    /// Login of the authenticated user, looked up once
    async fn operator(&self) -> Option<String> {
        if let Some(login) = self.operator.get() {
            return login.clone();
        }
        let login = match self.tracker.current_user().await {
            Ok(login) => Some(login),
            Err(e) => {
                warn!(error = %e, "could not resolve the authenticated user");
                None
            }
        };
        let _ = self.operator.set(login.clone());
        login
    }
}
