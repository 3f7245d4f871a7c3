//! Unit tests for issue-queue modules

mod common;

mod matcher_test {
    use crate::common::{make_issue, make_request, ts};
    use issue_queue::config::{AgentIdentity, MatchSettings};
    use issue_queue::matcher::{has_wip_marker, references_issue, select_linked_requests};

    fn agent() -> AgentIdentity {
        AgentIdentity::new(["copilot", "copilot-swe-agent"])
    }

    #[test]
    fn test_direct_reference_matches_outside_window() {
        // Issue created 2024-01-01 00:00, request two days later
        let issue = make_issue(12, "003-parser", ts("2024-01-01T00:00:00Z"));
        let mut request = make_request(40, "Implement parser", ts("2024-01-03T00:00:00Z"));
        request.body = "Fixes #12".to_string();

        let linked = select_linked_requests(
            vec![request],
            &issue,
            Some(3),
            &agent(),
            &MatchSettings::default(),
        );
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].number, 40);
    }

    #[test]
    fn test_wip_marker_only_within_window() {
        let issue = make_issue(12, "003-parser", ts("2024-01-01T00:00:00Z"));
        let inside = make_request(40, "[WIP] Implement parser", ts("2024-01-01T02:00:00Z"));
        let outside = make_request(41, "[WIP] Something else", ts("2024-01-03T00:00:00Z"));

        let linked = select_linked_requests(
            vec![inside, outside],
            &issue,
            None,
            &agent(),
            &MatchSettings::default(),
        );
        let numbers: Vec<u64> = linked.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![40]);
    }

    #[test]
    fn test_sequence_number_match() {
        let issue = make_issue(12, "007-logging", ts("2024-01-01T00:00:00Z"));
        let request = make_request(40, "Work item 007: add logging", ts("2024-01-01T01:00:00Z"));
        let unrelated = make_request(41, "Work item 17", ts("2024-01-01T01:00:00Z"));

        let linked = select_linked_requests(
            vec![request, unrelated],
            &issue,
            Some(7),
            &agent(),
            &MatchSettings::default(),
        );
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].number, 40);
    }

    #[test]
    fn test_requests_before_issue_are_discarded() {
        let issue = make_issue(12, "003-parser", ts("2024-01-01T00:00:00Z"));
        // An hour before the issue, well beyond the five minute buffer
        let mut old = make_request(30, "Parser", ts("2023-12-31T23:00:00Z"));
        old.body = "Fixes #12".to_string();
        // Two minutes before: inside the buffer
        let mut close = make_request(31, "Parser", ts("2023-12-31T23:58:00Z"));
        close.body = "Fixes #12".to_string();

        let linked = select_linked_requests(
            vec![old, close],
            &issue,
            None,
            &agent(),
            &MatchSettings::default(),
        );
        let numbers: Vec<u64> = linked.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![31]);
    }

    #[test]
    fn test_non_agent_requests_ignored() {
        let issue = make_issue(12, "003-parser", ts("2024-01-01T00:00:00Z"));
        let mut human = make_request(40, "[WIP] parser", ts("2024-01-01T01:00:00Z"));
        human.author = "alice".to_string();

        let linked = select_linked_requests(
            vec![human],
            &issue,
            Some(3),
            &agent(),
            &MatchSettings::default(),
        );
        assert!(linked.is_empty());
    }

    #[test]
    fn test_linked_requests_most_recent_first() {
        let issue = make_issue(12, "003-parser", ts("2024-01-01T00:00:00Z"));
        let first = make_request(40, "[WIP] parser", ts("2024-01-01T01:00:00Z"));
        let second = make_request(41, "[WIP] parser again", ts("2024-01-01T05:00:00Z"));

        let linked = select_linked_requests(
            vec![first, second],
            &issue,
            None,
            &agent(),
            &MatchSettings::default(),
        );
        let numbers: Vec<u64> = linked.iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![41, 40]);
    }

    #[test]
    fn test_bot_suffix_author_is_agent() {
        let issue = make_issue(12, "003-parser", ts("2024-01-01T00:00:00Z"));
        let mut request = make_request(40, "[WIP] parser", ts("2024-01-01T01:00:00Z"));
        request.author = "Copilot[bot]".to_string();

        let linked = select_linked_requests(
            vec![request],
            &issue,
            None,
            &agent(),
            &MatchSettings::default(),
        );
        assert_eq!(linked.len(), 1);
    }

    #[test]
    fn test_marker_helpers() {
        assert!(has_wip_marker("Draft: parser"));
        assert!(!has_wip_marker("Wipe cache"));
        assert!(references_issue("Resolves #12", 12));
        assert!(!references_issue("PR#12", 13));
    }
}

mod readiness_test {
    use crate::common::{MockTrackerService, check, make_request, review, ts};
    use issue_queue::config::{AgentIdentity, MergeSettings};
    use issue_queue::readiness::{ReviewContext, is_ready_to_merge, wait_for_readiness};
    use issue_queue::types::{CheckOutcome, Mergeable, ReviewVerdict};
    use std::time::Duration;

    fn agent() -> AgentIdentity {
        AgentIdentity::new(["copilot", "copilot-swe-agent"])
    }

    #[test]
    fn test_draft_never_ready_even_when_approved() {
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.is_draft = true;
        request.reviews = vec![review("alice", ReviewVerdict::Approved)];

        let readiness = is_ready_to_merge(&request, &ctx);
        assert!(!readiness.ready);
        assert_eq!(readiness.reason, "request is a draft");
    }

    #[test]
    fn test_human_request_without_approval_blocked() {
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.author = "alice".to_string();
        request.status_checks = vec![check("ci", CheckOutcome::Success)];

        let readiness = is_ready_to_merge(&request, &ctx);
        assert!(!readiness.ready);
        assert!(!readiness.retryable);
        assert_eq!(readiness.reason, "no approving review");
    }

    #[test]
    fn test_changes_requested_blocks_agent_request() {
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.reviews = vec![
            review("alice", ReviewVerdict::Approved),
            review("bob", ReviewVerdict::ChangesRequested),
        ];

        let readiness = is_ready_to_merge(&request, &ctx);
        assert_eq!(readiness.reason, "changes requested by bob");
    }

    #[test]
    fn test_dismissed_change_request_no_longer_blocks() {
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.reviews = vec![
            review("bob", ReviewVerdict::ChangesRequested),
            review("bob", ReviewVerdict::Dismissed),
        ];

        assert!(is_ready_to_merge(&request, &ctx).ready);
    }

    #[test]
    fn test_pending_reviewer_blocks_until_approval() {
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: Some("maintainer"),
        };
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.requested_reviewers = vec!["alice".to_string(), "Maintainer".to_string()];

        let readiness = is_ready_to_merge(&request, &ctx);
        assert_eq!(readiness.reason, "awaiting review from alice");

        request.reviews = vec![review("carol", ReviewVerdict::Approved)];
        assert!(is_ready_to_merge(&request, &ctx).ready);
    }

    #[test]
    fn test_failed_check_blocks_before_running_check() {
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.status_checks = vec![
            check("lint", CheckOutcome::InProgress),
            check("test", CheckOutcome::Failure),
        ];

        let readiness = is_ready_to_merge(&request, &ctx);
        assert!(!readiness.retryable);
        assert_eq!(readiness.reason, "checks failed: test");
    }

    #[tokio::test]
    async fn test_wait_for_readiness_returns_ready_immediately() {
        let mock = MockTrackerService::new();
        mock.set_request(make_request(5, "Parser", ts("2024-01-01T00:00:00Z")));
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let settings = MergeSettings {
            settle_delay: Duration::ZERO,
            retry_interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        };

        let (request, readiness) = wait_for_readiness(&mock, 5, &ctx, &settings).await.unwrap();
        assert!(readiness.ready);
        assert_eq!(request.number, 5);
    }

    #[tokio::test]
    async fn test_wait_for_readiness_times_out_on_running_checks() {
        let mock = MockTrackerService::new();
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.status_checks = vec![check("ci", CheckOutcome::Pending)];
        mock.set_request(request);
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let settings = MergeSettings {
            settle_delay: Duration::ZERO,
            retry_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(20),
        };

        let (_, readiness) = wait_for_readiness(&mock, 5, &ctx, &settings).await.unwrap();
        assert!(!readiness.ready);
        assert!(!readiness.retryable);
        assert_eq!(readiness.reason, "timed out waiting: checks still running: ci");
    }

    #[tokio::test]
    async fn test_wait_for_readiness_treats_unknown_mergeability_as_pending() {
        let mock = MockTrackerService::new();
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.mergeable = Mergeable::Unknown;
        mock.set_request(request);
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let settings = MergeSettings {
            settle_delay: Duration::ZERO,
            retry_interval: Duration::from_millis(5),
            timeout: Duration::ZERO,
        };

        let (_, readiness) = wait_for_readiness(&mock, 5, &ctx, &settings).await.unwrap();
        assert!(!readiness.ready);
        assert!(readiness.reason.contains("mergeability still being computed"));
    }

    #[tokio::test]
    async fn test_wait_for_readiness_does_not_retry_hard_blockers() {
        let mock = MockTrackerService::new();
        let mut request = make_request(5, "Parser", ts("2024-01-01T00:00:00Z"));
        request.mergeable = Mergeable::No;
        mock.set_request(request);
        let agent = agent();
        let ctx = ReviewContext {
            agent: &agent,
            operator: None,
        };
        let settings = MergeSettings {
            settle_delay: Duration::ZERO,
            retry_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(600),
        };

        let (_, readiness) = wait_for_readiness(&mock, 5, &ctx, &settings).await.unwrap();
        assert_eq!(readiness.reason, "has merge conflicts");
    }
}

mod plan_test {
    use crate::common::{make_closed_issue, make_issue, make_request, ts};
    use issue_queue::readiness::MergeReadiness;
    use issue_queue::types::PrState;
    use issue_queue::workflow::{IssueFacts, PlanOptions, WorkflowState, determine_state};

    fn open_facts() -> IssueFacts {
        IssueFacts {
            issue: make_issue(3, "001-setup", ts("2024-01-01T00:00:00Z")),
            agent_assigned: true,
            agent_acknowledged: true,
            closing_requests: vec![],
            closing_commit: None,
            linked_request: None,
            readiness: None,
        }
    }

    #[test]
    fn test_ready_linked_request() {
        let mut facts = open_facts();
        facts.linked_request = Some(make_request(9, "Setup", ts("2024-01-01T01:00:00Z")));
        facts.readiness = Some(MergeReadiness {
            ready: true,
            reason: "agent PR clear".to_string(),
            retryable: false,
        });

        let decision = determine_state(&facts, &PlanOptions::default());
        assert_eq!(decision.state, WorkflowState::PrReadyForReview);
        assert_eq!(decision.request, Some(9));
    }

    #[test]
    fn test_blocked_linked_request_keeps_agent_working() {
        let mut facts = open_facts();
        facts.linked_request = Some(make_request(9, "Setup", ts("2024-01-01T01:00:00Z")));
        facts.readiness = Some(MergeReadiness {
            ready: false,
            reason: "checks failed: test".to_string(),
            retryable: false,
        });

        let decision = determine_state(&facts, &PlanOptions::default());
        assert_eq!(decision.state, WorkflowState::AgentWorking);
        assert_eq!(decision.reason, "checks failed: test");
    }

    #[test]
    fn test_merged_linked_request_completes_open_issue() {
        let mut facts = open_facts();
        let mut request = make_request(9, "Setup", ts("2024-01-01T01:00:00Z"));
        request.state = PrState::Merged;
        facts.linked_request = Some(request);

        let decision = determine_state(&facts, &PlanOptions::default());
        assert_eq!(decision.state, WorkflowState::Completed);
    }

    #[test]
    fn test_closed_issue_ignores_agent_assignment() {
        let mut merged = make_request(9, "Setup", ts("2024-01-01T01:00:00Z"));
        merged.state = PrState::Merged;
        let facts = IssueFacts {
            issue: make_closed_issue(3, "001-setup", ts("2024-01-01T00:00:00Z")),
            agent_assigned: false,
            agent_acknowledged: false,
            closing_requests: vec![merged],
            closing_commit: Some("sha9".to_string()),
            linked_request: None,
            readiness: None,
        };

        let decision = determine_state(&facts, &PlanOptions::default());
        assert_eq!(decision.state, WorkflowState::Completed);
        assert_eq!(decision.request, Some(9));
    }

    #[test]
    fn test_no_activity_waits_for_agent() {
        let mut facts = open_facts();
        facts.agent_acknowledged = false;

        let decision = determine_state(&facts, &PlanOptions::default());
        assert_eq!(decision.state, WorkflowState::WaitingForAgent);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(WorkflowState::PrReadyForReview.to_string(), "pr_ready_for_review");
        assert_eq!(WorkflowState::WaitingForAgent.to_string(), "waiting_for_agent");
    }
}

mod reconcile_test {
    use crate::common::{make_closed_issue, make_issue, ts};
    use issue_queue::tracking::{QueueState, RecordStatus, reconcile};
    use issue_queue::types::WorkItem;

    fn item(seq: u32, filename: &str, title: &str) -> WorkItem {
        WorkItem {
            sequence_number: seq,
            filename: filename.to_string(),
            title: title.to_string(),
            body: String::new(),
            labels: vec![],
        }
    }

    fn items() -> Vec<WorkItem> {
        vec![
            item(1, "001-setup.md", "001-setup"),
            item(2, "002-parser.md", "002-parser"),
            item(3, "003-cli.md", "003-cli"),
        ]
    }

    #[test]
    fn test_rebuild_from_history() {
        let issues = vec![
            make_closed_issue(10, "001-setup", ts("2024-01-01T00:00:00Z")),
            make_closed_issue(11, "002-parser", ts("2024-01-02T00:00:00Z")),
            make_issue(12, "003-cli", ts("2024-01-03T00:00:00Z")),
        ];
        let mut state = QueueState::new();
        let report = reconcile(&mut state, &issues, &items(), ts("2024-01-04T00:00:00Z"));

        assert!(report.changed());
        assert_eq!(state.get("001-setup.md").unwrap().status, RecordStatus::Completed);
        assert_eq!(state.get("002-parser.md").unwrap().status, RecordStatus::Completed);
        assert_eq!(state.get("003-cli.md").unwrap().status, RecordStatus::Processing);
        assert_eq!(state.processing_count(), 1);
        assert_eq!(state.last_completed_file.as_deref(), Some("002-parser.md"));
    }

    #[test]
    fn test_completed_at_uses_tracker_close_time() {
        let issues = vec![
            make_closed_issue(10, "001-setup", ts("2024-01-01T00:00:00Z")),
            make_issue(11, "002-parser", ts("2024-01-02T00:00:00Z")),
        ];
        let mut state = QueueState::new();
        reconcile(&mut state, &issues, &items(), ts("2024-01-04T00:00:00Z"));

        let record = state.get("001-setup.md").unwrap();
        assert_eq!(record.created_at, ts("2024-01-01T00:00:00Z"));
        assert_eq!(record.completed_at, Some(ts("2024-01-01T01:00:00Z")));
    }

    #[test]
    fn test_unrelated_closed_issue_ignored() {
        let issues = vec![make_closed_issue(10, "Tidy README", ts("2024-01-01T00:00:00Z"))];
        let mut state = QueueState::new();
        let report = reconcile(&mut state, &issues, &items(), ts("2024-01-04T00:00:00Z"));

        assert!(!report.changed());
        assert!(report.unmatched_open.is_empty());
        assert!(state.processed_files.is_empty());
    }
}

mod dispatch_test {
    use crate::common::{MockTrackerService, test_settings};
    use issue_queue::types::WorkItem;
    use issue_queue::workflow::dispatch;

    fn item() -> WorkItem {
        WorkItem {
            sequence_number: 1,
            filename: "001-setup.md".to_string(),
            title: "001-setup".to_string(),
            body: "Set things up.".to_string(),
            labels: vec!["infra".to_string(), "ci".to_string()],
        }
    }

    #[tokio::test]
    async fn test_dispatch_creates_missing_labels_only() {
        let mock = MockTrackerService::new();
        mock.set_labels(&["CI"]);

        let issue = dispatch(&mock, &item(), &test_settings()).await.unwrap();

        assert_eq!(mock.get_create_label_calls(), vec!["auto-generated", "infra"]);
        assert_eq!(issue.labels, vec!["auto-generated", "infra", "ci"]);
        mock.assert_issue_created("001-setup");
    }

    #[tokio::test]
    async fn test_dispatch_drops_unknown_assignees() {
        let mock = MockTrackerService::new();
        mock.set_known_users(&["copilot-swe-agent"]);
        let mut settings = test_settings();
        settings.extra_assignees = vec!["ghost".to_string()];

        let issue = dispatch(&mock, &item(), &settings).await.unwrap();

        assert_eq!(issue.assignees, vec!["copilot-swe-agent"]);
    }

    #[tokio::test]
    async fn test_dispatch_propagates_create_failure() {
        let mock = MockTrackerService::new();
        mock.fail_create_issue("rate limited");

        let err = dispatch(&mock, &item(), &test_settings()).await.unwrap_err();
        assert!(err.is_transient());
    }
}
