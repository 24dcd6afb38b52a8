use super::*;

fn triage_config() -> TicketConfig {
    TicketConfig {
        id: TicketId::new("t1"),
        kind: TicketKind::Triage,
        flow_id: "triage_zh_hant_v1".to_string(),
        candidate_id: "c1".to_string(),
        parent_ticket_id: None,
        triage_reference_id: None,
        event: serde_json::json!({"type": "thread_post"}),
        inputs: serde_json::json!({}),
        source: None,
        prompt_id: None,
    }
}

#[test]
fn new_ticket_is_pending_with_stable_id() {
    let t = Ticket::new(triage_config(), 100);
    assert_eq!(t.status, TicketStatus::Pending);
    assert_eq!(t.id, "t1");
    assert_eq!(t.created_at_ms, 100);
}

#[test]
fn lease_then_complete_with_matching_proof_succeeds() {
    let mut t = Ticket::new(triage_config(), 0);
    t.lease("worker-a", "tok-1", 1_000, 10).unwrap();
    assert_eq!(t.status, TicketStatus::Running);

    t.complete(
        serde_json::json!({"decision": "APPROVE"}),
        "worker-a",
        Some(("worker-a", "tok-1")),
        &DirectFillAllowlist::default(),
        None,
        20,
    )
    .unwrap();

    assert_eq!(t.status, TicketStatus::Done);
    assert_eq!(
        t.final_outputs,
        Some(serde_json::json!({"decision": "APPROVE"}))
    );
}

#[test]
fn complete_on_done_is_idempotent_and_does_not_overwrite() {
    let mut t = Ticket::new(triage_config(), 0);
    t.lease("worker-a", "tok-1", 1_000, 10).unwrap();
    t.complete(
        serde_json::json!({"decision": "APPROVE"}),
        "worker-a",
        Some(("worker-a", "tok-1")),
        &DirectFillAllowlist::default(),
        None,
        20,
    )
    .unwrap();

    t.complete(
        serde_json::json!({"decision": "REJECT"}),
        "worker-a",
        Some(("worker-a", "tok-1")),
        &DirectFillAllowlist::default(),
        None,
        30,
    )
    .unwrap();

    assert_eq!(
        t.final_outputs,
        Some(serde_json::json!({"decision": "APPROVE"}))
    );
}

#[test]
fn complete_from_running_with_wrong_owner_is_lease_mismatch() {
    let mut t = Ticket::new(triage_config(), 0);
    t.lease("worker-a", "tok-1", 1_000, 10).unwrap();

    let err = t
        .complete(
            serde_json::json!({}),
            "worker-b",
            Some(("worker-b", "tok-1")),
            &DirectFillAllowlist::default(),
            None,
            20,
        )
        .unwrap_err();

    assert_eq!(err.code(), "lease_owner_mismatch");
    assert_eq!(t.status, TicketStatus::Running);
}

#[test]
fn direct_fill_from_pending_requires_allowlisted_caller() {
    let mut t = Ticket::new(triage_config(), 0);

    let err = t
        .complete(
            serde_json::json!({}),
            "random_caller",
            None,
            &DirectFillAllowlist::default(),
            None,
            10,
        )
        .unwrap_err();
    assert_eq!(err.code(), "direct_fill_not_allowed");

    t.complete(
        serde_json::json!({}),
        "http_fill",
        None,
        &DirectFillAllowlist::default(),
        None,
        20,
    )
    .unwrap();
    assert_eq!(t.status, TicketStatus::Done);
}

#[test]
fn direct_fill_missing_by_is_rejected() {
    let mut t = Ticket::new(triage_config(), 0);
    let err = t
        .complete(
            serde_json::json!({}),
            "",
            None,
            &DirectFillAllowlist::default(),
            None,
            10,
        )
        .unwrap_err();
    assert_eq!(err.code(), "direct_fill_missing_by");
}

#[test]
fn reap_is_noop_before_expiry_and_reclaims_after() {
    let mut t = Ticket::new(triage_config(), 0);
    t.lease("worker-a", "tok-1", 1_000, 0).unwrap();

    assert!(!t.reap_if_expired(999));
    assert_eq!(t.status, TicketStatus::Running);

    assert!(t.reap_if_expired(1_001));
    assert_eq!(t.status, TicketStatus::Pending);
    assert!(t.lease.is_none());
}

#[test]
fn release_requires_lease_proof() {
    let mut t = Ticket::new(triage_config(), 0);
    t.lease("worker-a", "tok-1", 1_000, 0).unwrap();

    let err = t.release(("worker-a", "wrong-token"), 10).unwrap_err();
    assert_eq!(err.code(), "lease_owner_mismatch");

    t.release(("worker-a", "tok-1"), 20).unwrap();
    assert_eq!(t.status, TicketStatus::Pending);
}

#[test]
fn block_clears_lease_and_unblock_returns_to_pending() {
    let mut t = Ticket::new(triage_config(), 0);
    t.lease("worker-a", "tok-1", 1_000, 0).unwrap();
    t.block("policy", "needs review", "moderator", 10).unwrap();
    assert_eq!(t.status, TicketStatus::Blocked);
    assert!(t.lease.is_none());

    t.unblock(20).unwrap();
    assert_eq!(t.status, TicketStatus::Pending);
}

#[test]
fn retry_from_failed_increments_retry_count() {
    let mut t = Ticket::new(triage_config(), 0);
    t.lease("worker-a", "tok-1", 1_000, 0).unwrap();
    t.fail("TOOL_TIMEOUT", ("worker-a", "tok-1"), 10).unwrap();
    assert_eq!(t.status, TicketStatus::Failed);

    t.retry(20).unwrap();
    assert_eq!(t.status, TicketStatus::Pending);
    assert_eq!(t.metadata.retry_count, 1);
}

#[test]
fn invalid_transition_is_rejected_with_stable_code() {
    let mut t = Ticket::new(triage_config(), 0);
    let err = t.fail("x", ("nobody", "x"), 10).unwrap_err();
    assert_eq!(err.code(), "invalid_transition");
}

#[test]
fn derived_back_reference_is_set_at_most_once() {
    let mut t = Ticket::new(triage_config(), 0);
    t.set_derived(TicketId::new("child-1"), 10);
    t.set_derived(TicketId::new("child-2"), 20);
    assert_eq!(t.derived.unwrap().ticket_id, TicketId::new("child-1"));
}
