use std::sync::Arc;

use serde_json::json;
use tk_core::{FakeClock, TicketKind};

use super::*;
use crate::metrics::Metrics;
use crate::store::{CreateTicketRequest, TicketStore};

fn new_store() -> TicketStore {
    TicketStore::with_uuid_ids(Arc::new(FakeClock::new(0)), Arc::new(Metrics::new()))
}

fn derivation_config() -> DerivationConfig {
    DerivationConfig {
        enable_tool_derivation: true,
        enable_reply_derivation: true,
        tool_only_mode: false,
    }
}

fn triage_request(candidate_id: &str) -> CreateTicketRequest {
    CreateTicketRequest {
        kind: TicketKind::Triage,
        flow_id: "triage_zh_hant_v1".to_string(),
        candidate_id: candidate_id.to_string(),
        parent_ticket_id: None,
        triage_reference_id: None,
        event: json!({"type": "thread_post"}),
        inputs: json!({"brand_voice": "warm"}),
        source: Some("http_ingest".to_string()),
        prompt_id: None,
    }
}

#[test]
fn approve_decision_creates_tool_ticket_and_links_back() {
    let store = new_store();
    let triage = store.create(triage_request("c1"));

    let outcome = derive_tool_from_triage(&store, &triage, &json!({"decision": "APPROVE"}), SOURCE_FILL_PATH);
    let tool = match outcome {
        DerivationOutcome::Created(t) => t,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(tool.kind, TicketKind::Tool);
    assert_eq!(tool.triage_reference_id, Some(triage.id.clone()));

    let reloaded_triage = store.get(&triage.id).unwrap();
    assert_eq!(reloaded_triage.derived.unwrap().ticket_id, tool.id);
}

#[test]
fn non_approve_decision_skips_derivation() {
    let store = new_store();
    let triage = store.create(triage_request("c2"));
    let outcome = derive_tool_from_triage(&store, &triage, &json!({"decision": "REJECT"}), SOURCE_FILL_PATH);
    assert_eq!(outcome_skip_reason(&outcome), Some(SkipReason::DecisionNotApprove));
}

#[test]
fn tool_derivation_is_idempotent_across_repeated_calls() {
    let store = new_store();
    let triage = store.create(triage_request("c3"));
    let outputs = json!({"decision": "APPROVE"});

    let first = derive_tool_from_triage(&store, &triage, &outputs, SOURCE_FILL_PATH);
    let first_id = match first {
        DerivationOutcome::Created(t) => t.id,
        other => panic!("expected Created, got {other:?}"),
    };

    let triage_again = store.get(&triage.id).unwrap();
    let second = derive_tool_from_triage(&store, &triage_again, &outputs, SOURCE_FILL_PATH);
    match second {
        DerivationOutcome::Idempotent(id) => assert_eq!(id, first_id),
        other => panic!("expected Idempotent, got {other:?}"),
    }
}

#[test]
fn reply_derivation_requires_proceed_verdict() {
    let store = new_store();
    let triage = store.create(triage_request("c4"));
    let tool = match derive_tool_from_triage(&store, &triage, &json!({"decision": "APPROVE"}), SOURCE_FILL_PATH) {
        DerivationOutcome::Created(t) => t,
        other => panic!("expected Created, got {other:?}"),
    };

    let deferred = derive_reply_from_tool(
        &store,
        &derivation_config(),
        &tool,
        &json!({"tool_verdict": "DEFER"}),
        SOURCE_REPLY_FILL_PATH,
    );
    assert_eq!(outcome_skip_reason(&deferred), Some(SkipReason::GateToolVerdictNotProceed));
}

#[test]
fn reply_derivation_on_proceed_creates_reply_and_recovers_orphan_on_retry() {
    let store = new_store();
    let triage = store.create(triage_request("c5"));
    let tool = match derive_tool_from_triage(&store, &triage, &json!({"decision": "APPROVE"}), SOURCE_FILL_PATH) {
        DerivationOutcome::Created(t) => t,
        other => panic!("expected Created, got {other:?}"),
    };

    let outputs = json!({"tool_verdict": "PROCEED"});
    let reply = match derive_reply_from_tool(&store, &derivation_config(), &tool, &outputs, SOURCE_REPLY_FILL_PATH) {
        DerivationOutcome::Created(r) => r,
        other => panic!("expected Created, got {other:?}"),
    };
    assert_eq!(reply.kind, TicketKind::Reply);
    assert_eq!(reply.parent_ticket_id, Some(tool.id.clone()));

    let tool_after = store.get(&tool.id).unwrap();
    assert_eq!(tool_after.derived.unwrap().ticket_id, reply.id);

    let repeated = derive_reply_from_tool(&store, &derivation_config(), &tool_after, &outputs, SOURCE_REPLY_FILL_PATH);
    match repeated {
        DerivationOutcome::Idempotent(id) => assert_eq!(id, reply.id),
        other => panic!("expected Idempotent, got {other:?}"),
    }
}

#[test]
fn tool_only_mode_skips_reply_derivation() {
    let store = new_store();
    let triage = store.create(triage_request("c6"));
    let tool = match derive_tool_from_triage(&store, &triage, &json!({"decision": "APPROVE"}), SOURCE_FILL_PATH) {
        DerivationOutcome::Created(t) => t,
        other => panic!("expected Created, got {other:?}"),
    };

    let mut config = derivation_config();
    config.tool_only_mode = true;
    let outcome = derive_reply_from_tool(
        &store,
        &config,
        &tool,
        &json!({"tool_verdict": "PROCEED"}),
        SOURCE_REPLY_FILL_PATH,
    );
    assert_eq!(outcome_skip_reason(&outcome), Some(SkipReason::GateToolOnlyMode));
}

#[test]
fn orphan_reply_is_recovered_instead_of_duplicated() {
    let store = new_store();
    let triage = store.create(triage_request("c7"));
    let tool = match derive_tool_from_triage(&store, &triage, &json!({"decision": "APPROVE"}), SOURCE_FILL_PATH) {
        DerivationOutcome::Created(t) => t,
        other => panic!("expected Created, got {other:?}"),
    };

    // Simulate a crash between child-ticket creation and set_derived: a
    // REPLY exists with the right parent, but the TOOL's back-reference
    // was never written.
    let mut orphan_req = triage_request("c7");
    orphan_req.kind = TicketKind::Reply;
    orphan_req.parent_ticket_id = Some(tool.id.clone());
    let orphan = store.create(orphan_req);

    let outcome = derive_reply_from_tool(
        &store,
        &derivation_config(),
        &tool,
        &json!({"tool_verdict": "PROCEED"}),
        SOURCE_REPLY_FILL_PATH,
    );
    match outcome {
        DerivationOutcome::RecoveredOrphan(id) => assert_eq!(id, orphan.id),
        other => panic!("expected RecoveredOrphan, got {other:?}"),
    }

    let tool_after = store.get(&tool.id).unwrap();
    assert_eq!(tool_after.derived.unwrap().ticket_id, orphan.id);
    assert_eq!(store.count(&Default::default()), 3);
}

fn outcome_skip_reason(outcome: &DerivationOutcome) -> Option<SkipReason> {
    match outcome {
        DerivationOutcome::Skipped(reason) => Some(reason.clone()),
        _ => None,
    }
}
