use std::fs;
use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;
use tk_core::FakeClock;

use super::*;
use crate::config::DerivationConfig;
use crate::metrics::Metrics;
use crate::store::TicketStore;

fn new_store() -> Arc<TicketStore> {
    Arc::new(TicketStore::with_uuid_ids(Arc::new(FakeClock::new(0)), Arc::new(Metrics::new())))
}

fn derivation_config() -> DerivationConfig {
    DerivationConfig {
        enable_tool_derivation: true,
        enable_reply_derivation: true,
        tool_only_mode: false,
    }
}

fn decision_line(candidate_id: &str, state: &str, decision: &str) -> String {
    json!({
        "candidate_id": candidate_id,
        "state": state,
        "flow_id": "triage_zh_hant_v1",
        "event": {"type": "thread_post"},
        "inputs": {},
        "triage_result": {"decision": decision},
    })
    .to_string()
}

#[test]
fn read_existing_lines_returns_empty_for_missing_file() {
    let dir = tempdir().unwrap();
    let lines = read_existing_lines(&dir.path().join("nope.jsonl")).unwrap();
    assert!(lines.is_empty());
}

#[test]
fn decision_is_done_approve_is_case_insensitive_and_state_gated() {
    assert!(decision_is_done_approve(&json!({"state": "DONE", "triage_result": {"decision": "approve"}})));
    assert!(decision_is_done_approve(&json!({"state": "DONE", "triage_result": {"decision": "APPROVE"}})));
    assert!(!decision_is_done_approve(&json!({"state": "SKIPPED", "triage_result": {"decision": "APPROVE"}})));
    assert!(!decision_is_done_approve(&json!({"state": "DONE", "triage_result": {"decision": "REJECT"}})));
}

#[test]
fn warm_reindex_replays_only_done_lines_and_records_watermark() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(TRIAGE_DECISIONS_FILE),
        format!(
            "{}\n{}\n{}\n",
            decision_line("c1", "DONE", "APPROVE"),
            decision_line("c2", "SKIPPED", "APPROVE"),
            decision_line("c3", "DONE", "REJECT"),
        ),
    )
    .unwrap();

    let store = new_store();
    let reindexer = WarmReindexer::new(&store, dir.path());
    let (report, watermark) = reindexer.run().unwrap();

    assert_eq!(report.triage_replayed, 2);
    assert_eq!(report.triage_skipped, 1);
    assert_eq!(report.triage_parse_errors, 0);

    let file_len = fs::metadata(dir.path().join(TRIAGE_DECISIONS_FILE)).unwrap().len();
    assert_eq!(watermark.triage_bytes, file_len);

    assert!(store.find_triage_by_candidate("c1").is_some());
    assert!(store.find_triage_by_candidate("c3").is_some());
}

#[test]
fn tail_step_on_missing_file_is_a_no_op() {
    let dir = tempdir().unwrap();
    let store = new_store();
    let writer = Arc::new(tk_storage::SnapshotWriter::open(dir.path()).unwrap());
    let follower = TailFollower::new(store, writer, derivation_config(), dir.path());
    let report = follower.step().unwrap();
    assert_eq!(report.lines_read, 0);
    assert!(!report.overlapped);
}

#[test]
fn tail_step_derives_reply_from_newly_appended_approval_and_leaves_partial_line() {
    let dir = tempdir().unwrap();
    let triage_path = dir.path().join(TRIAGE_DECISIONS_FILE);
    fs::write(&triage_path, format!("{}\n", decision_line("c4", "DONE", "APPROVE"))).unwrap();

    let store = new_store();
    let writer = Arc::new(tk_storage::SnapshotWriter::open(dir.path()).unwrap());
    let follower = TailFollower::new(store.clone(), writer, derivation_config(), dir.path());

    let report = follower.step().unwrap();
    assert_eq!(report.approvals_seen, 1);
    assert_eq!(report.tools_derived, 1);
    assert_eq!(report.replies_derived, 1);

    let triage = store.find_triage_by_candidate("c4").unwrap();
    assert!(triage.derived.is_some());

    let reply = store.find_reply_by_candidate("c4").unwrap();
    assert_eq!(reply.kind, TicketKind::Reply);
    assert_eq!(reply.metadata.source.as_deref(), Some(derivation::SOURCE_TAIL_AUTO));

    // Append an incomplete trailing line; it must not be consumed yet.
    use std::io::Write;
    let mut file = fs::OpenOptions::new().append(true).open(&triage_path).unwrap();
    write!(file, "{{\"candidate_id\": \"c5\"").unwrap();

    let second = follower.step().unwrap();
    assert_eq!(second.lines_read, 0);
}

#[test]
fn tail_step_resets_watermark_on_truncation() {
    let dir = tempdir().unwrap();
    let triage_path = dir.path().join(TRIAGE_DECISIONS_FILE);
    fs::write(
        &triage_path,
        format!("{}\n{}\n", decision_line("c6", "DONE", "APPROVE"), decision_line("c7", "DONE", "APPROVE")),
    )
    .unwrap();

    let store = new_store();
    let writer = Arc::new(tk_storage::SnapshotWriter::open(dir.path()).unwrap());
    let follower = TailFollower::new(store, writer.clone(), derivation_config(), dir.path());
    follower.step().unwrap();

    // Truncate the file to simulate rotation.
    fs::write(&triage_path, format!("{}\n", decision_line("c8", "DONE", "APPROVE"))).unwrap();
    let report = follower.step().unwrap();
    assert!(report.watermark_reset);
    assert_eq!(report.approvals_seen, 1);
}

#[test]
fn tail_step_refuses_to_overlap_itself() {
    let dir = tempdir().unwrap();
    let store = new_store();
    let writer = Arc::new(tk_storage::SnapshotWriter::open(dir.path()).unwrap());
    let follower = TailFollower::new(store, writer, derivation_config(), dir.path());

    follower.running.store(true, std::sync::atomic::Ordering::Release);
    let report = follower.step().unwrap();
    assert!(report.overlapped);
}
