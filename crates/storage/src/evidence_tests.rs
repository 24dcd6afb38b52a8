use super::*;
use serde_json::json;
use tempfile::tempdir;

fn sample_checks() -> Vec<Check> {
    vec![Check {
        name: "lease_owner_match".to_string(),
        ok: false,
        reason_codes: vec!["lease_owner_mismatch".to_string()],
        details_ref: Some("lease_debug_v1.json".to_string()),
    }]
}

#[test]
fn self_hash_matches_canonicalized_manifest() {
    let dir = tempdir().unwrap();
    let writer = EvidenceWriter::new(dir.path());
    let run = writer
        .emit(EvidenceRequest {
            ticket_id: "ticket_abcdef1234",
            details_kind: "lease_debug_v1",
            details: json!({
                "lease_owner": "worker-7",
                "lease_token_hash": "deadbeef",
                "attempted_by": "worker-9",
            }),
            reject_code: "lease_owner_mismatch",
            checks: sample_checks(),
            now_ms: 1_700_000_000_123,
        })
        .unwrap();

    let manifest_bytes = fs::read(run.dir.join("evidence_manifest_v1.json")).unwrap();
    let manifest: Value = serde_json::from_slice(&manifest_bytes).unwrap();
    let self_hash_bytes = fs::read(run.dir.join("manifest_self_hash_v1.json")).unwrap();
    let self_hash_doc: Value = serde_json::from_slice(&self_hash_bytes).unwrap();
    let recorded_value = self_hash_doc["value"].as_str().unwrap();

    let recomputed = compute_self_hash(&manifest).unwrap();
    assert_eq!(recomputed, recorded_value);
}

#[test]
fn lease_debug_details_never_contain_raw_token() {
    let dir = tempdir().unwrap();
    let writer = EvidenceWriter::new(dir.path());
    let run = writer
        .emit(EvidenceRequest {
            ticket_id: "ticket_abcdef1234",
            details_kind: "lease_debug_v1",
            details: json!({
                "lease_owner": "worker-7",
                "lease_token_hash": "deadbeef",
            }),
            reject_code: "lease_owner_mismatch",
            checks: sample_checks(),
            now_ms: 42,
        })
        .unwrap();

    let details_bytes = fs::read(run.dir.join("lease_debug_v1.json")).unwrap();
    let details_text = String::from_utf8(details_bytes).unwrap();
    assert!(details_text.contains("lease_token_hash"));
    assert!(!details_text.contains("lease_token\""));
}

#[test]
fn unknown_details_kind_is_rejected_before_any_file_is_written() {
    let dir = tempdir().unwrap();
    let writer = EvidenceWriter::new(dir.path());
    let result = writer.emit(EvidenceRequest {
        ticket_id: "ticket_abcdef1234",
        details_kind: "not_a_real_kind",
        details: json!({}),
        reject_code: "invalid_tool_verdict",
        checks: vec![],
        now_ms: 1,
    });
    assert!(result.is_err());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[test]
fn reason_codes_are_sorted_and_deduped() {
    let dir = tempdir().unwrap();
    let writer = EvidenceWriter::new(dir.path());
    let checks = vec![
        Check {
            name: "check_b".to_string(),
            ok: false,
            reason_codes: vec!["dup_code".to_string(), "zz_code".to_string()],
            details_ref: None,
        },
        Check {
            name: "check_a".to_string(),
            ok: false,
            reason_codes: vec!["dup_code".to_string(), "aa_code".to_string()],
            details_ref: None,
        },
    ];
    let run = writer
        .emit(EvidenceRequest {
            ticket_id: "ticket_abcdef1234",
            details_kind: "tool_debug_v1",
            details: json!({"raw": "BLOCK"}),
            reject_code: "invalid_tool_verdict",
            checks,
            now_ms: 7,
        })
        .unwrap();

    let manifest_bytes = fs::read(run.dir.join("evidence_manifest_v1.json")).unwrap();
    let manifest: Value = serde_json::from_slice(&manifest_bytes).unwrap();
    let reason_codes: Vec<&str> = manifest["reason_codes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(reason_codes, vec!["aa_code", "dup_code", "zz_code"]);

    let checks = manifest["checks"].as_array().unwrap();
    assert_eq!(checks[0]["name"], "check_a");
    assert_eq!(checks[1]["name"], "check_b");
}

#[test]
fn base36_encoding_is_deterministic_and_lowercase() {
    assert_eq!(base36(0), "0");
    assert_eq!(base36(35), "z");
    assert_eq!(base36(36), "10");
}
