// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Glue between the guard/readiness failure paths and the Evidence
//! Writer (§4.H, §7: "emits an evidence run when the reject is
//! system-caused"). Every helper here returns the `evidence_run_id` to
//! attach to the HTTP response; callers that don't want evidence emitted
//! (filler-reported failures) never call into this module.

use serde_json::json;

use tk_storage::evidence::{Check, EvidenceRequest};
use tk_storage::{hash_bytes, EvidenceWriter, HashAlgorithm};

/// §8 scenario 2: a lease-owner-mismatch guard reject. The evidence run
/// must hash the attempted token, never carry it raw.
pub fn emit_lease_mismatch(
    evidence: &EvidenceWriter,
    ticket_id: &str,
    lease_owner: &str,
    lease_token: &str,
    attempted_by: Option<&str>,
    now_ms: u64,
) -> Result<String, tk_storage::EvidenceError> {
    let lease_token_hash = hash_bytes(HashAlgorithm::Sha256, lease_token.as_bytes()).value;
    let mut details = json!({
        "lease_owner": lease_owner,
        "lease_token_hash": lease_token_hash,
    });
    if let Some(by) = attempted_by {
        details["attempted_by"] = json!(by);
    }

    let run = evidence.emit(EvidenceRequest {
        ticket_id,
        details_kind: "lease_debug_v1",
        details,
        reject_code: tk_core::error::codes::LEASE_OWNER_MISMATCH,
        checks: vec![Check {
            name: "guard_rejection_evidence_ok".to_string(),
            ok: false,
            reason_codes: vec![tk_core::error::codes::LEASE_OWNER_MISMATCH.to_string()],
            details_ref: Some("lease_debug_v1.json".to_string()),
        }],
        now_ms,
    })?;
    Ok(run.evidence_run_id)
}

/// A readiness-block guard reject on a gated endpoint.
pub fn emit_readiness_block(
    evidence: &EvidenceWriter,
    ticket_id: &str,
    missing_required: &[String],
    degraded: bool,
    now_ms: u64,
) -> Result<String, tk_storage::EvidenceError> {
    let details = json!({
        "missing_required": missing_required,
        "degraded": degraded,
    });
    let run = evidence.emit(EvidenceRequest {
        ticket_id,
        details_kind: "readiness_debug_v1",
        details,
        reject_code: tk_core::error::codes::MCP_REQUIRED_UNAVAILABLE,
        checks: vec![Check {
            name: "readiness_gate_evidence_ok".to_string(),
            ok: false,
            reason_codes: vec![tk_core::error::codes::MCP_REQUIRED_UNAVAILABLE.to_string()],
            details_ref: Some("readiness_debug_v1.json".to_string()),
        }],
        now_ms,
    })?;
    Ok(run.evidence_run_id)
}

/// An invalid-tool-verdict guard reject: the raw, un-normalizable value
/// posted as `outputs.tool_verdict`.
pub fn emit_invalid_tool_verdict(
    evidence: &EvidenceWriter,
    ticket_id: &str,
    raw: &serde_json::Value,
    now_ms: u64,
) -> Result<String, tk_storage::EvidenceError> {
    let details = json!({
        "raw": raw,
        "invalid_status": true,
    });
    let run = evidence.emit(EvidenceRequest {
        ticket_id,
        details_kind: "tool_debug_v1",
        details,
        reject_code: tk_core::error::codes::INVALID_TOOL_VERDICT,
        checks: vec![Check {
            name: "tool_verdict_evidence_ok".to_string(),
            ok: false,
            reason_codes: vec![tk_core::error::codes::INVALID_TOOL_VERDICT.to_string()],
            details_ref: Some("tool_debug_v1.json".to_string()),
        }],
        now_ms,
    })?;
    Ok(run.evidence_run_id)
}
