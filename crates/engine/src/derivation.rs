// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Derivation Engine (§4.F): the two pure steps that turn a filled TRIAGE
//! ticket into a TOOL ticket, and a filled TOOL ticket into a REPLY
//! ticket. Each function's only side effect on success is a single
//! `TicketStore::create` plus writing the parent's back-reference.

use serde_json::{json, Value};
use tk_core::{Ticket, TicketId, TicketKind};

use crate::config::DerivationConfig;
use crate::store::{CreateTicketRequest, TicketStore};
use crate::verdict_normalizer::{normalize_tool_verdict, NormalizeOutcome};

/// Why a derivation step produced no child ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    DecisionNotApprove,
    GateKindNotTool,
    GateReplyDerivationDisabled,
    GateToolOnlyMode,
    GateToolVerdictNotProceed,
    MissingToolVerdict,
    MissingParentTriageTicket,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::DecisionNotApprove => "decision_not_approve",
            SkipReason::GateKindNotTool => "gate_kind_not_tool",
            SkipReason::GateReplyDerivationDisabled => "gate_reply_derivation_disabled",
            SkipReason::GateToolOnlyMode => "gate_tool_only_mode",
            SkipReason::GateToolVerdictNotProceed => "gate_tool_verdict_not_proceed",
            SkipReason::MissingToolVerdict => "missing_tool_verdict",
            SkipReason::MissingParentTriageTicket => "missing_parent_triage_ticket",
        }
    }
}

/// Outcome of a derivation attempt.
#[derive(Debug, Clone)]
pub enum DerivationOutcome {
    Created(Ticket),
    Idempotent(TicketId),
    RecoveredOrphan(TicketId),
    Skipped(SkipReason),
}

/// Source tag recorded on a TOOL ticket created from the ordinary fill
/// path, vs. one synthesized by the tail follower (§4.I, `tail:auto`).
pub const SOURCE_FILL_PATH: &str = "derivation:triage_to_tool";
pub const SOURCE_REPLY_FILL_PATH: &str = "derivation:tool_to_reply";
pub const SOURCE_TAIL_AUTO: &str = "tail:auto";

/// §4.F.1 `deriveToolFromTriage`. `outputs` is the TRIAGE ticket's posted
/// fill body. `source` tags the created TOOL ticket's origin.
pub fn derive_tool_from_triage(
    store: &TicketStore,
    triage: &Ticket,
    outputs: &Value,
    source: &str,
) -> DerivationOutcome {
    if let Some(child) = &triage.derived {
        return DerivationOutcome::Idempotent(child.ticket_id.clone());
    }

    let decision = outputs.get("decision").and_then(Value::as_str).unwrap_or_default();
    if !decision.eq_ignore_ascii_case("APPROVE") {
        return DerivationOutcome::Skipped(SkipReason::DecisionNotApprove);
    }

    let reply_strategy = outputs.get("reply_strategy").cloned().unwrap_or(Value::Null);
    let information_needs = outputs.get("information_needs").cloned();
    let mut inputs = json!({ "reply_strategy": reply_strategy });
    if let Some(needs) = information_needs {
        inputs["information_needs"] = needs;
    }

    let tool = store.create(CreateTicketRequest {
        kind: TicketKind::Tool,
        flow_id: "reply_zh_hant_v1".to_string(),
        candidate_id: triage.candidate_id.clone(),
        parent_ticket_id: Some(triage.id.clone()),
        triage_reference_id: Some(triage.id.clone()),
        event: triage.event.clone(),
        inputs,
        source: Some(source.to_string()),
        prompt_id: None,
    });

    store.set_derived(&triage.id, tool.id.clone());
    DerivationOutcome::Created(tool)
}

/// §4.F.2 `deriveReplyFromTool`. `outputs` is the TOOL ticket's posted
/// fill body; `tool.tool_verdict` is what the store already normalized
/// and stored at fill time, but `outputs.tool_verdict` takes precedence
/// per the normalizer's read-order rule.
pub fn derive_reply_from_tool(
    store: &TicketStore,
    config: &DerivationConfig,
    tool: &Ticket,
    outputs: &Value,
    source: &str,
) -> DerivationOutcome {
    if tool.kind != TicketKind::Tool {
        return DerivationOutcome::Skipped(SkipReason::GateKindNotTool);
    }
    if !config.enable_reply_derivation {
        return DerivationOutcome::Skipped(SkipReason::GateReplyDerivationDisabled);
    }
    if config.tool_only_mode {
        return DerivationOutcome::Skipped(SkipReason::GateToolOnlyMode);
    }

    let verdict = outputs
        .get("tool_verdict")
        .map(normalize_tool_verdict)
        .and_then(|outcome| match outcome {
            NormalizeOutcome::Valid(v) => Some(v),
            NormalizeOutcome::Invalid { .. } => None,
        })
        .or_else(|| tool.tool_verdict.clone());

    let verdict = match verdict {
        Some(v) => v,
        None => return DerivationOutcome::Skipped(SkipReason::MissingToolVerdict),
    };
    if verdict.status != tk_core::VerdictStatus::Proceed {
        return DerivationOutcome::Skipped(SkipReason::GateToolVerdictNotProceed);
    }

    if let Some(child) = &tool.derived {
        return DerivationOutcome::Idempotent(child.ticket_id.clone());
    }

    if let Some(orphan) = store.find_orphan_reply_for_parent(&tool.id) {
        store.set_derived(&tool.id, orphan.id.clone());
        return DerivationOutcome::RecoveredOrphan(orphan.id);
    }

    let triage_reference_id = match &tool.triage_reference_id {
        Some(id) => id.clone(),
        None => return DerivationOutcome::Skipped(SkipReason::MissingParentTriageTicket),
    };
    let Some(triage) = store.get(&triage_reference_id) else {
        return DerivationOutcome::Skipped(SkipReason::MissingParentTriageTicket);
    };

    let short_reason = triage
        .final_outputs
        .as_ref()
        .and_then(|o| o.get("short_reason"))
        .cloned()
        .unwrap_or(Value::Null);
    let inputs = json!({
        "brand_voice": triage.inputs.get("brand_voice").cloned().unwrap_or(Value::Null),
        "stance_summary": short_reason,
        "candidate_snippet": tool.inputs.get("candidate_snippet").cloned().unwrap_or(Value::Null),
        "context_notes": outputs.get("context_notes").cloned().unwrap_or(Value::Null),
        "reply_objectives": outputs.get("reply_objectives").cloned().unwrap_or(Value::Null),
    });

    let reply = store.create(CreateTicketRequest {
        kind: TicketKind::Reply,
        flow_id: tool.flow_id.clone(),
        candidate_id: tool.candidate_id.clone(),
        parent_ticket_id: Some(tool.id.clone()),
        triage_reference_id: Some(triage_reference_id),
        event: triage.event.clone(),
        inputs,
        source: Some(source.to_string()),
        prompt_id: None,
    });

    store.set_derived(&tool.id, reply.id.clone());
    DerivationOutcome::Created(reply)
}

#[cfg(test)]
#[path = "derivation_tests.rs"]
mod tests;
