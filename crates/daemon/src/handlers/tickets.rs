// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/v1/tickets/*` (§6.1): lease, fill, and read endpoints.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tk_core::{GuardError, Ticket, TicketId, TicketKind, TicketStatus};
use tk_engine::{derivation, Admission, ListFilter};

use crate::error::{AppError, ReadinessBlocked};
use crate::evidence_support;
use crate::state::AppState;

fn readiness_gate(state: &AppState) -> Result<(), AppError> {
    match state.admit_gated() {
        Admission::Allowed => Ok(()),
        Admission::Blocked {
            missing_required,
            degraded,
            as_of_ms,
        } => Err(AppError::Readiness(ReadinessBlocked {
            missing_required,
            degraded,
            as_of_ms,
        })),
    }
}

#[derive(Debug, Deserialize)]
pub struct LeaseRequest {
    pub kind: TicketKind,
    pub limit: Option<u32>,
    pub lease_sec: Option<u32>,
    #[serde(default = "default_owner")]
    pub owner: String,
}

fn default_owner() -> String {
    "unspecified".to_string()
}

fn schema_ref_for(kind: TicketKind) -> String {
    format!("{}.v1", kind.to_string().to_lowercase())
}

fn iso(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

pub async fn lease(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<LeaseRequest>,
) -> Result<Json<Vec<Value>>, AppError> {
    if req.kind == TicketKind::Tool {
        readiness_gate(&state)?;
    }
    let leased = state.store.lease(req.kind, req.limit.unwrap_or(1), req.lease_sec, &req.owner);
    let views = leased
        .into_iter()
        .map(|t| {
            let lease = t.lease.as_ref();
            json!({
                "ticket_id": t.id.to_string(),
                "prompt_id": t.metadata.prompt_id,
                "schema_ref": schema_ref_for(t.kind),
                "inputs": t.inputs,
                "lease_id": lease.map(|l| l.token.clone()),
                "lease_expire_at": lease.map(|l| iso(l.expires_at_ms)),
                "metadata": t.metadata,
            })
        })
        .collect();
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
pub struct FillRequest {
    pub outputs: Value,
    pub by: String,
    #[serde(default)]
    pub lease_owner: Option<String>,
    #[serde(default)]
    pub lease_token: Option<String>,
}

fn guard_needs_evidence(code: &str) -> bool {
    code == tk_core::error::codes::LEASE_OWNER_MISMATCH || code == tk_core::error::codes::INVALID_TOOL_VERDICT
}

async fn emit_guard_evidence(
    state: &AppState,
    ticket: &Ticket,
    err: &GuardError,
    req: &FillRequest,
) -> Option<String> {
    let code = err.code();
    if !guard_needs_evidence(code) {
        return None;
    }
    let now = state.clock.epoch_ms();
    let result = match err {
        GuardError::LeaseOwnerMismatch => {
            let lease = ticket.lease.as_ref()?;
            evidence_support::emit_lease_mismatch(
                &state.evidence,
                ticket.id.as_str(),
                &lease.owner,
                &lease.token,
                req.lease_owner.as_deref(),
                now,
            )
        }
        GuardError::InvalidToolVerdict { .. } => {
            let raw = req.outputs.get("tool_verdict").cloned().unwrap_or(Value::Null);
            evidence_support::emit_invalid_tool_verdict(&state.evidence, ticket.id.as_str(), &raw, now)
        }
        _ => return None,
    };
    match result {
        Ok(run_id) => Some(run_id),
        Err(e) => {
            tracing::warn!(error = %e, "failed to emit guard-reject evidence");
            None
        }
    }
}

/// Best-effort snapshot + derivation fan-out after a successful fill
/// (§7: "Derivation failures inside the fill path are logged but must
/// not roll back the fill itself").
fn after_complete(state: &AppState, ticket: &Ticket, outputs: &Value) {
    match ticket.kind {
        TicketKind::Triage if ticket.status == TicketStatus::Done => {
            let line = json!({
                "ver": 1,
                "candidate_id": ticket.candidate_id,
                "state": "DONE",
                "flow_id": ticket.flow_id,
                "event": ticket.event,
                "inputs": ticket.inputs,
                "triage_result": outputs,
            });
            if let Err(e) = state.writer.append_triage_decision(&line) {
                tracing::warn!(error = %e, "failed to append triage decision snapshot");
            }
            match derivation::derive_tool_from_triage(&state.store, ticket, outputs, derivation::SOURCE_FILL_PATH) {
                tk_engine::DerivationOutcome::Skipped(reason) => {
                    tracing::info!(ticket_id = %ticket.id, reason = reason.code(), "tool derivation skipped");
                }
                _ => {}
            }
        }
        TicketKind::Tool if ticket.status == TicketStatus::Done => {
            match derivation::derive_reply_from_tool(
                &state.store,
                &state.config.engine.derivation,
                ticket,
                outputs,
                derivation::SOURCE_REPLY_FILL_PATH,
            ) {
                tk_engine::DerivationOutcome::Skipped(reason) => {
                    tracing::info!(ticket_id = %ticket.id, reason = reason.code(), "reply derivation skipped");
                }
                _ => {}
            }
        }
        TicketKind::Reply if ticket.status == TicketStatus::Done => {
            let line = json!({
                "ver": 1,
                "candidate_id": ticket.candidate_id,
                "state": "DONE",
                "flow_id": ticket.flow_id,
                "event": ticket.event,
                "inputs": ticket.inputs,
                "reply_result": outputs,
            });
            if let Err(e) = state.writer.append_reply_result(&line) {
                tracing::warn!(error = %e, "failed to append reply result snapshot");
            }
        }
        _ => {}
    }
}

pub async fn fill(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<FillRequest>,
) -> Result<Json<Ticket>, AppError> {
    let ticket_id = TicketId::new(id);
    let before = state.store.get(&ticket_id).ok_or(AppError::NotFound)?;

    if before.kind == TicketKind::Tool {
        readiness_gate(&state)?;
    }

    let lease_proof = match (&req.lease_owner, &req.lease_token) {
        (Some(owner), Some(token)) => Some((owner.as_str(), token.as_str())),
        _ => None,
    };

    match state.store.complete(&ticket_id, req.outputs.clone(), &req.by, lease_proof) {
        Ok(ticket) => {
            after_complete(&state, &ticket, &req.outputs);
            Ok(Json(ticket))
        }
        Err(e) => {
            let evidence_run_id = emit_guard_evidence(&state, &before, &e, &req).await;
            Err(AppError::Guard(crate::error::GuardReject {
                code: e.code(),
                status: crate::error::guard_status(e.code()),
                evidence_run_id,
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<TicketStatus>,
    pub kind: Option<TicketKind>,
    pub limit: Option<usize>,
}

pub async fn list_tickets(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Ticket>> {
    let filter = ListFilter {
        kind: query.kind,
        status: query.status,
    };
    Json(state.store.list(&filter, query.limit.unwrap_or(10_000)))
}

pub async fn get_ticket(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    state.store.get(&TicketId::new(id)).map(Json).ok_or(AppError::NotFound)
}
