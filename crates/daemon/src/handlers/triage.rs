// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/v1/triage/*` (§6.1): batch ingestion plus read/export views over the
//! TRIAGE ticket kind.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Query};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tk_core::{TicketKind, TicketStatus};
use tk_engine::{evaluate_triage_filter, CreateTicketRequest, Engagement, FilterOutcome, ListFilter};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CandidateLite {
    pub candidate_id: String,
    pub content: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default)]
    pub features: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub candidates: Vec<CandidateLite>,
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub wait_ms: Option<u64>,
    #[serde(default)]
    pub dedupe: Option<bool>,
}

const POLL_STEP_MS: u64 = 20;

fn engagement_from(features: &Option<Value>) -> Engagement {
    let Some(features) = features else {
        return Engagement::default();
    };
    let e = features.get("engagement");
    Engagement {
        likes: e.and_then(|v| v.get("likes")).and_then(Value::as_u64).unwrap_or(0) as u32,
        comments: e.and_then(|v| v.get("comments")).and_then(Value::as_u64).unwrap_or(0) as u32,
    }
}

fn state_str(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Done => "DONE",
        TicketStatus::Blocked => "SKIPPED",
        _ => "PENDING",
    }
}

pub async fn batch(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<BatchQuery>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<Value>, AppError> {
    if req.candidates.is_empty() {
        return Err(AppError::InvalidPayload("candidates must be non-empty".to_string()));
    }
    let dedupe = query.dedupe.unwrap_or(true);
    let sync = query.mode.as_deref() == Some("sync");
    let wait_ms = query.wait_ms.unwrap_or(0);

    let mut results = Vec::with_capacity(req.candidates.len());
    for candidate in &req.candidates {
        if dedupe {
            if let Some(existing) = state.store.find_triage_by_candidate(&candidate.candidate_id) {
                results.push(json!({
                    "candidate_id": candidate.candidate_id,
                    "state": state_str(existing.status),
                    "triage_ticket_id": existing.id.to_string(),
                    "triage_result": existing.final_outputs,
                }));
                continue;
            }
        }

        let engagement = engagement_from(&candidate.features);
        match evaluate_triage_filter(&state.config.engine.gates, &candidate.content, engagement) {
            FilterOutcome::Skip { reason } => {
                let line = json!({
                    "ver": 1,
                    "candidate_id": candidate.candidate_id,
                    "state": "SKIPPED",
                    "flow_id": "triage_zh_hant_v1",
                    "event": candidate.event,
                    "reason": reason,
                });
                let _ = state.writer.append_triage_decision(&line);
                results.push(json!({
                    "candidate_id": candidate.candidate_id,
                    "state": "SKIPPED",
                    "reason": reason,
                }));
            }
            FilterOutcome::Pass => {
                let inputs = json!({
                    "content": candidate.content,
                    "actor": candidate.actor,
                    "features": candidate.features,
                });
                let ticket = state.store.create(CreateTicketRequest {
                    kind: TicketKind::Triage,
                    flow_id: "triage_zh_hant_v1".to_string(),
                    candidate_id: candidate.candidate_id.clone(),
                    parent_ticket_id: None,
                    triage_reference_id: None,
                    event: candidate.event.clone().unwrap_or(Value::Null),
                    inputs,
                    source: Some("http:triage_batch".to_string()),
                    prompt_id: None,
                });

                let mut waited = 0u64;
                let mut latest = ticket.clone();
                if sync {
                    while waited < wait_ms {
                        if let Some(t) = state.store.get(&ticket.id) {
                            latest = t;
                            if latest.status == TicketStatus::Done {
                                break;
                            }
                        }
                        tokio::time::sleep(Duration::from_millis(POLL_STEP_MS)).await;
                        waited += POLL_STEP_MS;
                    }
                    if let Some(t) = state.store.get(&ticket.id) {
                        latest = t;
                    }
                }

                results.push(json!({
                    "candidate_id": candidate.candidate_id,
                    "state": state_str(latest.status),
                    "triage_ticket_id": latest.id.to_string(),
                    "triage_result": latest.final_outputs,
                }));
            }
        }
    }

    Ok(Json(json!({"results": results})))
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub ids: String,
}

pub async fn results(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ResultsQuery>,
) -> Json<Value> {
    let results: Vec<Value> = query
        .ids
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|candidate_id| match state.store.find_triage_by_candidate(candidate_id) {
            Some(t) => json!({
                "id": candidate_id,
                "state": state_str(t.status),
                "triage_ticket_id": t.id.to_string(),
                "triage_result": t.final_outputs,
            }),
            None => json!({"id": candidate_id, "state": "UNKNOWN"}),
        })
        .collect();
    Json(json!({"results": results}))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListExportQuery {
    pub state: Option<String>,
    pub decision: Option<String>,
    pub reason_like: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub format: Option<String>,
}

fn matches_filters(ticket: &tk_core::Ticket, q: &ListExportQuery) -> bool {
    if let Some(state) = &q.state {
        if !state_str(ticket.status).eq_ignore_ascii_case(state) {
            return false;
        }
    }
    if let Some(decision) = &q.decision {
        let actual = ticket.final_outputs.as_ref().and_then(|o| o.get("decision")).and_then(Value::as_str);
        if actual.map(|a| !a.eq_ignore_ascii_case(decision)).unwrap_or(true) {
            return false;
        }
    }
    true
}

fn render_list(tickets: Vec<tk_core::Ticket>, format: &str) -> Result<(axum::http::HeaderValue, String), AppError> {
    match format {
        "ndjson" => {
            let mut out = String::new();
            for t in &tickets {
                out.push_str(&serde_json::to_string(t).map_err(|e| AppError::Internal(e.to_string()))?);
                out.push('\n');
            }
            Ok((axum::http::HeaderValue::from_static("application/x-ndjson"), out))
        }
        "csv" => {
            let mut out = String::from("ticket_id,candidate_id,status,decision\n");
            for t in &tickets {
                let decision = t.final_outputs.as_ref().and_then(|o| o.get("decision")).and_then(Value::as_str).unwrap_or("");
                out.push_str(&format!("{},{},{},{}\n", t.id, t.candidate_id, t.status, decision));
            }
            Ok((axum::http::HeaderValue::from_static("text/csv"), out))
        }
        _ => {
            let out = serde_json::to_string(&tickets).map_err(|e| AppError::Internal(e.to_string()))?;
            Ok((axum::http::HeaderValue::from_static("application/json"), out))
        }
    }
}

pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListExportQuery>,
) -> Result<Json<Vec<tk_core::Ticket>>, AppError> {
    let filter = ListFilter {
        kind: Some(TicketKind::Triage),
        status: None,
    };
    let tickets: Vec<_> = state
        .store
        .list(&filter, query.limit.unwrap_or(10_000))
        .into_iter()
        .filter(|t| matches_filters(t, &query))
        .collect();
    Ok(Json(tickets))
}

pub async fn export(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListExportQuery>,
) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;
    let filter = ListFilter {
        kind: Some(TicketKind::Triage),
        status: None,
    };
    let tickets: Vec<_> = state
        .store
        .list(&filter, query.limit.unwrap_or(10_000))
        .into_iter()
        .filter(|t| matches_filters(t, &query))
        .collect();
    let format = query.format.clone().unwrap_or_else(|| "json".to_string());
    let (content_type, body) = render_list(tickets, &format)?;
    Ok(([(axum::http::header::CONTENT_TYPE, content_type)], body).into_response())
}
