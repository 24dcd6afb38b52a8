// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /events` (§6.1): the ingest boundary — Gate-0/0B filtering, event
//! dedup, and TRIAGE ticket creation.

use std::sync::Arc;

use axum::extract::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use tk_engine::{evaluate_triage_filter, CreateTicketRequest, Engagement};
use tk_core::TicketKind;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub event_id: String,
    pub thread_id: String,
    pub content: String,
    pub actor: String,
    pub timestamp: String,
    #[serde(default)]
    pub features: Option<Value>,
}

fn engagement(features: &Option<Value>) -> Engagement {
    let Some(features) = features else {
        return Engagement::default();
    };
    let engagement = features.get("engagement");
    Engagement {
        likes: engagement.and_then(|e| e.get("likes")).and_then(Value::as_u64).unwrap_or(0) as u32,
        comments: engagement.and_then(|e| e.get("comments")).and_then(Value::as_u64).unwrap_or(0) as u32,
    }
}

pub async fn post_event(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<EventPayload>,
) -> Result<Json<Value>, AppError> {
    if payload.event_id.is_empty() || payload.thread_id.is_empty() || payload.content.is_empty() {
        return Err(AppError::SchemaValidation("event_id, thread_id, and content are required".to_string()));
    }

    if !state.try_claim_event(&payload.event_id) {
        return Ok(Json(json!({"status": "duplicate"})));
    }

    let engagement = engagement(&payload.features);
    let event = json!({
        "type": payload.event_type,
        "event_id": payload.event_id,
        "thread_id": payload.thread_id,
        "actor": payload.actor,
        "timestamp": payload.timestamp,
        "features": payload.features,
    });

    match evaluate_triage_filter(&state.config.engine.gates, &payload.content, engagement) {
        tk_engine::FilterOutcome::Skip { reason } => {
            let line = json!({
                "ver": 1,
                "candidate_id": payload.event_id,
                "state": "SKIPPED",
                "flow_id": "triage_zh_hant_v1",
                "event": event,
                "reason": reason,
            });
            let _ = state.writer.append_triage_decision(&line);
            state.record_event_outcome(&payload.event_id, None);
            Ok(Json(json!({"status": "skipped", "reason": reason})))
        }
        tk_engine::FilterOutcome::Pass => {
            let inputs = json!({
                "content": payload.content,
                "actor": payload.actor,
                "timestamp": payload.timestamp,
                "features": payload.features,
            });
            let ticket = state.store.create(CreateTicketRequest {
                kind: TicketKind::Triage,
                flow_id: "triage_zh_hant_v1".to_string(),
                candidate_id: payload.event_id.clone(),
                parent_ticket_id: None,
                triage_reference_id: None,
                event,
                inputs,
                source: Some("http:events".to_string()),
                prompt_id: None,
            });
            state.record_event_outcome(&payload.event_id, Some(ticket.id.clone()));
            Ok(Json(json!({"ticket_id": ticket.id.to_string(), "status": "queued"})))
        }
    }
}
