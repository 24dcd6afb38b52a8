// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/v1/reply/*` (§6.1): read/export views over the REPLY ticket kind,
//! analogous to `/v1/triage/*`.

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use tk_core::{Ticket, TicketId, TicketKind};
use tk_engine::ListFilter;

use crate::error::AppError;
use crate::handlers::triage::ListExportQuery;
use crate::state::AppState;

fn matches_filters(ticket: &Ticket, q: &ListExportQuery) -> bool {
    if let Some(state) = &q.state {
        let actual = match ticket.status {
            tk_core::TicketStatus::Done => "DONE",
            _ => "PENDING",
        };
        if !actual.eq_ignore_ascii_case(state) {
            return false;
        }
    }
    true
}

pub async fn list(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ListExportQuery>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let filter = ListFilter {
        kind: Some(TicketKind::Reply),
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
    let filter = ListFilter {
        kind: Some(TicketKind::Reply),
        status: None,
    };
    let tickets: Vec<_> = state
        .store
        .list(&filter, query.limit.unwrap_or(10_000))
        .into_iter()
        .filter(|t| matches_filters(t, &query))
        .collect();
    let format = query.format.clone().unwrap_or_else(|| "json".to_string());
    match format.as_str() {
        "ndjson" => {
            let mut out = String::new();
            for t in &tickets {
                out.push_str(&serde_json::to_string(t).map_err(|e| AppError::Internal(e.to_string()))?);
                out.push('\n');
            }
            Ok(([(axum::http::header::CONTENT_TYPE, "application/x-ndjson")], out).into_response())
        }
        _ => Ok(Json(tickets).into_response()),
    }
}

pub async fn raw(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let ticket = state.store.get(&TicketId::new(id)).ok_or(AppError::NotFound)?;
    Ok(Json(serde_json::to_value(&ticket).map_err(|e| AppError::Internal(e.to_string()))?))
}
