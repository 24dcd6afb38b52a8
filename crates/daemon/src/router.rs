// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP router assembly (§6.1): a public surface (`/events`, `/health`,
//! `/metrics`) and a bearer-gated `/v1/*` surface.

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{BoxError, Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Generous per-request timeout (§5: "The HTTP server applies a
/// generous per-request timeout; slow `sync` batch ingestion returns
/// whatever it has gathered at the deadline").
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

async fn handle_timeout(_err: BoxError) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::REQUEST_TIMEOUT, Json(json!({"error_code": "REQUEST_TIMEOUT"})))
}

use crate::auth::require_bearer;
use crate::config::Config;
use crate::handlers::{events, health, metrics, reply, tickets, triage};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>, config: Arc<Config>) -> Router {
    let public = Router::new()
        .route("/events", post(events::post_event))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics));

    let protected = Router::new()
        .route("/v1/triage/batch", post(triage::batch))
        .route("/v1/triage/results", get(triage::results))
        .route("/v1/triage/list", get(triage::list))
        .route("/v1/triage/export", get(triage::export))
        .route("/v1/tickets/lease", post(tickets::lease))
        .route("/v1/tickets/:id/fill", post(tickets::fill))
        .route("/v1/tickets", get(tickets::list_tickets))
        .route("/v1/tickets/:id", get(tickets::get_ticket))
        .route("/v1/reply/list", get(reply::list))
        .route("/v1/reply/export", get(reply::export))
        .route("/v1/reply/tickets/:id/raw", get(reply::raw))
        .layer(middleware::from_fn(require_bearer))
        .layer(axum::Extension(config));

    public
        .merge(protected)
        .layer(axum::Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
}
