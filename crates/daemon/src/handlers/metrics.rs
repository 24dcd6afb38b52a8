// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::Extension;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// `GET /metrics` (§4.K): Prometheus text exposition of guard-reject
/// counters, the readiness gauge, and live ticket counts.
pub async fn metrics(Extension(state): Extension<Arc<AppState>>) -> Response {
    let counts = state.store.count_by_status();
    let body = state.metrics.render_prometheus(counts);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
