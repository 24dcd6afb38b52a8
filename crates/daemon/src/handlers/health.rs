// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::Extension;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::state::AppState;

/// `GET /health` (§6.1): the readiness snapshot, not a liveness ping —
/// consumers poll this to decide whether gated endpoints will currently
/// admit traffic.
pub async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.readiness_snapshot();
    let at = chrono::DateTime::from_timestamp_millis(snapshot.as_of_ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();

    let required: Value = Value::Object(
        snapshot
            .required
            .iter()
            .map(|(k, v)| (k.clone(), json!({"ready": v.ready, "code": v.code})))
            .collect::<Map<String, Value>>(),
    );
    let optional: Value = Value::Object(
        snapshot
            .optional
            .iter()
            .map(|(k, v)| (k.clone(), json!({"ready": v.ready, "code": v.code})))
            .collect::<Map<String, Value>>(),
    );

    Json(json!({
        "status": if snapshot.degraded { "degraded" } else { "ok" },
        "required": required,
        "optional": optional,
        "at": at,
    }))
}
