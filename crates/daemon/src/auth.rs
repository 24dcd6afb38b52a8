// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token gate for `/v1/*` (§6.1: "Optional bearer-token check for
//! all endpoints prefixed `/v1/` when `REQUIRE_AUTH=true`").

use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::Config;

fn unauthorized(reason: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error_code": "UNAUTHORIZED", "reason": reason}))).into_response()
}

pub async fn require_bearer(req: Request, next: Next) -> Result<Response, Response> {
    let config = req
        .extensions()
        .get::<Arc<Config>>()
        .cloned()
        .ok_or_else(|| unauthorized("auth not configured"))?;

    if !config.require_auth {
        return Ok(next.run(req).await);
    }

    let expected = config.triage_bearer_token.as_deref().ok_or_else(|| unauthorized("bearer token not configured"))?;

    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing authorization header"))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| unauthorized("malformed authorization header"))?;

    if token != expected {
        return Err(unauthorized("invalid bearer token"));
    }

    Ok(next.run(req).await)
}
