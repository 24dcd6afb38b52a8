// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP error shaping (§7): guarded rejects carry a stable code from a
//! closed set and, when system-caused, an `evidence_run_id`. Everything
//! else collapses to a small set of conventional HTTP failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tk_core::error::codes;
use tk_core::GuardError;

/// One guarded-reject response body (§6.1: "4xx `{error_code,
/// evidence_run_id?}` on guard reject").
#[derive(Debug)]
pub struct GuardReject {
    pub code: &'static str,
    pub status: StatusCode,
    pub evidence_run_id: Option<String>,
}

/// The readiness-gate 503 body (§6.1: "Canonical 503 body for gated
/// endpoints").
#[derive(Debug)]
pub struct ReadinessBlocked {
    pub missing_required: Vec<String>,
    pub degraded: bool,
    pub as_of_ms: u64,
}

#[derive(Debug)]
pub enum AppError {
    Guard(GuardReject),
    Readiness(ReadinessBlocked),
    NotFound,
    SchemaValidation(String),
    InvalidPayload(String),
    Unauthorized,
    Internal(String),
}

/// Maps a guard error's stable code to its HTTP status (§7's closed set).
pub fn guard_status(code: &str) -> StatusCode {
    match code {
        c if c == codes::LEASE_OWNER_MISMATCH => StatusCode::CONFLICT,
        c if c == codes::INVALID_TRANSITION => StatusCode::CONFLICT,
        c if c == codes::DIRECT_FILL_NOT_ALLOWED => StatusCode::FORBIDDEN,
        c if c == codes::DIRECT_FILL_MISSING_BY => StatusCode::BAD_REQUEST,
        c if c == codes::INVALID_TOOL_VERDICT => StatusCode::BAD_REQUEST,
        c if c == codes::SCHEMA_STRICT_REJECT => StatusCode::BAD_REQUEST,
        c if c == codes::MISSING_PARENT_TRIAGE_TICKET => StatusCode::CONFLICT,
        c if c == codes::MCP_REQUIRED_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl From<&GuardError> for GuardReject {
    fn from(e: &GuardError) -> Self {
        let code = e.code();
        GuardReject {
            code,
            status: guard_status(code),
            evidence_run_id: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Guard(g) => {
                let body = json!({
                    "error_code": g.code,
                    "evidence_run_id": g.evidence_run_id,
                });
                (g.status, Json(body)).into_response()
            }
            AppError::Readiness(r) => {
                let as_of = chrono::DateTime::from_timestamp_millis(r.as_of_ms as i64)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                let body = json!({
                    "error_code": codes::MCP_REQUIRED_UNAVAILABLE,
                    "missing_required": r.missing_required,
                    "degraded": r.degraded,
                    "as_of": as_of,
                });
                (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
            }
            AppError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"error_code": "NOT_FOUND"}))).into_response()
            }
            AppError::SchemaValidation(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error_code": "ERR_SCHEMA_VALIDATION", "reason": reason})),
            )
                .into_response(),
            AppError::InvalidPayload(reason) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error_code": "ERR_INVALID_PAYLOAD", "reason": reason})),
            )
                .into_response(),
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({"error_code": "UNAUTHORIZED"}))).into_response()
            }
            AppError::Internal(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error_code": "INTERNAL", "reason": reason})),
            )
                .into_response(),
        }
    }
}

impl From<tk_storage::SnapshotError> for AppError {
    fn from(e: tk_storage::SnapshotError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<tk_storage::EvidenceError> for AppError {
    fn from(e: tk_storage::EvidenceError) -> Self {
        AppError::Internal(e.to_string())
    }
}
