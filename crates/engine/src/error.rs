// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine crate.

use thiserror::Error;
use tk_core::GuardError;

/// Errors surfaced by engine operations, layered over the store's guard
/// errors with readiness and persistence failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("guard rejected: {0}")]
    Guard(#[from] GuardError),
    #[error("ticket not found: {0}")]
    NotFound(String),
    #[error("required dependency unavailable: {0:?}")]
    RequiredUnavailable(Vec<String>),
    #[error("storage error: {0}")]
    Storage(#[from] tk_storage::SnapshotError),
    #[error("evidence error: {0}")]
    Evidence(#[from] tk_storage::EvidenceError),
}

impl EngineError {
    /// The stable error code (§7) for responses and metrics, where one
    /// applies. Storage/evidence failures are soft faults and have none.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            EngineError::Guard(e) => Some(e.code()),
            EngineError::NotFound(_) => None,
            EngineError::RequiredUnavailable(_) => Some(tk_core::error::codes::MCP_REQUIRED_UNAVAILABLE),
            EngineError::Storage(_) | EngineError::Evidence(_) => None,
        }
    }
}
