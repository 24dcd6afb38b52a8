// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency readiness state, one per known provider.

use serde::{Deserialize, Serialize};

/// Readiness of a single provider-backed dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepState {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DepState {
    pub fn ready() -> Self {
        Self {
            ready: true,
            code: None,
            detail: None,
        }
    }

    pub fn unready(code: impl Into<String>) -> Self {
        Self {
            ready: false,
            code: Some(code.into()),
            detail: None,
        }
    }

    pub fn unready_with_detail(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            ready: false,
            code: Some(code.into()),
            detail: Some(detail.into()),
        }
    }
}

/// Stable code used when a provider is absent or reports `ready=false` without
/// its own code.
pub const DEP_UNAVAILABLE: &str = "DEP_UNAVAILABLE";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_has_no_code() {
        let d = DepState::ready();
        assert!(d.ready);
        assert!(d.code.is_none());
    }

    #[test]
    fn unready_carries_code() {
        let d = DepState::unready(DEP_UNAVAILABLE);
        assert!(!d.ready);
        assert_eq!(d.code.as_deref(), Some(DEP_UNAVAILABLE));
    }
}
