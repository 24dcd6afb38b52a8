// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical tool verdict shape.
//!
//! Parsing of the various wire shapes fillers may post (bare string or
//! `{status, reason}` object) lives in `tk-engine`'s verdict normalizer;
//! this module only holds the canonical, already-normalized result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical verdict status a TOOL ticket's fill can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Proceed,
    Defer,
    Block,
}

impl VerdictStatus {
    /// Parse a case-insensitive status token. Returns `None` for anything else.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "PROCEED" => Some(Self::Proceed),
            "DEFER" => Some(Self::Defer),
            "BLOCK" => Some(Self::Block),
            _ => None,
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed => write!(f, "PROCEED"),
            Self::Defer => write!(f, "DEFER"),
            Self::Block => write!(f, "BLOCK"),
        }
    }
}

/// A normalized tool verdict, written onto `Ticket::tool_verdict` at fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolVerdict {
    pub status: VerdictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ToolVerdict {
    pub fn new(status: VerdictStatus) -> Self {
        Self {
            status,
            reason: None,
        }
    }

    pub fn with_reason(status: VerdictStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(VerdictStatus::parse("proceed"), Some(VerdictStatus::Proceed));
        assert_eq!(VerdictStatus::parse("DEFER"), Some(VerdictStatus::Defer));
        assert_eq!(VerdictStatus::parse("Block"), Some(VerdictStatus::Block));
        assert_eq!(VerdictStatus::parse("nonsense"), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for status in [VerdictStatus::Proceed, VerdictStatus::Defer, VerdictStatus::Block] {
            assert_eq!(VerdictStatus::parse(&status.to_string()), Some(status));
        }
    }
}
