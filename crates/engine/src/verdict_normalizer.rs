// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool Verdict Normalizer (§4.G): parses the wire shapes a filler may post
//! for `outputs.tool_verdict` into the canonical [`tk_core::ToolVerdict`].
//!
//! Read precedence is enforced by the caller, not here: `outputs.tool_verdict`
//! overrides `ticket.tool_verdict`, and there is no legacy-location read —
//! this module only ever sees the one value it was handed.

use serde_json::Value;
use tk_core::{ToolVerdict, VerdictStatus};

/// Outcome of normalization: either a canonical verdict, or the raw input
/// plus an `invalid_status` marker for evidence/debug purposes.
#[derive(Debug, Clone)]
pub enum NormalizeOutcome {
    Valid(ToolVerdict),
    Invalid { raw: String },
}

/// Normalize a raw `tool_verdict` value posted by a filler.
///
/// Accepts a bare string (`"proceed"`, `"DEFER"`, `"BLOCK"`, case-insensitive)
/// or an object `{status, reason?}`. Anything else — including a
/// present-but-unparseable status — is `Invalid`.
pub fn normalize_tool_verdict(raw: &Value) -> NormalizeOutcome {
    match raw {
        Value::String(s) => match VerdictStatus::parse(s) {
            Some(status) => NormalizeOutcome::Valid(ToolVerdict::new(status)),
            None => NormalizeOutcome::Invalid { raw: s.clone() },
        },
        Value::Object(obj) => {
            let status_raw = obj.get("status").and_then(Value::as_str);
            match status_raw.and_then(VerdictStatus::parse) {
                Some(status) => {
                    let reason = obj.get("reason").and_then(Value::as_str).map(str::to_string);
                    NormalizeOutcome::Valid(match reason {
                        Some(r) => ToolVerdict::with_reason(status, r),
                        None => ToolVerdict::new(status),
                    })
                }
                None => NormalizeOutcome::Invalid {
                    raw: raw.to_string(),
                },
            }
        }
        other => NormalizeOutcome::Invalid {
            raw: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_lowercase_string() {
        let outcome = normalize_tool_verdict(&json!("proceed"));
        assert!(matches!(
            outcome,
            NormalizeOutcome::Valid(v) if v.status == VerdictStatus::Proceed
        ));
    }

    #[test]
    fn parses_uppercase_string() {
        let outcome = normalize_tool_verdict(&json!("BLOCK"));
        assert!(matches!(
            outcome,
            NormalizeOutcome::Valid(v) if v.status == VerdictStatus::Block
        ));
    }

    #[test]
    fn parses_object_with_reason() {
        let outcome = normalize_tool_verdict(&json!({"status": "DEFER", "reason": "needs review"}));
        match outcome {
            NormalizeOutcome::Valid(v) => {
                assert_eq!(v.status, VerdictStatus::Defer);
                assert_eq!(v.reason.as_deref(), Some("needs review"));
            }
            NormalizeOutcome::Invalid { .. } => panic!("expected Valid"),
        }
    }

    #[test]
    fn unparseable_string_is_invalid_with_raw_preserved() {
        let outcome = normalize_tool_verdict(&json!("maybe"));
        match outcome {
            NormalizeOutcome::Invalid { raw } => assert_eq!(raw, "maybe"),
            NormalizeOutcome::Valid(_) => panic!("expected Invalid"),
        }
    }

    #[test]
    fn object_missing_status_is_invalid() {
        let outcome = normalize_tool_verdict(&json!({"reason": "no status here"}));
        assert!(matches!(outcome, NormalizeOutcome::Invalid { .. }));
    }

    #[test]
    fn number_is_invalid() {
        let outcome = normalize_tool_verdict(&json!(42));
        assert!(matches!(outcome, NormalizeOutcome::Invalid { .. }));
    }
}
