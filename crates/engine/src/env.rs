// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate (§6.3).

fn flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn int(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

pub fn enable_tool_derivation() -> bool {
    flag("ENABLE_TOOL_DERIVATION", true)
}

pub fn enable_reply_derivation() -> bool {
    flag("ENABLE_REPLY_DERIVATION", true)
}

pub fn tool_only_mode() -> bool {
    flag("TOOL_ONLY_MODE", false)
}

pub fn gate0_min_len() -> u32 {
    int("GATE0_MIN_LEN", 10)
}

pub fn gate0b_enabled() -> bool {
    flag("GATE0B_ENABLED", false)
}

pub fn gate0b_min_len() -> u32 {
    int("GATE0B_MIN_LEN", 0)
}

pub fn gate0b_min_likes() -> u32 {
    int("GATE0B_MIN_LIKES", 0)
}

pub fn gate0b_min_comments() -> u32 {
    int("GATE0B_MIN_COMMENTS", 0)
}

/// `SCHEMA_GATE_MODE` ∈ {off, warn, strict}; unrecognized values fall back
/// to `off` rather than strict, since a typo should never start rejecting
/// requests.
pub fn schema_gate_mode() -> SchemaGateMode {
    match std::env::var("SCHEMA_GATE_MODE").ok().as_deref() {
        Some("warn") => SchemaGateMode::Warn,
        Some("strict") => SchemaGateMode::Strict,
        _ => SchemaGateMode::Off,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaGateMode {
    Off,
    Warn,
    Strict,
}

pub fn reindex_on_boot() -> bool {
    flag("ORCH_REINDEX_ON_BOOT", true)
}

pub fn tail_snapshots() -> bool {
    flag("ORCH_TAIL_SNAPSHOTS", true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parses_common_truthy_spellings() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(flag_value(v), "expected {v} to parse as true");
        }
        for v in ["0", "false", "", "nope"] {
            assert!(!flag_value(v), "expected {v} to parse as false");
        }
    }

    fn flag_value(raw: &str) -> bool {
        matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    }

    #[test]
    fn int_falls_back_on_unparseable_value() {
        assert_eq!("not-a-number".parse::<u32>().ok(), None);
    }

    #[test]
    fn schema_gate_mode_recognizes_warn_and_strict() {
        assert_eq!(
            match "warn" {
                "warn" => SchemaGateMode::Warn,
                "strict" => SchemaGateMode::Strict,
                _ => SchemaGateMode::Off,
            },
            SchemaGateMode::Warn
        );
    }
}
