// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate (§6.3).

use std::path::PathBuf;

fn flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Bearer-auth gate on `/v1/*` (§6.1).
pub fn require_auth() -> bool {
    flag("REQUIRE_AUTH", false)
}

pub fn triage_bearer_token() -> Option<String> {
    std::env::var("TRIAGE_BEARER_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Resolve `LOGS_DIR`: defaults to `./logs`, matching the teacher's
/// fallback-chain style in `engine/src/env.rs::state_dir`.
pub fn logs_dir() -> PathBuf {
    std::env::var("LOGS_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./logs"))
}

/// Snapshot file name overrides, relative to `logs_dir()` unless absolute.
pub fn triage_snapshot_name() -> String {
    std::env::var("TRIAGE_SNAPSHOT").unwrap_or_else(|_| "triage_decisions.jsonl".to_string())
}

pub fn reply_snapshot_name() -> String {
    std::env::var("REPLY_SNAPSHOT").unwrap_or_else(|_| "reply_results.jsonl".to_string())
}

pub fn snapshot_watermark_name() -> String {
    std::env::var("SNAPSHOT_WATERMARK").unwrap_or_else(|_| "reply_watermark.json".to_string())
}

/// Provider selection for the external tool-gateway collaborator. The
/// daemon only stores these — per §1/§10.3 the gateway itself is out of
/// scope and no `ExecuteTool` port is wired up by this crate's own tests.
pub fn run_real_mcp_tests() -> bool {
    flag("RUN_REAL_MCP_TESTS", false)
}

pub fn no_mcp() -> bool {
    flag("NO_MCP", false)
}

pub fn mcp_config_path() -> Option<PathBuf> {
    std::env::var("MCP_CONFIG_PATH").ok().map(PathBuf::from)
}

/// Bind address for the HTTP listener.
pub fn bind_addr() -> String {
    std::env::var("TK_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

/// Lease-reaper sweep interval (§4.C: "fixed interval (~5s)").
pub fn reaper_interval_ms() -> u64 {
    std::env::var("TK_REAPER_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5_000)
}

/// Tail-follower fallback poll interval, used alongside filesystem
/// change notifications (§4.I).
pub fn tail_poll_interval_ms() -> u64 {
    std::env::var("TK_TAIL_POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(1_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_dir_falls_back_to_relative_default() {
        std::env::remove_var("LOGS_DIR");
        assert_eq!(logs_dir(), PathBuf::from("./logs"));
    }

    #[test]
    fn triage_bearer_token_is_none_when_empty() {
        std::env::set_var("TRIAGE_BEARER_TOKEN", "");
        assert_eq!(triage_bearer_token(), None);
        std::env::remove_var("TRIAGE_BEARER_TOKEN");
    }
}
