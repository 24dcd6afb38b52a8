// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global, immutable engine configuration (Design Notes: "a single
//! immutable config struct built at startup; subcomponents receive only
//! the slices they need").

use crate::env;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub gate0_min_len: u32,
    pub gate0b_enabled: bool,
    pub gate0b_min_len: u32,
    pub gate0b_min_likes: u32,
    pub gate0b_min_comments: u32,
}

#[derive(Debug, Clone)]
pub struct DerivationConfig {
    pub enable_tool_derivation: bool,
    pub enable_reply_derivation: bool,
    pub tool_only_mode: bool,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub gates: GateConfig,
    pub derivation: DerivationConfig,
    pub schema_gate_mode: env::SchemaGateMode,
    pub reindex_on_boot: bool,
    pub tail_snapshots: bool,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            gates: GateConfig {
                gate0_min_len: env::gate0_min_len(),
                gate0b_enabled: env::gate0b_enabled(),
                gate0b_min_len: env::gate0b_min_len(),
                gate0b_min_likes: env::gate0b_min_likes(),
                gate0b_min_comments: env::gate0b_min_comments(),
            },
            derivation: DerivationConfig {
                enable_tool_derivation: env::enable_tool_derivation(),
                enable_reply_derivation: env::enable_reply_derivation(),
                tool_only_mode: env::tool_only_mode(),
            },
            schema_gate_mode: env::schema_gate_mode(),
            reindex_on_boot: env::reindex_on_boot(),
            tail_snapshots: env::tail_snapshots(),
        }
    }
}
