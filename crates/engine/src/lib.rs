// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tk-engine: the triage/tool/reply orchestration logic — ticket store,
//! lease manager, derivation engine, readiness gate, and warm reindexer —
//! built on the pure domain model in `tk-core` and the persistence layer
//! in `tk-storage`.

pub mod config;
pub mod dep_keys;
pub mod derivation;
pub mod env;
mod error;
pub mod metrics;
pub mod readiness;
pub mod reindex;
pub mod store;
pub mod triage_filter;
pub mod verdict_normalizer;

pub use config::{DerivationConfig, EngineConfig, GateConfig};
pub use derivation::{derive_reply_from_tool, derive_tool_from_triage, DerivationOutcome, SkipReason};
pub use error::EngineError;
pub use metrics::{Metrics, ReadinessGauge, TicketCounts};
pub use readiness::{admit, Admission, ReadinessEvaluator, ReadinessSnapshot};
pub use reindex::{spawn_tail_loop, ReindexError, ReindexReport, TailFollower, TailStepReport, WarmReindexer};
pub use store::{clamp_lease_limit, clamp_lease_sec, clamp_list_limit, CreateTicketRequest, IdGenFn, ListFilter, TicketStore};
pub use triage_filter::{evaluate as evaluate_triage_filter, Engagement, FilterOutcome};
pub use verdict_normalizer::{normalize_tool_verdict, NormalizeOutcome};
