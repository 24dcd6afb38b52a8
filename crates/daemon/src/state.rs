// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared, process-wide state handed to every handler via an `Extension`
//! (§5: "a single per-store mutex", "one serial writer per file").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use tk_core::{Clock, DepState, TicketId};
use tk_engine::{admit, Admission, Metrics, ReadinessEvaluator, ReadinessSnapshot, TicketStore};
use tk_storage::{EvidenceWriter, SnapshotWriter};

use crate::config::Config;

/// Process-wide shared state. Cloned cheaply (every field is an `Arc` or
/// a lock), then handed to the router as a single `Extension`.
pub struct AppState {
    pub store: Arc<TicketStore>,
    pub writer: Arc<SnapshotWriter>,
    pub evidence: Arc<EvidenceWriter>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    /// Raw provider health, keyed by provider id (§4.D: "the same map
    /// backs both required and optional dep keys").
    provider_health: Mutex<HashMap<String, DepState>>,
    /// `event_id -> ticket_id` dedup index for `POST /events` (§8:
    /// "Duplicate `POST /events` with same `event_id`: ... no new
    /// ticket, no new snapshot"). A `None` value records an event that
    /// was accepted but skipped by the triage filter, which also must
    /// not be replayed.
    event_dedup: Mutex<HashMap<String, Option<TicketId>>>,
}

impl AppState {
    pub fn new(
        store: Arc<TicketStore>,
        writer: Arc<SnapshotWriter>,
        evidence: Arc<EvidenceWriter>,
        metrics: Arc<Metrics>,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            writer,
            evidence,
            metrics,
            config,
            clock,
            provider_health: Mutex::new(HashMap::new()),
            event_dedup: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_provider_health(&self, provider_id: impl Into<String>, state: DepState) {
        self.provider_health.lock().insert(provider_id.into(), state);
    }

    pub fn readiness_snapshot(&self) -> ReadinessSnapshot {
        let health = self.provider_health.lock().clone();
        let snapshot = ReadinessEvaluator::evaluate(&health, self.clock.epoch_ms());
        ReadinessEvaluator::publish(&snapshot, &self.metrics);
        snapshot
    }

    /// HTTP admission gate for endpoints that touch the tool gateway
    /// (§4.D: "HTTP admission gate ... returns 503 ... when any dep the
    /// endpoint needs is unready"). TOOL-kind lease/fill are the only
    /// endpoints this crate exposes that need the gateway's deps.
    pub fn admit_gated(&self) -> Admission {
        admit(&self.readiness_snapshot(), &self.metrics)
    }

    /// Atomically claims `event_id` for first-time processing. Returns
    /// `true` if this call is the first to see it (§8: "Duplicate `POST
    /// /events` with same `event_id`: second call returns
    /// `{status:"duplicate"}`, no new ticket, no new snapshot").
    pub fn try_claim_event(&self, event_id: &str) -> bool {
        let mut seen = self.event_dedup.lock();
        if seen.contains_key(event_id) {
            return false;
        }
        seen.insert(event_id.to_string(), None);
        true
    }

    /// Record the outcome of an event claimed via `try_claim_event`.
    /// `ticket_id` is `None` when the triage filter skipped it.
    pub fn record_event_outcome(&self, event_id: &str, ticket_id: Option<TicketId>) {
        if let Some(slot) = self.event_dedup.lock().get_mut(event_id) {
            *slot = ticket_id;
        }
    }
}
