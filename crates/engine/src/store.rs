// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket Store & Lease Manager (§4.B, §4.C): the authoritative in-memory
//! ticket map, guarded behind a single mutex per the concurrency model
//! (§5: "every mutator acquires a single per-store mutex for the duration
//! of the read-modify-write sequence").

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::RngCore;
use serde_json::Value;

use tk_core::{Clock, DirectFillAllowlist, Ticket, TicketConfig, TicketId, TicketKind, TicketStatus};
use tk_storage::{AuditKind, SnapshotWriter};

use crate::metrics::{Metrics, TicketCounts};
use crate::verdict_normalizer::{normalize_tool_verdict, NormalizeOutcome};

/// `triage_audit.jsonl` covers TRIAGE-stage rejects; `reply_audit.jsonl`
/// covers everything downstream of it (TOOL and REPLY), matching the two
/// streams §6.2 names.
fn audit_kind_for(kind: TicketKind) -> AuditKind {
    match kind {
        TicketKind::Triage => AuditKind::Triage,
        TicketKind::Tool | TicketKind::Reply => AuditKind::Reply,
    }
}

/// Lease size bound (§5: "Lease limit clamped into [1, 50]").
const LEASE_LIMIT_MIN: u32 = 1;
const LEASE_LIMIT_MAX: u32 = 50;
/// Lease duration bound in seconds (§5: "leaseSec ... clamped to a
/// sensible range (e.g. 30-600)").
const LEASE_SEC_MIN: u32 = 30;
const LEASE_SEC_MAX: u32 = 600;
const LEASE_SEC_DEFAULT: u32 = 120;
/// List/count bound (§5: "List operations accept a limit clamped into
/// [1, 10_000]").
const LIST_LIMIT_MIN: usize = 1;
const LIST_LIMIT_MAX: usize = 10_000;

pub fn clamp_lease_limit(limit: u32) -> u32 {
    limit.clamp(LEASE_LIMIT_MIN, LEASE_LIMIT_MAX)
}

pub fn clamp_lease_sec(lease_sec: Option<u32>) -> u32 {
    lease_sec.unwrap_or(LEASE_SEC_DEFAULT).clamp(LEASE_SEC_MIN, LEASE_SEC_MAX)
}

pub fn clamp_list_limit(limit: usize) -> usize {
    limit.clamp(LIST_LIMIT_MIN, LIST_LIMIT_MAX)
}

/// Fields needed to create a new ticket; the store assigns the id.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub kind: TicketKind,
    pub flow_id: String,
    pub candidate_id: String,
    pub parent_ticket_id: Option<TicketId>,
    pub triage_reference_id: Option<TicketId>,
    pub event: Value,
    pub inputs: Value,
    pub source: Option<String>,
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub kind: Option<TicketKind>,
    pub status: Option<TicketStatus>,
}

impl ListFilter {
    fn matches(&self, ticket: &Ticket) -> bool {
        self.kind.map(|k| k == ticket.kind).unwrap_or(true)
            && self.status.map(|s| s == ticket.status).unwrap_or(true)
    }
}

struct Inner {
    tickets: IndexMap<TicketId, Ticket>,
    triage_by_candidate: HashMap<String, TicketId>,
    reply_by_candidate: HashMap<String, TicketId>,
}

impl Inner {
    fn new() -> Self {
        Self {
            tickets: IndexMap::new(),
            triage_by_candidate: HashMap::new(),
            reply_by_candidate: HashMap::new(),
        }
    }
}

/// Generates the next ticket id. Boxed as a plain `Fn` rather than held
/// behind `tk_core::IdGen` directly, since that trait's `Clone` supertrait
/// (needed where it's used as a generic bound elsewhere) makes it object-unsafe.
pub type IdGenFn = Box<dyn Fn() -> String + Send + Sync>;

pub struct TicketStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    id_gen: IdGenFn,
    allowlist: DirectFillAllowlist,
    metrics: Arc<Metrics>,
    audit_writer: Option<Arc<SnapshotWriter>>,
}

impl TicketStore {
    pub fn new(clock: Arc<dyn Clock>, id_gen: IdGenFn, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            clock,
            id_gen,
            allowlist: DirectFillAllowlist::default(),
            metrics,
            audit_writer: None,
        }
    }

    /// Build a store using the production UUID id generator.
    pub fn with_uuid_ids(clock: Arc<dyn Clock>, metrics: Arc<Metrics>) -> Self {
        use tk_core::IdGen;
        Self::new(clock, Box::new(|| tk_core::UuidIdGen.next()), metrics)
    }

    /// Attach the Snapshot Writer so guarded rejects emit an audit record
    /// (§4.B: "every guarded reject ... emits one audit record") alongside
    /// the `ticket_store_guard_reject_total` metric.
    pub fn with_audit_writer(mut self, writer: Arc<SnapshotWriter>) -> Self {
        self.audit_writer = Some(writer);
        self
    }

    fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Records the metric only; called while `inner` is still locked. Callers
    /// must follow up with `emit_reject_audit` after the lock is released —
    /// the snapshot append is an I/O call and must never happen while the
    /// ticket-map mutex is held (see `tk_storage::writer`).
    fn record_reject(&self, code: &'static str, action: &str) {
        self.metrics.record_guard_reject(code, action);
    }

    /// Appends the guard-reject audit record (§4.B). Must be called only
    /// after the `inner` lock has been released.
    fn emit_reject_audit(&self, code: &'static str, action: &str, ticket_id: &TicketId, ticket_kind: TicketKind) {
        if let Some(writer) = &self.audit_writer {
            let record = serde_json::json!({
                "ver": 1,
                "ticket_id": ticket_id.as_str(),
                "kind": ticket_kind,
                "code": code,
                "action": action,
                "at_ms": self.now_ms(),
            });
            if let Err(e) = writer.append_audit(audit_kind_for(ticket_kind), &record) {
                tracing::warn!(error = %e, ticket_id = %ticket_id.as_str(), "failed to append guard-reject audit record");
            }
        }
    }

    pub fn create(&self, req: CreateTicketRequest) -> Ticket {
        let now = self.now_ms();
        let id = TicketId::new((self.id_gen)());
        let config = TicketConfig {
            id: id.clone(),
            kind: req.kind,
            flow_id: req.flow_id,
            candidate_id: req.candidate_id.clone(),
            parent_ticket_id: req.parent_ticket_id,
            triage_reference_id: req.triage_reference_id,
            event: req.event,
            inputs: req.inputs,
            source: req.source,
            prompt_id: req.prompt_id,
        };
        let ticket = Ticket::new(config, now);

        let mut inner = self.inner.lock();
        match req.kind {
            TicketKind::Triage => {
                inner.triage_by_candidate.insert(req.candidate_id, id.clone());
            }
            TicketKind::Reply => {
                inner.reply_by_candidate.insert(req.candidate_id, id.clone());
            }
            TicketKind::Tool => {}
        }
        inner.tickets.insert(id, ticket.clone());
        ticket
    }

    pub fn get(&self, id: &TicketId) -> Option<Ticket> {
        self.inner.lock().tickets.get(id).cloned()
    }

    pub fn list(&self, filter: &ListFilter, limit: usize) -> Vec<Ticket> {
        let limit = clamp_list_limit(limit);
        self.inner
            .lock()
            .tickets
            .values()
            .filter(|t| filter.matches(t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count(&self, filter: &ListFilter) -> usize {
        self.inner.lock().tickets.values().filter(|t| filter.matches(t)).count()
    }

    pub fn count_by_status(&self) -> TicketCounts {
        let inner = self.inner.lock();
        let mut counts = TicketCounts::default();
        for ticket in inner.tickets.values() {
            match ticket.status {
                TicketStatus::Pending => counts.pending += 1,
                TicketStatus::Running => counts.running += 1,
                TicketStatus::Done => counts.done += 1,
                TicketStatus::Failed => counts.failed += 1,
                TicketStatus::Blocked => counts.blocked += 1,
            }
        }
        counts
    }

    pub fn find_triage_by_candidate(&self, candidate_id: &str) -> Option<Ticket> {
        let inner = self.inner.lock();
        let id = inner.triage_by_candidate.get(candidate_id)?;
        inner.tickets.get(id).cloned()
    }

    pub fn find_reply_by_candidate(&self, candidate_id: &str) -> Option<Ticket> {
        let inner = self.inner.lock();
        let id = inner.reply_by_candidate.get(candidate_id)?;
        inner.tickets.get(id).cloned()
    }

    /// Scan for an orphan REPLY whose `parent_ticket_id` is `tool_id`
    /// (§4.F.2 orphan recovery): a REPLY that exists but whose parent
    /// TOOL ticket's own back-reference was never written, e.g. after a
    /// crash between ticket creation and `set_derived`.
    pub fn find_orphan_reply_for_parent(&self, tool_id: &TicketId) -> Option<Ticket> {
        self.inner
            .lock()
            .tickets
            .values()
            .find(|t| t.kind == TicketKind::Reply && t.parent_ticket_id.as_ref() == Some(tool_id))
            .cloned()
    }

    /// §4.C `Lease(kind, limit, leaseSec, owner)`: FIFO over `pending`
    /// tickets of the requested kind.
    pub fn lease(&self, kind: TicketKind, limit: u32, lease_sec: Option<u32>, owner: &str) -> Vec<Ticket> {
        let limit = clamp_lease_limit(limit) as usize;
        let lease_sec = clamp_lease_sec(lease_sec);
        let now = self.now_ms();
        let expires_at_ms = now + (lease_sec as u64) * 1000;

        let mut inner = self.inner.lock();
        let candidate_ids: Vec<TicketId> = inner
            .tickets
            .values()
            .filter(|t| t.kind == kind && t.status == TicketStatus::Pending)
            .take(limit)
            .map(|t| t.id.clone())
            .collect();

        let mut leased = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            if let Some(ticket) = inner.tickets.get_mut(&id) {
                let token = random_token();
                if ticket.lease(owner, token, expires_at_ms, now).is_ok() {
                    leased.push(ticket.clone());
                }
            }
        }
        leased
    }

    pub fn complete(
        &self,
        id: &TicketId,
        outputs: Value,
        by: &str,
        lease_proof: Option<(&str, &str)>,
    ) -> Result<Ticket, tk_core::GuardError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let ticket = inner
            .tickets
            .get_mut(id)
            .ok_or_else(|| tk_core::GuardError::InvalidTransition {
                from: TicketStatus::Done,
                action: "complete".to_string(),
            })?;

        let verdict = if ticket.kind == TicketKind::Tool {
            match outputs.get("tool_verdict") {
                Some(raw) => match normalize_tool_verdict(raw) {
                    NormalizeOutcome::Valid(v) => Some(v),
                    NormalizeOutcome::Invalid { raw } => {
                        let err = tk_core::GuardError::InvalidToolVerdict { raw };
                        let kind = ticket.kind;
                        self.record_reject(err.code(), "complete");
                        drop(inner);
                        self.emit_reject_audit(err.code(), "complete", id, kind);
                        return Err(err);
                    }
                },
                None => None,
            }
        } else {
            None
        };

        match ticket.complete(outputs, by, lease_proof, &self.allowlist, verdict, now) {
            Ok(()) => Ok(ticket.clone()),
            Err(e) => {
                let kind = ticket.kind;
                self.record_reject(e.code(), "complete");
                drop(inner);
                self.emit_reject_audit(e.code(), "complete", id, kind);
                Err(e)
            }
        }
    }

    pub fn fail(&self, id: &TicketId, err_code: &str, lease_proof: (&str, &str)) -> Result<Ticket, tk_core::GuardError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let ticket = inner
            .tickets
            .get_mut(id)
            .ok_or(tk_core::GuardError::LeaseOwnerMismatch)?;
        match ticket.fail(err_code, lease_proof, now) {
            Ok(()) => Ok(ticket.clone()),
            Err(e) => {
                let kind = ticket.kind;
                self.record_reject(e.code(), "fail");
                drop(inner);
                self.emit_reject_audit(e.code(), "fail", id, kind);
                Err(e)
            }
        }
    }

    pub fn release(&self, id: &TicketId, lease_proof: (&str, &str)) -> Result<Ticket, tk_core::GuardError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let ticket = inner
            .tickets
            .get_mut(id)
            .ok_or(tk_core::GuardError::LeaseOwnerMismatch)?;
        match ticket.release(lease_proof, now) {
            Ok(()) => Ok(ticket.clone()),
            Err(e) => {
                let kind = ticket.kind;
                self.record_reject(e.code(), "release");
                drop(inner);
                self.emit_reject_audit(e.code(), "release", id, kind);
                Err(e)
            }
        }
    }

    pub fn block(&self, id: &TicketId, code: &str, reason: &str, source: &str) -> Result<Ticket, tk_core::GuardError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let ticket = inner
            .tickets
            .get_mut(id)
            .ok_or_else(|| tk_core::GuardError::InvalidTransition {
                from: TicketStatus::Done,
                action: "block".to_string(),
            })?;
        match ticket.block(code, reason, source, now) {
            Ok(()) => Ok(ticket.clone()),
            Err(e) => {
                let kind = ticket.kind;
                self.record_reject(e.code(), "block");
                drop(inner);
                self.emit_reject_audit(e.code(), "block", id, kind);
                Err(e)
            }
        }
    }

    pub fn unblock(&self, id: &TicketId) -> Result<Ticket, tk_core::GuardError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let ticket = inner
            .tickets
            .get_mut(id)
            .ok_or_else(|| tk_core::GuardError::InvalidTransition {
                from: TicketStatus::Done,
                action: "unblock".to_string(),
            })?;
        match ticket.unblock(now) {
            Ok(()) => Ok(ticket.clone()),
            Err(e) => {
                let kind = ticket.kind;
                self.record_reject(e.code(), "unblock");
                drop(inner);
                self.emit_reject_audit(e.code(), "unblock", id, kind);
                Err(e)
            }
        }
    }

    pub fn retry(&self, id: &TicketId) -> Result<Ticket, tk_core::GuardError> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let ticket = inner
            .tickets
            .get_mut(id)
            .ok_or_else(|| tk_core::GuardError::InvalidTransition {
                from: TicketStatus::Done,
                action: "retry".to_string(),
            })?;
        match ticket.retry(now) {
            Ok(()) => Ok(ticket.clone()),
            Err(e) => {
                let kind = ticket.kind;
                self.record_reject(e.code(), "retry");
                drop(inner);
                self.emit_reject_audit(e.code(), "retry", id, kind);
                Err(e)
            }
        }
    }

    /// §4.C reaper sweep: revert every expired `running` ticket to
    /// `pending` and clear its lease. Returns how many were reclaimed.
    pub fn release_expired_leases(&self) -> usize {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        inner.tickets.values_mut().filter(|t| t.reap_if_expired(now)).count()
    }

    /// Record the at-most-once derivation back-reference on `parent_id`
    /// and return the parent as it now stands. Used by the derivation
    /// engine after it creates a child ticket via `create`.
    pub fn set_derived(&self, parent_id: &TicketId, child_id: TicketId) -> Option<Ticket> {
        let now = self.now_ms();
        let mut inner = self.inner.lock();
        let ticket = inner.tickets.get_mut(parent_id)?;
        ticket.set_derived(child_id, now);
        Some(ticket.clone())
    }

    /// Insert an already-built ticket verbatim, bypassing the guarded
    /// state machine. Used by the warm reindexer (§4.I) to restore prior
    /// state from append-only snapshots rather than re-derive it through
    /// `create`/`complete` transitions that never actually happened at
    /// this process's boot.
    pub fn reindex_insert(&self, ticket: Ticket) {
        let mut inner = self.inner.lock();
        match ticket.kind {
            TicketKind::Triage => {
                inner.triage_by_candidate.insert(ticket.candidate_id.clone(), ticket.id.clone());
            }
            TicketKind::Reply => {
                inner.reply_by_candidate.insert(ticket.candidate_id.clone(), ticket.id.clone());
            }
            TicketKind::Tool => {}
        }
        inner.tickets.insert(ticket.id.clone(), ticket);
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
