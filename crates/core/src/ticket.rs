// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ticket identifier, state machine, and the guards from the Ticket Store's
//! transition table.
//!
//! The store (in `tk-engine`) owns the map of tickets and the mutex that
//! serializes access to it; this module only owns the per-ticket state
//! machine, so the guard logic can be unit-tested without any storage or
//! concurrency harness.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GuardError;
use crate::verdict::ToolVerdict;

crate::define_id! {
    /// Unique identifier for a ticket, stable for its whole lifetime.
    pub struct TicketId;
}

/// The three ticket kinds, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketKind {
    Triage,
    Tool,
    Reply,
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triage => write!(f, "TRIAGE"),
            Self::Tool => write!(f, "TOOL"),
            Self::Reply => write!(f, "REPLY"),
        }
    }
}

/// Ticket lifecycle state (§3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Running,
    Done,
    Failed,
    Blocked,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Lease ownership, populated only while `status == Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub owner: String,
    pub token: String,
    /// Epoch milliseconds. The warm-reindex path may also encounter legacy
    /// ISO-8601 expirations on disk; those are normalized to epoch-ms by the
    /// storage layer before a `Lease` is ever constructed in memory.
    pub expires_at_ms: u64,
}

impl Lease {
    fn matches(&self, owner: &str, token: &str) -> bool {
        self.owner == owner && self.token == token
    }
}

/// Back-reference from a ticket to the single child it derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedRef {
    pub ticket_id: TicketId,
    pub at_ms: u64,
}

/// One entry in a ticket's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at_ms: u64,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Timestamps, provenance, and small scalars that ride alongside a ticket
/// without being part of its core identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    /// Provenance tag, e.g. `"http_fill"`, `"tail:auto"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_source: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub audit: VecDeque<AuditEntry>,
}

/// Cap on retained audit entries per ticket; oldest entries are dropped.
const MAX_AUDIT_ENTRIES: usize = 50;

impl Metadata {
    fn push_audit(&mut self, at_ms: u64, action: impl Into<String>, code: Option<&str>) {
        if self.audit.len() >= MAX_AUDIT_ENTRIES {
            self.audit.pop_front();
        }
        self.audit.push_back(AuditEntry {
            at_ms,
            action: action.into(),
            code: code.map(str::to_string),
        });
    }
}

/// Configuration for creating a new ticket.
#[derive(Debug, Clone)]
pub struct TicketConfig {
    pub id: TicketId,
    pub kind: TicketKind,
    pub flow_id: String,
    pub candidate_id: String,
    pub parent_ticket_id: Option<TicketId>,
    pub triage_reference_id: Option<TicketId>,
    pub event: serde_json::Value,
    pub inputs: serde_json::Value,
    pub source: Option<String>,
    pub prompt_id: Option<String>,
}

/// The sole first-class unit of work (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub kind: TicketKind,
    pub status: TicketStatus,
    pub flow_id: String,
    pub candidate_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ticket_id: Option<TicketId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage_reference_id: Option<TicketId>,
    pub event: serde_json::Value,
    pub inputs: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_outputs: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_verdict: Option<ToolVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<Lease>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedRef>,
    pub metadata: Metadata,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// Callers allowed to `Complete` a ticket directly out of `pending`, i.e.
/// without ever taking a lease (§4.B `direct_fill_not_allowed`).
#[derive(Debug, Clone)]
pub struct DirectFillAllowlist(HashSet<String>);

impl DirectFillAllowlist {
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(allowed.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, by: &str) -> bool {
        self.0.contains(by)
    }
}

impl Default for DirectFillAllowlist {
    /// Default allowlist is `{http_fill}` per §4.B.
    fn default() -> Self {
        Self::new(["http_fill"])
    }
}

/// Lease proof presented alongside a mutation that requires one.
pub type LeaseProof<'a> = (&'a str, &'a str);

impl Ticket {
    pub fn new(config: TicketConfig, now_ms: u64) -> Self {
        let mut metadata = Metadata {
            prompt_id: config.prompt_id,
            source: config.source,
            ..Metadata::default()
        };
        metadata.push_audit(now_ms, "created", None);
        Self {
            id: config.id,
            kind: config.kind,
            status: TicketStatus::Pending,
            flow_id: config.flow_id,
            candidate_id: config.candidate_id,
            parent_ticket_id: config.parent_ticket_id,
            triage_reference_id: config.triage_reference_id,
            event: config.event,
            inputs: config.inputs,
            final_outputs: None,
            tool_verdict: None,
            lease: None,
            derived: None,
            metadata,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// `pending -> running`. The caller (lease manager) has already chosen
    /// `owner`/`token`/`lease_sec`; this only enforces the transition guard.
    pub fn lease(
        &mut self,
        owner: impl Into<String>,
        token: impl Into<String>,
        expires_at_ms: u64,
        now_ms: u64,
    ) -> Result<(), GuardError> {
        if self.status != TicketStatus::Pending {
            return Err(self.invalid_transition("lease"));
        }
        self.status = TicketStatus::Running;
        self.lease = Some(Lease {
            owner: owner.into(),
            token: token.into(),
            expires_at_ms,
        });
        self.touch(now_ms, "lease", None);
        Ok(())
    }

    /// `pending -> done` (direct fill) or `running -> done` (normal fill).
    /// `done -> done` is idempotent and returns `Ok` without touching
    /// `final_outputs`.
    #[allow(clippy::too_many_arguments)]
    pub fn complete(
        &mut self,
        outputs: serde_json::Value,
        by: &str,
        lease_proof: Option<LeaseProof<'_>>,
        allowlist: &DirectFillAllowlist,
        tool_verdict: Option<ToolVerdict>,
        now_ms: u64,
    ) -> Result<(), GuardError> {
        match self.status {
            TicketStatus::Done => Ok(()),
            TicketStatus::Running => {
                let (owner, token) = lease_proof.ok_or(GuardError::LeaseOwnerMismatch)?;
                let matches = self
                    .lease
                    .as_ref()
                    .map(|l| l.matches(owner, token))
                    .unwrap_or(false);
                if !matches {
                    self.metadata
                        .push_audit(now_ms, "complete_rejected", Some("lease_owner_mismatch"));
                    return Err(GuardError::LeaseOwnerMismatch);
                }
                self.finish_complete(outputs, tool_verdict, now_ms);
                Ok(())
            }
            TicketStatus::Pending => {
                if by.is_empty() {
                    self.metadata.push_audit(
                        now_ms,
                        "complete_rejected",
                        Some("direct_fill_missing_by"),
                    );
                    return Err(GuardError::DirectFillMissingBy);
                }
                if !allowlist.contains(by) {
                    self.metadata.push_audit(
                        now_ms,
                        "complete_rejected",
                        Some("direct_fill_not_allowed"),
                    );
                    return Err(GuardError::DirectFillNotAllowed { by: by.to_string() });
                }
                self.finish_complete(outputs, tool_verdict, now_ms);
                Ok(())
            }
            _ => Err(self.invalid_transition("complete")),
        }
    }

    fn finish_complete(
        &mut self,
        outputs: serde_json::Value,
        tool_verdict: Option<ToolVerdict>,
        now_ms: u64,
    ) {
        self.status = TicketStatus::Done;
        self.final_outputs = Some(outputs);
        if tool_verdict.is_some() {
            self.tool_verdict = tool_verdict;
        }
        self.lease = None;
        self.touch(now_ms, "complete", None);
    }

    /// `running -> failed`, lease proof required.
    pub fn fail(
        &mut self,
        err_code: &str,
        lease_proof: LeaseProof<'_>,
        now_ms: u64,
    ) -> Result<(), GuardError> {
        if self.status != TicketStatus::Running {
            return Err(self.invalid_transition("fail"));
        }
        let (owner, token) = lease_proof;
        let matches = self
            .lease
            .as_ref()
            .map(|l| l.matches(owner, token))
            .unwrap_or(false);
        if !matches {
            self.metadata
                .push_audit(now_ms, "fail_rejected", Some("lease_owner_mismatch"));
            return Err(GuardError::LeaseOwnerMismatch);
        }
        self.status = TicketStatus::Failed;
        self.lease = None;
        self.touch(now_ms, "fail", Some(err_code));
        Ok(())
    }

    /// `running -> pending`, either via explicit release (lease proof
    /// required) or via reaper reclaim (see [`Ticket::reap_if_expired`]).
    pub fn release(&mut self, lease_proof: LeaseProof<'_>, now_ms: u64) -> Result<(), GuardError> {
        if self.status != TicketStatus::Running {
            return Err(self.invalid_transition("release"));
        }
        let (owner, token) = lease_proof;
        let matches = self
            .lease
            .as_ref()
            .map(|l| l.matches(owner, token))
            .unwrap_or(false);
        if !matches {
            self.metadata
                .push_audit(now_ms, "release_rejected", Some("lease_owner_mismatch"));
            return Err(GuardError::LeaseOwnerMismatch);
        }
        self.status = TicketStatus::Pending;
        self.lease = None;
        self.touch(now_ms, "release", None);
        Ok(())
    }

    /// Reaper sweep: if `running` and the lease has expired, revert to
    /// `pending` and clear lease fields. Returns whether a reclaim happened.
    /// This is not a guarded transition — no caller chooses it.
    pub fn reap_if_expired(&mut self, now_ms: u64) -> bool {
        if self.status != TicketStatus::Running {
            return false;
        }
        let expired = self
            .lease
            .as_ref()
            .map(|l| now_ms >= l.expires_at_ms)
            .unwrap_or(false);
        if expired {
            self.status = TicketStatus::Pending;
            self.lease = None;
            self.touch(now_ms, "reclaim", None);
        }
        expired
    }

    /// `pending -> blocked` or `running -> blocked`; lease fields cleared.
    pub fn block(
        &mut self,
        code: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<String>,
        now_ms: u64,
    ) -> Result<(), GuardError> {
        if !matches!(self.status, TicketStatus::Pending | TicketStatus::Running) {
            return Err(self.invalid_transition("block"));
        }
        self.status = TicketStatus::Blocked;
        self.lease = None;
        self.metadata.block_code = Some(code.into());
        self.metadata.block_reason = Some(reason.into());
        self.metadata.block_source = Some(source.into());
        self.touch(now_ms, "block", None);
        Ok(())
    }

    /// `blocked -> pending`.
    pub fn unblock(&mut self, now_ms: u64) -> Result<(), GuardError> {
        if self.status != TicketStatus::Blocked {
            return Err(self.invalid_transition("unblock"));
        }
        self.status = TicketStatus::Pending;
        self.touch(now_ms, "unblock", None);
        Ok(())
    }

    /// `failed -> pending`, increments `retry_count`.
    pub fn retry(&mut self, now_ms: u64) -> Result<(), GuardError> {
        if self.status != TicketStatus::Failed {
            return Err(self.invalid_transition("retry"));
        }
        self.status = TicketStatus::Pending;
        self.metadata.retry_count += 1;
        self.touch(now_ms, "retry", None);
        Ok(())
    }

    /// Record that this ticket derived `child`, writing the back-reference
    /// exactly once (derivation is at-most-once per parent, §3.3.5).
    pub fn set_derived(&mut self, child: TicketId, now_ms: u64) {
        if self.derived.is_none() {
            self.derived = Some(DerivedRef {
                ticket_id: child,
                at_ms: now_ms,
            });
        }
    }

    fn touch(&mut self, now_ms: u64, action: &str, code: Option<&str>) {
        self.updated_at_ms = now_ms;
        self.metadata.push_audit(now_ms, action, code);
    }

    fn invalid_transition(&self, action: &str) -> GuardError {
        GuardError::InvalidTransition {
            from: self.status,
            action: action.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
