// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics Registry (§4.K): counters for guard rejects and readiness
//! blocks, plus gauges rendered from the latest snapshot at read time.
//!
//! There is no metrics crate in this stack; the registry is a small
//! mutex-guarded set of counters rendered into Prometheus text exposition
//! format on demand, which is cheap enough at this call volume that a
//! pull-based client library would be pure overhead.

use std::collections::HashMap;
use std::fmt::Write as _;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default)]
pub struct TicketCounts {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
    pub blocked: u64,
}

impl TicketCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.done + self.failed + self.blocked
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.done as f64 / total as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadinessGauge {
    pub degraded: bool,
    pub required_ready: Vec<(String, bool)>,
    pub optional_ready: Vec<(String, bool)>,
}

#[derive(Default)]
pub struct Metrics {
    guard_rejects: Mutex<HashMap<(String, String), u64>>,
    required_unavailable: Mutex<HashMap<String, u64>>,
    readiness: Mutex<ReadinessGauge>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_guard_reject(&self, code: &str, action: &str) {
        let mut guard = self.guard_rejects.lock();
        *guard.entry((code.to_string(), action.to_string())).or_insert(0) += 1;
    }

    pub fn record_required_unavailable(&self, dep_key: &str) {
        let mut guard = self.required_unavailable.lock();
        *guard.entry(dep_key.to_string()).or_insert(0) += 1;
    }

    pub fn set_readiness(&self, gauge: ReadinessGauge) {
        *self.readiness.lock() = gauge;
    }

    pub fn guard_reject_total(&self, code: &str, action: &str) -> u64 {
        self.guard_rejects
            .lock()
            .get(&(code.to_string(), action.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn required_unavailable_total(&self, dep_key: &str) -> u64 {
        self.required_unavailable.lock().get(dep_key).copied().unwrap_or(0)
    }

    /// Render the full registry plus the live ticket counts as Prometheus
    /// text exposition format.
    pub fn render_prometheus(&self, tickets: TicketCounts) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# TYPE ticket_store_guard_reject_total counter");
        for ((code, action), count) in self.guard_rejects.lock().iter() {
            let _ = writeln!(
                out,
                "ticket_store_guard_reject_total{{code=\"{code}\",action=\"{action}\"}} {count}"
            );
        }

        let _ = writeln!(out, "# TYPE required_unavailable_total counter");
        for (dep_key, count) in self.required_unavailable.lock().iter() {
            let _ = writeln!(out, "required_unavailable_total{{dep_key=\"{dep_key}\"}} {count}");
        }

        let readiness = self.readiness.lock();
        let _ = writeln!(out, "# TYPE readiness_snapshot gauge");
        let _ = writeln!(
            out,
            "readiness_snapshot{{dim=\"degraded\"}} {}",
            readiness.degraded as u8
        );
        for (dep_key, ready) in &readiness.required_ready {
            let _ = writeln!(
                out,
                "readiness_snapshot{{dim=\"required\",dep_key=\"{dep_key}\"}} {}",
                *ready as u8
            );
        }
        for (dep_key, ready) in &readiness.optional_ready {
            let _ = writeln!(
                out,
                "readiness_snapshot{{dim=\"optional\",dep_key=\"{dep_key}\"}} {}",
                *ready as u8
            );
        }
        drop(readiness);

        let _ = writeln!(out, "# TYPE tickets gauge");
        let _ = writeln!(out, "tickets{{state=\"pending\"}} {}", tickets.pending);
        let _ = writeln!(out, "tickets{{state=\"running\"}} {}", tickets.running);
        let _ = writeln!(out, "tickets{{state=\"done\"}} {}", tickets.done);
        let _ = writeln!(out, "tickets{{state=\"failed\"}} {}", tickets.failed);
        let _ = writeln!(out, "tickets{{state=\"blocked\"}} {}", tickets.blocked);
        let _ = writeln!(out, "tickets{{state=\"total\"}} {}", tickets.total());
        let _ = writeln!(out, "tickets_success_rate {}", tickets.success_rate());

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_reject_counts_accumulate_per_code_and_action() {
        let metrics = Metrics::new();
        metrics.record_guard_reject("lease_owner_mismatch", "complete");
        metrics.record_guard_reject("lease_owner_mismatch", "complete");
        metrics.record_guard_reject("lease_owner_mismatch", "fail");
        assert_eq!(metrics.guard_reject_total("lease_owner_mismatch", "complete"), 2);
        assert_eq!(metrics.guard_reject_total("lease_owner_mismatch", "fail"), 1);
    }

    #[test]
    fn required_unavailable_increments_once_per_call() {
        let metrics = Metrics::new();
        metrics.record_required_unavailable("memory");
        assert_eq!(metrics.required_unavailable_total("memory"), 1);
    }

    #[test]
    fn ticket_counts_success_rate_handles_zero_total() {
        let counts = TicketCounts::default();
        assert_eq!(counts.success_rate(), 0.0);
    }

    #[test]
    fn render_prometheus_includes_all_gauge_states() {
        let metrics = Metrics::new();
        let text = metrics.render_prometheus(TicketCounts {
            pending: 1,
            running: 2,
            done: 3,
            failed: 0,
            blocked: 0,
        });
        assert!(text.contains("tickets{state=\"done\"} 3"));
        assert!(text.contains("tickets{state=\"total\"} 6"));
    }
}
