// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Readiness Evaluator & Dependency Gate (§4.D): maps raw provider health
//! to per-dependency readiness and the HTTP admission decision.

use std::collections::HashMap;

use tk_core::DepState;

use crate::dep_keys::{is_optional, is_required, OPTIONAL_DEPS, REQUIRED_DEPS};
use crate::metrics::{Metrics, ReadinessGauge};

/// Snapshot produced from the latest provider health map.
#[derive(Debug, Clone)]
pub struct ReadinessSnapshot {
    pub degraded: bool,
    pub required: HashMap<String, DepState>,
    pub optional: HashMap<String, DepState>,
    pub as_of_ms: u64,
}

impl ReadinessSnapshot {
    /// Dependency keys this snapshot considers required-and-unready, in a
    /// deterministic order for stable response bodies.
    pub fn missing_required(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .required
            .iter()
            .filter(|(_, state)| !state.ready)
            .map(|(key, _)| key.clone())
            .collect();
        missing.sort();
        missing
    }

    fn to_gauge(&self) -> ReadinessGauge {
        let mut required_ready: Vec<(String, bool)> =
            self.required.iter().map(|(k, v)| (k.clone(), v.ready)).collect();
        required_ready.sort();
        let mut optional_ready: Vec<(String, bool)> =
            self.optional.iter().map(|(k, v)| (k.clone(), v.ready)).collect();
        optional_ready.sort();
        ReadinessGauge {
            degraded: self.degraded,
            required_ready,
            optional_ready,
        }
    }
}

/// Maps provider health into dependency readiness (§4.D). `REQUIRED_DEPS`
/// and `OPTIONAL_DEPS` are the fixed, build-time partition (§3.1).
pub struct ReadinessEvaluator;

impl ReadinessEvaluator {
    /// `provider_health` maps `providerId -> {ready, code, detail}`; the
    /// same map backs both required and optional dep keys since a dep key
    /// and its backing provider id coincide in this system.
    pub fn evaluate(provider_health: &HashMap<String, DepState>, now_ms: u64) -> ReadinessSnapshot {
        let mut required = HashMap::new();
        for dep_key in REQUIRED_DEPS {
            required.insert((*dep_key).to_string(), resolve_dep_state(provider_health, dep_key));
        }
        let mut optional = HashMap::new();
        for dep_key in OPTIONAL_DEPS {
            optional.insert((*dep_key).to_string(), resolve_dep_state(provider_health, dep_key));
        }

        let degraded = required.values().any(|s| !s.ready) || optional.values().any(|s| !s.ready);

        ReadinessSnapshot {
            degraded,
            required,
            optional,
            as_of_ms: now_ms,
        }
    }

    /// Record the snapshot as the metrics registry's current readiness
    /// gauge.
    pub fn publish(snapshot: &ReadinessSnapshot, metrics: &Metrics) {
        metrics.set_readiness(snapshot.to_gauge());
    }
}

fn resolve_dep_state(provider_health: &HashMap<String, DepState>, dep_key: &str) -> DepState {
    match provider_health.get(dep_key) {
        Some(state) if state.ready => DepState::ready(),
        Some(state) => {
            let code = state.code.clone().unwrap_or_else(|| tk_core::dep_state::DEP_UNAVAILABLE.to_string());
            match &state.detail {
                Some(detail) => DepState::unready_with_detail(code, detail.clone()),
                None => DepState::unready(code),
            }
        }
        None => DepState::unready(tk_core::dep_state::DEP_UNAVAILABLE),
    }
}

/// Outcome of the HTTP admission gate for a request that declares which
/// dep keys it needs (typically all of `REQUIRED_DEPS`).
pub enum Admission {
    Allowed,
    Blocked {
        missing_required: Vec<String>,
        degraded: bool,
        as_of_ms: u64,
    },
}

/// Evaluate admission for an endpoint that needs every configured
/// required dependency ready. Increments
/// `required_unavailable_total{depKey}` once per missing required dep
/// (§4.D).
pub fn admit(snapshot: &ReadinessSnapshot, metrics: &Metrics) -> Admission {
    let missing = snapshot.missing_required();
    if missing.is_empty() {
        return Admission::Allowed;
    }
    for dep_key in &missing {
        metrics.record_required_unavailable(dep_key);
    }
    Admission::Blocked {
        missing_required: missing,
        degraded: snapshot.degraded,
        as_of_ms: snapshot.as_of_ms,
    }
}

/// Build-time validator (Design Notes / §4.D): required dep codes must
/// never carry an HTTP-layer code such as `MCP_REQUIRED_UNAVAILABLE`,
/// which belongs to the admission response, not to a dependency's own
/// state.
pub fn validate_required_dep_codes(snapshot: &ReadinessSnapshot) -> Result<(), String> {
    for (dep_key, state) in &snapshot.required {
        if state.code.as_deref() == Some(tk_core::error::codes::MCP_REQUIRED_UNAVAILABLE) {
            return Err(format!(
                "required dep '{dep_key}' must not carry the HTTP-layer code MCP_REQUIRED_UNAVAILABLE"
            ));
        }
    }
    Ok(())
}

pub fn is_known_dep(dep_key: &str) -> bool {
    is_required(dep_key) || is_optional(dep_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_provider_is_unready_with_dep_unavailable() {
        let health = HashMap::new();
        let snapshot = ReadinessEvaluator::evaluate(&health, 1000);
        assert!(snapshot.degraded);
        assert_eq!(snapshot.missing_required(), vec!["memory".to_string()]);
    }

    #[test]
    fn all_ready_is_not_degraded() {
        let mut health = HashMap::new();
        health.insert("memory".to_string(), DepState::ready());
        health.insert("web_search".to_string(), DepState::ready());
        let snapshot = ReadinessEvaluator::evaluate(&health, 1000);
        assert!(!snapshot.degraded);
        assert!(snapshot.missing_required().is_empty());
    }

    #[test]
    fn optional_unready_degrades_but_does_not_block() {
        let mut health = HashMap::new();
        health.insert("memory".to_string(), DepState::ready());
        health.insert("web_search".to_string(), DepState::unready("DEP_TIMEOUT"));
        let snapshot = ReadinessEvaluator::evaluate(&health, 1000);
        assert!(snapshot.degraded);
        assert!(snapshot.missing_required().is_empty());

        let metrics = Metrics::new();
        assert!(matches!(admit(&snapshot, &metrics), Admission::Allowed));
    }

    #[test]
    fn admit_blocks_and_increments_once_per_missing_required_dep() {
        let health = HashMap::new();
        let snapshot = ReadinessEvaluator::evaluate(&health, 2000);
        let metrics = Metrics::new();
        match admit(&snapshot, &metrics) {
            Admission::Blocked {
                missing_required,
                degraded,
                ..
            } => {
                assert_eq!(missing_required, vec!["memory".to_string()]);
                assert!(degraded);
            }
            Admission::Allowed => panic!("expected Blocked"),
        }
        assert_eq!(metrics.required_unavailable_total("memory"), 1);
    }

    #[test]
    fn validator_rejects_http_layer_code_on_a_required_dep() {
        let mut required = HashMap::new();
        required.insert(
            "memory".to_string(),
            DepState::unready(tk_core::error::codes::MCP_REQUIRED_UNAVAILABLE),
        );
        let snapshot = ReadinessSnapshot {
            degraded: true,
            required,
            optional: HashMap::new(),
            as_of_ms: 0,
        };
        assert!(validate_required_dep_codes(&snapshot).is_err());
    }
}
