// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Triage Filter (§4.E): configurable ingest/skip gates applied to an
//! incoming event before a TRIAGE ticket is ever created.

use crate::config::GateConfig;

/// Minimal engagement signal the Gate-0B rule inspects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Engagement {
    pub likes: u32,
    pub comments: u32,
}

/// Outcome of running an event through the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Pass,
    Skip { reason: String },
}

/// Evaluate Gate-0 then Gate-0B, in order, against `content`/`engagement`.
/// The first failing gate wins (§4.E).
pub fn evaluate(config: &GateConfig, content: &str, engagement: Engagement) -> FilterOutcome {
    let len = content.chars().count() as u32;

    if len < config.gate0_min_len {
        return FilterOutcome::Skip {
            reason: "policy:gate0:min_len".to_string(),
        };
    }

    if config.gate0b_enabled {
        if len < config.gate0b_min_len {
            return FilterOutcome::Skip {
                reason: "policy:gate0b:min_len".to_string(),
            };
        }
        if engagement.likes < config.gate0b_min_likes {
            return FilterOutcome::Skip {
                reason: "policy:gate0b:min_likes".to_string(),
            };
        }
        if engagement.comments < config.gate0b_min_comments {
            return FilterOutcome::Skip {
                reason: "policy:gate0b:min_comments".to_string(),
            };
        }
    }

    FilterOutcome::Pass
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GateConfig {
        GateConfig {
            gate0_min_len: 10,
            gate0b_enabled: false,
            gate0b_min_len: 0,
            gate0b_min_likes: 0,
            gate0b_min_comments: 0,
        }
    }

    #[test]
    fn content_length_equal_to_min_len_passes() {
        let cfg = config();
        let content = "a".repeat(10);
        assert_eq!(evaluate(&cfg, &content, Engagement::default()), FilterOutcome::Pass);
    }

    #[test]
    fn content_one_byte_under_min_len_fails_with_stable_reason() {
        let cfg = config();
        let content = "a".repeat(9);
        assert_eq!(
            evaluate(&cfg, &content, Engagement::default()),
            FilterOutcome::Skip {
                reason: "policy:gate0:min_len".to_string()
            }
        );
    }

    #[test]
    fn gate0b_disabled_skips_engagement_checks_entirely() {
        let cfg = config();
        let content = "a".repeat(20);
        assert_eq!(evaluate(&cfg, &content, Engagement::default()), FilterOutcome::Pass);
    }

    #[test]
    fn gate0b_rejects_low_engagement_when_enabled() {
        let mut cfg = config();
        cfg.gate0b_enabled = true;
        cfg.gate0b_min_likes = 100;
        let content = "a".repeat(20);
        assert_eq!(
            evaluate(&cfg, &content, Engagement { likes: 50, comments: 0 }),
            FilterOutcome::Skip {
                reason: "policy:gate0b:min_likes".to_string()
            }
        );
    }

    #[test]
    fn gate0_takes_precedence_over_gate0b() {
        let mut cfg = config();
        cfg.gate0b_enabled = true;
        cfg.gate0b_min_len = 1000;
        let content = "a".repeat(5);
        assert_eq!(
            evaluate(&cfg, &content, Engagement::default()),
            FilterOutcome::Skip {
                reason: "policy:gate0:min_len".to_string()
            }
        );
    }
}
