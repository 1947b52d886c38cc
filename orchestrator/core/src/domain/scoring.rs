// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Scoring Engine
//!
//! Pure mapping from raw activity counters to bounded sub-scores and a weighted
//! `overall` score. Deterministic and side-effect free; callers persist the
//! result through the registry update protocol.
//!
//! ## Sub-scores
//! | Sub-score | Ratio branch | Capped-count branch |
//! |-----------|--------------|---------------------|
//! | throughput | - | `(resolved + accepted) / cap` |
//! | resolution_rate | `resolved / created` | `resolved / cap` when nothing was created |
//! | acceptance_rate | `accepted / opened` | 0 when nothing was opened |
//! | peer_feedback | `approved / received` | `given / cap` when nothing was received |
//! | novelty | - | `novel / cap` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters reported by the activity collector for one agent over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ActivityCounters {
    #[serde(default)]
    pub items_created: u32,
    #[serde(default)]
    pub items_resolved: u32,
    #[serde(default)]
    pub contributions_opened: u32,
    #[serde(default)]
    pub contributions_accepted: u32,
    #[serde(default)]
    pub reviews_given: u32,
    #[serde(default)]
    pub reviews_received: u32,
    #[serde(default)]
    pub reviews_approved: u32,
    #[serde(default)]
    pub novel_contributions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl ActivityCounters {
    /// No counted activity; `last_activity_at` is ignored.
    pub fn is_empty(&self) -> bool {
        ActivityCounters {
            last_activity_at: None,
            ..*self
        } == ActivityCounters::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub throughput: f64,
    pub resolution: f64,
    pub acceptance: f64,
    pub peer_feedback: f64,
    pub novelty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            throughput: 0.30,
            resolution: 0.20,
            acceptance: 0.20,
            peer_feedback: 0.15,
            novelty: 0.15,
        }
    }
}

impl ScoringWeights {
    /// Profile for populations where novelty is not tracked.
    pub fn without_novelty() -> Self {
        Self {
            throughput: 0.30,
            resolution: 0.25,
            acceptance: 0.25,
            peer_feedback: 0.20,
            novelty: 0.0,
        }
    }

    pub fn sum(&self) -> f64 {
        self.throughput + self.resolution + self.acceptance + self.peer_feedback + self.novelty
    }

    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("throughput", self.throughput),
            ("resolution", self.resolution),
            ("acceptance", self.acceptance),
            ("peer_feedback", self.peer_feedback),
            ("novelty", self.novelty),
        ];
        for (name, weight) in all {
            if !(0.0..=1.0).contains(&weight) {
                return Err(format!("scoring weight '{}' must be in [0,1], got {}", name, weight));
            }
        }
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(format!("scoring weights must sum to 1.0, got {:.6}", self.sum()));
        }
        Ok(())
    }
}

/// Fixed caps for the capped-count branches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringCaps {
    pub throughput: u32,
    pub resolution: u32,
    pub reviews: u32,
    pub novelty: u32,
}

impl Default for ScoringCaps {
    fn default() -> Self {
        Self {
            throughput: 10,
            resolution: 5,
            reviews: 10,
            novelty: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub caps: ScoringCaps,
}

/// Sub-scores in [0,1] plus the derived `overall`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreSet {
    pub throughput: f64,
    pub resolution_rate: f64,
    pub acceptance_rate: f64,
    pub peer_feedback: f64,
    pub novelty: f64,
    pub overall: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
}

impl ScoreSet {
    pub fn sub_scores(&self) -> [f64; 5] {
        [
            self.throughput,
            self.resolution_rate,
            self.acceptance_rate,
            self.peer_feedback,
            self.novelty,
        ]
    }

    /// Same sub-scores and overall, ignoring `computed_at`.
    pub fn same_values(&self, other: &ScoreSet) -> bool {
        const EPS: f64 = 1e-9;
        self.sub_scores()
            .iter()
            .zip(other.sub_scores().iter())
            .all(|(a, b)| (a - b).abs() < EPS)
            && (self.overall - other.overall).abs() < EPS
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    (numerator as f64 / denominator.max(1) as f64).min(1.0)
}

/// Weighted combination of the sub-scores, clamped to [0,1].
pub fn overall(weights: &ScoringWeights, scores: &ScoreSet) -> f64 {
    let total = weights.throughput * scores.throughput
        + weights.resolution * scores.resolution_rate
        + weights.acceptance * scores.acceptance_rate
        + weights.peer_feedback * scores.peer_feedback
        + weights.novelty * scores.novelty;
    total.clamp(0.0, 1.0)
}

/// Score one agent's activity. Zero activity yields an all-zero set.
pub fn score(counters: &ActivityCounters, config: &ScoringConfig, now: DateTime<Utc>) -> ScoreSet {
    let caps = &config.caps;

    let throughput = ratio(
        counters.items_resolved + counters.contributions_accepted,
        caps.throughput,
    );

    let resolution_rate = if counters.items_created > 0 {
        ratio(counters.items_resolved, counters.items_created)
    } else {
        ratio(counters.items_resolved, caps.resolution)
    };

    let acceptance_rate = if counters.contributions_opened > 0 {
        ratio(counters.contributions_accepted, counters.contributions_opened)
    } else {
        0.0
    };

    let peer_feedback = if counters.reviews_received > 0 {
        ratio(counters.reviews_approved, counters.reviews_received)
    } else {
        ratio(counters.reviews_given, caps.reviews)
    };

    let novelty = ratio(counters.novel_contributions, caps.novelty);

    let mut set = ScoreSet {
        throughput,
        resolution_rate,
        acceptance_rate,
        peer_feedback,
        novelty,
        overall: 0.0,
        computed_at: Some(now),
    };
    set.overall = overall(&config.weights, &set);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        assert!(ScoringWeights::default().validate().is_ok());
        assert!(ScoringWeights::without_novelty().validate().is_ok());
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let mut weights = ScoringWeights::default();
        weights.novelty = 0.5;
        assert!(weights.validate().is_err());
        weights.novelty = -0.15;
        weights.throughput = 0.60;
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_zero_activity_scores_zero() {
        let set = score(&ActivityCounters::default(), &config(), Utc::now());
        assert_eq!(set.overall, 0.0);
        assert!(set.sub_scores().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_ratio_branch_is_capped_at_one() {
        let counters = ActivityCounters {
            items_created: 2,
            items_resolved: 7,
            ..Default::default()
        };
        let set = score(&counters, &config(), Utc::now());
        assert_eq!(set.resolution_rate, 1.0);
    }

    #[test]
    fn test_bonus_branch_uses_cap_without_denominator() {
        let counters = ActivityCounters {
            items_resolved: 2,
            ..Default::default()
        };
        let set = score(&counters, &config(), Utc::now());
        assert!((set.resolution_rate - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_peer_feedback_prefers_received_reviews() {
        let counters = ActivityCounters {
            reviews_received: 4,
            reviews_approved: 3,
            reviews_given: 10,
            ..Default::default()
        };
        let set = score(&counters, &config(), Utc::now());
        assert!((set.peer_feedback - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_fully_active_agent_scores_one() {
        let counters = ActivityCounters {
            items_created: 5,
            items_resolved: 5,
            contributions_opened: 5,
            contributions_accepted: 5,
            reviews_given: 3,
            reviews_received: 2,
            reviews_approved: 2,
            novel_contributions: 3,
            last_activity_at: None,
        };
        let set = score(&counters, &config(), Utc::now());
        assert!((set.overall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_overall_is_monotonic_in_each_sub_score() {
        let weights = ScoringWeights::default();
        let base = ScoreSet {
            throughput: 0.4,
            resolution_rate: 0.4,
            acceptance_rate: 0.4,
            peer_feedback: 0.4,
            novelty: 0.4,
            ..Default::default()
        };
        let before = overall(&weights, &base);
        for index in 0..5 {
            let mut raised = base;
            match index {
                0 => raised.throughput = 0.9,
                1 => raised.resolution_rate = 0.9,
                2 => raised.acceptance_rate = 0.9,
                3 => raised.peer_feedback = 0.9,
                _ => raised.novelty = 0.9,
            }
            assert!(overall(&weights, &raised) >= before);
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let counters = ActivityCounters {
            items_created: 3,
            items_resolved: 2,
            contributions_opened: 4,
            contributions_accepted: 1,
            ..Default::default()
        };
        let now = Utc::now();
        assert_eq!(score(&counters, &config(), now), score(&counters, &config(), now));
    }
}
