// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle State Machine
//!
//! Governs status transitions of agent records. The evaluator and the cleanup
//! service call [`evaluate_transition`] with the latest scores and commit the
//! result through the registry update protocol; nothing else changes `status`.
//!
//! ## Transition Table
//! | From | To | Condition |
//! |------|----|-----------|
//! | `active` | `hall_of_fame` | `overall ≥ promotion_threshold` for `promotion_cycles` consecutive cycles |
//! | `active` | `archived` | `overall ≤ elimination_threshold` for `elimination_cycles` consecutive cycles, specialization not protected |
//! | `active` (sub-agent) | `deactivated` | idle ≥ `min_idle_hours` and workload severity back to `none` |
//! | terminal | - | no-op |
//!
//! Streaks advance at most once per [`EvaluationCycle`], so evaluating the
//! same snapshot twice yields the same decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentRecord, AgentStatus, EvaluationState, Specialization};
use crate::domain::workload::BottleneckSeverity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleThresholds {
    pub promotion_threshold: f64,
    pub elimination_threshold: f64,
    pub promotion_cycles: u32,
    pub elimination_cycles: u32,
    pub min_idle_hours: u32,
    /// Length of one evaluation cycle.
    pub cycle_hours: u32,
    #[serde(default)]
    pub protected_specializations: Vec<Specialization>,
}

impl Default for LifecycleThresholds {
    fn default() -> Self {
        Self {
            promotion_threshold: 0.85,
            elimination_threshold: 0.30,
            promotion_cycles: 1,
            elimination_cycles: 2,
            min_idle_hours: 12,
            cycle_hours: 24,
            protected_specializations: vec![Specialization::Architect],
        }
    }
}

impl LifecycleThresholds {
    pub fn is_protected(&self, specialization: &Specialization) -> bool {
        self.protected_specializations.contains(specialization)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("promotion_threshold", self.promotion_threshold),
            ("elimination_threshold", self.elimination_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0,1], got {}", name, value));
            }
        }
        if self.elimination_threshold >= self.promotion_threshold {
            return Err(format!(
                "elimination_threshold ({}) must be below promotion_threshold ({})",
                self.elimination_threshold, self.promotion_threshold
            ));
        }
        if self.promotion_cycles == 0 || self.elimination_cycles == 0 {
            return Err("promotion_cycles and elimination_cycles must be at least 1".to_string());
        }
        if self.cycle_hours == 0 {
            return Err("cycle_hours must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Index of the evaluation period containing a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EvaluationCycle(pub u64);

impl EvaluationCycle {
    pub fn at(now: DateTime<Utc>, cycle_hours: u32) -> Self {
        let period = i64::from(cycle_hours.max(1)) * 3600;
        Self((now.timestamp().max(0) / period) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    None,
    Promote,
    Eliminate,
    Deactivate,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::None => "none",
            Transition::Promote => "promote",
            Transition::Eliminate => "eliminate",
            Transition::Deactivate => "deactivate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDecision {
    pub transition: Transition,
    pub target: AgentStatus,
    /// Streak state to persist alongside the decision.
    pub evaluation: EvaluationState,
    pub reason: String,
}

impl TransitionDecision {
    fn unchanged(record: &AgentRecord, reason: impl Into<String>) -> Self {
        Self {
            transition: Transition::None,
            target: record.status,
            evaluation: record.evaluation,
            reason: reason.into(),
        }
    }
}

/// Compute the next lifecycle state for one record.
///
/// `severity` is the current bottleneck severity of the record's
/// specialization; it only matters for sub-agents.
pub fn evaluate_transition(
    record: &AgentRecord,
    thresholds: &LifecycleThresholds,
    cycle: EvaluationCycle,
    now: DateTime<Utc>,
    severity: BottleneckSeverity,
) -> TransitionDecision {
    if record.status.is_terminal() {
        return TransitionDecision::unchanged(record, format!("status {} is terminal", record.status));
    }

    if record.is_sub_agent() {
        return evaluate_sub_agent(record, thresholds, now, severity);
    }

    let overall = record.overall();
    let protected = thresholds.is_protected(&record.specialization);

    let evaluation = if record.evaluation.last_cycle == Some(cycle.0) {
        record.evaluation
    } else {
        let previous = record.evaluation;
        EvaluationState {
            promotion_streak: if overall >= thresholds.promotion_threshold {
                previous.promotion_streak + 1
            } else {
                0
            },
            elimination_streak: if overall <= thresholds.elimination_threshold && !protected {
                previous.elimination_streak + 1
            } else {
                0
            },
            last_cycle: Some(cycle.0),
        }
    };

    if evaluation.promotion_streak >= thresholds.promotion_cycles {
        return TransitionDecision {
            transition: Transition::Promote,
            target: AgentStatus::HallOfFame,
            evaluation,
            reason: format!(
                "overall {:.3} ≥ promotion threshold {:.2} for {} cycle(s)",
                overall, thresholds.promotion_threshold, evaluation.promotion_streak
            ),
        };
    }

    if evaluation.elimination_streak >= thresholds.elimination_cycles {
        return TransitionDecision {
            transition: Transition::Eliminate,
            target: AgentStatus::Archived,
            evaluation,
            reason: format!(
                "overall {:.3} ≤ elimination threshold {:.2} for {} cycle(s)",
                overall, thresholds.elimination_threshold, evaluation.elimination_streak
            ),
        };
    }

    let reason = if protected && overall <= thresholds.elimination_threshold {
        format!("overall {:.3} below elimination threshold but {} is protected", overall, record.specialization)
    } else if evaluation.elimination_streak > 0 {
        format!(
            "overall {:.3} under elimination threshold ({}/{} cycles)",
            overall, evaluation.elimination_streak, thresholds.elimination_cycles
        )
    } else {
        format!("overall {:.3} within band", overall)
    };

    TransitionDecision {
        transition: Transition::None,
        target: AgentStatus::Active,
        evaluation,
        reason,
    }
}

fn evaluate_sub_agent(
    record: &AgentRecord,
    thresholds: &LifecycleThresholds,
    now: DateTime<Utc>,
    severity: BottleneckSeverity,
) -> TransitionDecision {
    let idle_hours = record.idle_hours(now);
    let idle_enough = idle_hours >= f64::from(thresholds.min_idle_hours);

    if idle_enough && severity == BottleneckSeverity::None {
        return TransitionDecision {
            transition: Transition::Deactivate,
            target: AgentStatus::Deactivated,
            evaluation: record.evaluation,
            reason: format!(
                "idle {:.1}h ≥ {}h and {} workload back to none",
                idle_hours, thresholds.min_idle_hours, record.specialization
            ),
        };
    }

    let reason = if idle_enough {
        format!("idle {:.1}h but {} bottleneck still {:?}", idle_hours, record.specialization, severity)
    } else {
        format!("idle {:.1}h < {}h", idle_hours, thresholds.min_idle_hours)
    };
    TransitionDecision::unchanged(record, reason)
}

/// Write a decision into a record. Returns whether anything changed.
pub fn apply_transition(record: &mut AgentRecord, decision: &TransitionDecision, now: DateTime<Utc>) -> bool {
    if record.status.is_terminal() {
        return false;
    }
    let changed = record.status != decision.target || record.evaluation != decision.evaluation;
    if changed {
        record.status = decision.target;
        record.evaluation = decision.evaluation;
        record.touch(now);
    }
    changed
}
