// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Spawn Decision Engine (Admission Control)
//!
//! Converts noisy workload and health signals into admit / do-not-admit
//! decisions per specialization. Five weighted factors produce a confidence;
//! a per-specialization cooldown suppresses repeated admits so that the
//! spawn/retire loop does not oscillate.
//!
//! | Factor | Weight | Source |
//! |--------|--------|--------|
//! | workload | 0.35 | `workload_per_agent` against critical/high thresholds |
//! | api_health | 0.25 | downstream SLA / error-rate health |
//! | circuit_breaker | 0.15 | breaker state (open suppresses spawning) |
//! | capacity | 0.15 | active agents versus the specialization ceiling |
//! | priority | 0.10 | configured priority of the specialization |
//!
//! Every decision, admitted or not, carries its factor breakdown and reasoning.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::agent::Specialization;
use crate::domain::workload::{CircuitState, HealthSignal, WorkloadSignal};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    pub workload: f64,
    pub api_health: f64,
    pub circuit_breaker: f64,
    pub capacity: f64,
    pub priority: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            workload: 0.35,
            api_health: 0.25,
            circuit_breaker: 0.15,
            capacity: 0.15,
            priority: 0.10,
        }
    }
}

impl FactorWeights {
    pub fn sum(&self) -> f64 {
        self.workload + self.api_health + self.circuit_breaker + self.capacity + self.priority
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnPolicy {
    #[serde(default)]
    pub weights: FactorWeights,
    /// Items per agent at which normalised workload reaches 1.0.
    pub workload_saturation: f64,
    pub workload_critical: f64,
    pub workload_high: f64,
    pub api_unhealthy: f64,
    pub api_degraded: f64,
    pub max_agents_per_specialization: u32,
    pub min_confidence: f64,
    pub cooldown_seconds: i64,
    pub max_decisions: usize,
    pub max_spawn_per_decision: u32,
    #[serde(default)]
    pub priorities: BTreeMap<Specialization, f64>,
    pub default_priority: f64,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            workload_saturation: 5.0,
            workload_critical: 0.8,
            workload_high: 0.6,
            api_unhealthy: 0.4,
            api_degraded: 0.7,
            max_agents_per_specialization: 8,
            min_confidence: 0.6,
            cooldown_seconds: 300,
            max_decisions: 5,
            max_spawn_per_decision: 2,
            priorities: BTreeMap::new(),
            default_priority: 0.5,
        }
    }
}

impl SpawnPolicy {
    pub fn priority_for(&self, specialization: &Specialization) -> f64 {
        self.priorities
            .get(specialization)
            .copied()
            .unwrap_or(self.default_priority)
            .clamp(0.0, 1.0)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_seconds.max(0))
    }

    pub fn validate(&self) -> Result<(), String> {
        if (self.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(format!("spawn factor weights must sum to 1.0, got {:.6}", self.weights.sum()));
        }
        if self.workload_saturation <= 0.0 {
            return Err("workload_saturation must be positive".to_string());
        }
        if self.workload_high > self.workload_critical {
            return Err("workload_high must not exceed workload_critical".to_string());
        }
        if self.api_unhealthy > self.api_degraded {
            return Err("api_unhealthy must not exceed api_degraded".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!("min_confidence must be in [0,1], got {}", self.min_confidence));
        }
        if self.max_agents_per_specialization == 0 || self.max_decisions == 0 {
            return Err("max_agents_per_specialization and max_decisions must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Per-factor contributions in [0,1] before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub workload: f64,
    pub api_health: f64,
    pub circuit_breaker: f64,
    pub capacity: f64,
    pub priority: f64,
}

impl FactorBreakdown {
    pub fn confidence(&self, weights: &FactorWeights) -> f64 {
        (weights.workload * self.workload
            + weights.api_health * self.api_health
            + weights.circuit_breaker * self.circuit_breaker
            + weights.capacity * self.capacity
            + weights.priority * self.priority)
            .clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnDecision {
    pub specialization: Specialization,
    pub admit: bool,
    pub proposed_count: u32,
    pub confidence: f64,
    pub factors: FactorBreakdown,
    pub reasoning: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

/// Side inputs for one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    pub health: HashMap<Specialization, HealthSignal>,
    /// Active agents per specialization as seen in the registry. Overrides
    /// the signal's own count when present.
    pub active_agents: HashMap<Specialization, u32>,
}

/// Last admit time per specialization.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_admit: Mutex<HashMap<Specialization, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt persisted admit times, keeping whichever is later.
    pub fn seed<'a>(&self, entries: impl IntoIterator<Item = (&'a Specialization, &'a DateTime<Utc>)>) {
        let mut guard = self.last_admit.lock();
        for (specialization, at) in entries {
            let slot = guard.entry(specialization.clone()).or_insert(*at);
            if *at > *slot {
                *slot = *at;
            }
        }
    }

    pub fn remaining(&self, specialization: &Specialization, cooldown: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let guard = self.last_admit.lock();
        let last = guard.get(specialization)?;
        let elapsed = now - *last;
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }

    pub fn record(&self, specialization: &Specialization, now: DateTime<Utc>) {
        self.last_admit.lock().insert(specialization.clone(), now);
    }

    pub fn last_admit(&self, specialization: &Specialization) -> Option<DateTime<Utc>> {
        self.last_admit.lock().get(specialization).copied()
    }
}

/// Stateless apart from the cooldown tracker.
#[derive(Debug, Default)]
pub struct DecisionEngine {
    cooldowns: CooldownTracker,
}

impl DecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Evaluate every signal and return at most `policy.max_decisions`
    /// decisions, admits first by descending confidence. Admits returned here
    /// start the specialization's cooldown.
    pub fn evaluate(
        &self,
        signals: &[WorkloadSignal],
        context: &DecisionContext,
        policy: &SpawnPolicy,
        now: DateTime<Utc>,
    ) -> Vec<SpawnDecision> {
        let mut decisions: Vec<SpawnDecision> = signals
            .iter()
            .map(|signal| self.decide(signal, context, policy, now))
            .collect();

        decisions.sort_by(|a, b| {
            b.admit
                .cmp(&a.admit)
                .then(b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.specialization.cmp(&b.specialization))
        });

        // Two signals for one specialization in the same batch must not both admit.
        let mut admitted: Vec<Specialization> = Vec::new();
        for decision in decisions.iter_mut() {
            if decision.admit {
                if admitted.contains(&decision.specialization) {
                    decision.admit = false;
                    decision.proposed_count = 0;
                    decision
                        .reasoning
                        .push("duplicate signal in batch; specialization already admitted".to_string());
                } else {
                    admitted.push(decision.specialization.clone());
                }
            }
        }

        decisions.truncate(policy.max_decisions);
        for decision in decisions.iter().filter(|d| d.admit) {
            self.cooldowns.record(&decision.specialization, now);
        }
        decisions
    }

    fn decide(
        &self,
        signal: &WorkloadSignal,
        context: &DecisionContext,
        policy: &SpawnPolicy,
        now: DateTime<Utc>,
    ) -> SpawnDecision {
        let specialization = &signal.specialization;
        let health = context.health.get(specialization).copied().unwrap_or_default();
        let active = context
            .active_agents
            .get(specialization)
            .copied()
            .unwrap_or(signal.active_agents);

        let normalized_workload = (signal.workload_per_agent / policy.workload_saturation).clamp(0.0, 1.0);
        let factors = FactorBreakdown {
            workload: workload_factor(normalized_workload, policy),
            api_health: api_health_factor(health.api_health, policy),
            circuit_breaker: breaker_factor(health.breaker),
            capacity: capacity_factor(active, policy.max_agents_per_specialization),
            priority: policy.priority_for(specialization),
        };
        let confidence = factors.confidence(&policy.weights);

        let mut reasoning = vec![format!(
            "workload {:.2}/agent (normalised {:.2}), severity {:?}",
            signal.workload_per_agent, normalized_workload, signal.bottleneck_severity
        )];
        let mut admit = true;

        if normalized_workload < policy.workload_high {
            admit = false;
            reasoning.push(format!(
                "workload below high threshold {:.2}; no additional capacity needed",
                policy.workload_high
            ));
        }

        if health.breaker == CircuitState::Open {
            admit = false;
            reasoning.push("circuit breaker open; spawning suppressed".to_string());
        } else if health.api_health < policy.api_unhealthy {
            reasoning.push(format!("downstream APIs unhealthy ({:.2})", health.api_health));
        } else if health.api_health < policy.api_degraded {
            reasoning.push(format!("downstream APIs degraded ({:.2})", health.api_health));
        }

        let remaining_capacity = policy.max_agents_per_specialization.saturating_sub(active);
        if remaining_capacity == 0 {
            admit = false;
            reasoning.push(format!(
                "capacity saturated ({}/{})",
                active, policy.max_agents_per_specialization
            ));
        }

        if confidence < policy.min_confidence {
            admit = false;
            reasoning.push(format!(
                "confidence {:.3} below minimum {:.2}",
                confidence, policy.min_confidence
            ));
        } else {
            reasoning.push(format!("confidence {:.3} ≥ minimum {:.2}", confidence, policy.min_confidence));
        }

        if let Some(remaining) = self.cooldowns.remaining(specialization, policy.cooldown(), now) {
            admit = false;
            reasoning.push(format!("in cooldown for another {}s", remaining.num_seconds()));
        }

        let proposed_count = if admit {
            let wanted = if normalized_workload >= policy.workload_critical { 2 } else { 1 };
            wanted.min(remaining_capacity).min(policy.max_spawn_per_decision.max(1))
        } else {
            0
        };
        if admit {
            reasoning.push(format!("admit {} sub-agent(s)", proposed_count));
        }

        SpawnDecision {
            specialization: specialization.clone(),
            admit,
            proposed_count,
            confidence,
            factors,
            reasoning,
            decided_at: now,
        }
    }
}

fn workload_factor(normalized: f64, policy: &SpawnPolicy) -> f64 {
    if normalized >= policy.workload_critical {
        1.0
    } else if normalized >= policy.workload_high {
        0.8
    } else {
        normalized
    }
}

fn api_health_factor(health: f64, policy: &SpawnPolicy) -> f64 {
    let health = health.clamp(0.0, 1.0);
    if health < policy.api_unhealthy {
        0.0
    } else if health < policy.api_degraded {
        health * 0.75
    } else {
        health
    }
}

fn breaker_factor(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 1.0,
        CircuitState::HalfOpen => 0.5,
        CircuitState::Open => 0.0,
    }
}

fn capacity_factor(active: u32, ceiling: u32) -> f64 {
    if ceiling == 0 {
        return 0.0;
    }
    (1.0 - active as f64 / ceiling as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workload::BottleneckSeverity;

    fn signal(specialization: Specialization, workload: f64, active: u32) -> WorkloadSignal {
        WorkloadSignal {
            specialization,
            open_items: 0,
            pending_reviews: 0,
            active_agents: active,
            workload_per_agent: workload,
            bottleneck_severity: BottleneckSeverity::Critical,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_weighted_confidence_matches_reference_case() {
        let factors = FactorBreakdown {
            workload: 1.0,
            api_health: 0.8,
            circuit_breaker: 1.0,
            capacity: 0.9,
            priority: 0.5,
        };
        let confidence = factors.confidence(&FactorWeights::default());
        assert!((confidence - 0.835).abs() < 1e-9);
        assert!(confidence >= SpawnPolicy::default().min_confidence);
    }

    #[test]
    fn test_high_workload_admits() {
        let engine = DecisionEngine::new();
        let policy = SpawnPolicy::default();
        let mut context = DecisionContext::default();
        context.health.insert(
            Specialization::Security,
            HealthSignal {
                api_health: 0.8,
                breaker: CircuitState::Closed,
            },
        );
        let decisions = engine.evaluate(
            &[signal(Specialization::Security, 9.0, 1)],
            &context,
            &policy,
            Utc::now(),
        );
        assert_eq!(decisions.len(), 1);
        let decision = &decisions[0];
        assert!(decision.admit, "{:?}", decision.reasoning);
        assert_eq!(decision.factors.workload, 1.0);
        assert_eq!(decision.proposed_count, 2);
        assert!(!decision.reasoning.is_empty());
    }

    #[test]
    fn test_low_workload_does_not_admit_but_explains() {
        let engine = DecisionEngine::new();
        let decisions = engine.evaluate(
            &[signal(Specialization::Testing, 0.5, 2)],
            &DecisionContext::default(),
            &SpawnPolicy::default(),
            Utc::now(),
        );
        assert!(!decisions[0].admit);
        assert!(decisions[0].reasoning.iter().any(|r| r.contains("below high threshold")));
    }

    #[test]
    fn test_open_breaker_suppresses_spawning() {
        let engine = DecisionEngine::new();
        let mut context = DecisionContext::default();
        context.health.insert(
            Specialization::Backend,
            HealthSignal {
                api_health: 1.0,
                breaker: CircuitState::Open,
            },
        );
        let decisions = engine.evaluate(
            &[signal(Specialization::Backend, 9.0, 0)],
            &context,
            &SpawnPolicy::default(),
            Utc::now(),
        );
        assert!(!decisions[0].admit);
        assert_eq!(decisions[0].factors.circuit_breaker, 0.0);
    }

    #[test]
    fn test_saturated_capacity_blocks_admission() {
        let engine = DecisionEngine::new();
        let decisions = engine.evaluate(
            &[signal(Specialization::Frontend, 9.0, 8)],
            &DecisionContext::default(),
            &SpawnPolicy::default(),
            Utc::now(),
        );
        assert!(!decisions[0].admit);
        assert_eq!(decisions[0].factors.capacity, 0.0);
    }

    #[test]
    fn test_cooldown_blocks_second_admit() {
        let engine = DecisionEngine::new();
        let policy = SpawnPolicy::default();
        let now = Utc::now();
        let signals = [signal(Specialization::Performance, 9.0, 1)];

        let first = engine.evaluate(&signals, &DecisionContext::default(), &policy, now);
        let second = engine.evaluate(
            &signals,
            &DecisionContext::default(),
            &policy,
            now + Duration::seconds(60),
        );
        assert!(first[0].admit);
        assert!(!second[0].admit);

        let later = engine.evaluate(
            &signals,
            &DecisionContext::default(),
            &policy,
            now + Duration::seconds(301),
        );
        assert!(later[0].admit);
    }

    #[test]
    fn test_seeded_cooldown_is_respected() {
        let engine = DecisionEngine::new();
        let now = Utc::now();
        let last = now - Duration::seconds(30);
        engine.cooldowns().seed([(&Specialization::Security, &last)]);
        let decisions = engine.evaluate(
            &[signal(Specialization::Security, 9.0, 1)],
            &DecisionContext::default(),
            &SpawnPolicy::default(),
            now,
        );
        assert!(!decisions[0].admit);
    }

    #[test]
    fn test_decisions_capped_and_admits_first() {
        let engine = DecisionEngine::new();
        let mut policy = SpawnPolicy::default();
        policy.max_decisions = 2;
        let signals = [
            signal(Specialization::Testing, 0.2, 1),
            signal(Specialization::Security, 9.0, 1),
            signal(Specialization::Backend, 0.1, 1),
        ];
        let decisions = engine.evaluate(&signals, &DecisionContext::default(), &policy, Utc::now());
        assert_eq!(decisions.len(), 2);
        assert!(decisions[0].admit);
        assert_eq!(decisions[0].specialization, Specialization::Security);
    }

    #[test]
    fn test_duplicate_signals_admit_once() {
        let engine = DecisionEngine::new();
        let signals = [
            signal(Specialization::Security, 9.0, 1),
            signal(Specialization::Security, 8.0, 1),
        ];
        let decisions = engine.evaluate(&signals, &DecisionContext::default(), &SpawnPolicy::default(), Utc::now());
        assert_eq!(decisions.iter().filter(|d| d.admit).count(), 1);
    }

    #[test]
    fn test_degraded_health_reduces_factor() {
        let policy = SpawnPolicy::default();
        assert_eq!(api_health_factor(0.3, &policy), 0.0);
        assert!((api_health_factor(0.6, &policy) - 0.45).abs() < 1e-9);
        assert_eq!(api_health_factor(0.9, &policy), 0.9);
    }
}
