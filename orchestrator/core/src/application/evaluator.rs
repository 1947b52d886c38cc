// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Evaluator
//!
//! One evaluation pass over the population:
//!
//! 1. Collect activity for every active agent through the cached collector
//!    (I/O happens here, outside the mutator).
//! 2. Inside a single registry mutation, rescore each agent with the
//!    document's scoring config and run the lifecycle state machine on the
//!    fresh record.
//! 3. Publish promotion, elimination and deactivation events for what was
//!    actually committed.
//!
//! Metrics are rewritten only when a value changes (or on first scoring), so
//! `last_updated_at` keeps measuring idleness for sub-agents.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::registry_update::{RegistryUpdater, UpdateError};
use crate::domain::agent::{AgentId, AgentStatus, Specialization};
use crate::domain::events::RegistryEvent;
use crate::domain::lifecycle::{apply_transition, evaluate_transition, EvaluationCycle, Transition, TransitionDecision};
use crate::domain::registry::RegistryDocument;
use crate::domain::repository::WorkloadSignalProvider;
use crate::domain::scoring::{score, ActivityCounters};
use crate::domain::workload::{severity_index, BottleneckSeverity};
use crate::infrastructure::activity::CachedActivityCollector;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub cycle: u64,
    pub evaluated: usize,
    pub rescored: usize,
    pub promoted: Vec<AgentId>,
    pub eliminated: Vec<AgentId>,
    pub deactivated: Vec<AgentId>,
    /// Agents whose activity could not be collected; their previous scores were kept.
    pub unscored: Vec<AgentId>,
    pub committed: bool,
    pub attempts: u32,
}

pub struct Evaluator {
    updater: Arc<RegistryUpdater>,
    activity: Arc<CachedActivityCollector>,
    signals: Option<Arc<dyn WorkloadSignalProvider>>,
    event_bus: EventBus,
    window_days: u32,
}

impl Evaluator {
    pub fn new(
        updater: Arc<RegistryUpdater>,
        activity: Arc<CachedActivityCollector>,
        event_bus: EventBus,
        window_days: u32,
    ) -> Self {
        Self {
            updater,
            activity,
            signals: None,
            event_bus,
            window_days,
        }
    }

    /// Signals let the evaluator retire idle sub-agents in the same pass.
    pub fn with_signals(mut self, signals: Arc<dyn WorkloadSignalProvider>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<EvaluationReport, UpdateError> {
        let snapshot = self.updater.snapshot().await?;
        let candidates: Vec<AgentId> = snapshot
            .document
            .active_agents()
            .map(|a| a.id.clone())
            .collect();

        let mut counters = HashMap::new();
        let mut unscored = Vec::new();
        for id in &candidates {
            match self.activity.get_at(id, self.window_days, now).await {
                Ok(c) => {
                    counters.insert(id.clone(), c);
                }
                Err(e) => {
                    warn!(agent_id = %id, error = %e, "Activity unavailable; keeping previous scores");
                    unscored.push(id.clone());
                }
            }
        }

        let severities = match &self.signals {
            Some(provider) => match provider.get_signals().await {
                Ok(signals) => Some(severity_index(&signals)),
                Err(e) => {
                    warn!(error = %e, "Workload signals unavailable; sub-agents not evaluated this pass");
                    None
                }
            },
            None => None,
        };

        let applied: Mutex<Vec<(AgentId, TransitionDecision)>> = Mutex::new(Vec::new());
        let outcome = self
            .updater
            .apply("evaluate", |doc| {
                let decisions = apply_evaluation(doc, &counters, &unscored, severities.as_ref(), now);
                *applied.lock() = decisions;
                Ok(())
            })
            .await?;

        let cycle = EvaluationCycle::at(now, outcome.document.config.lifecycle.cycle_hours);
        let mut report = EvaluationReport {
            cycle: cycle.0,
            evaluated: candidates.len(),
            unscored,
            committed: outcome.committed,
            attempts: outcome.attempts,
            ..Default::default()
        };

        report.rescored = outcome
            .document
            .agents
            .values()
            .filter(|a| {
                outcome
                    .base
                    .get(&a.id)
                    .is_some_and(|before| !before.metrics.same_values(&a.metrics))
            })
            .count();

        if !outcome.committed {
            info!(cycle = cycle.0, evaluated = report.evaluated, "Evaluation produced no changes");
            return Ok(report);
        }

        for (id, decision) in applied.into_inner() {
            let Some(record) = outcome.document.get(&id) else {
                continue;
            };
            if record.status != decision.target || decision.transition == Transition::None {
                continue;
            }
            metrics::counter!("colony_lifecycle_transitions_total", "transition" => decision.transition.as_str())
                .increment(1);
            info!(
                agent_id = %id,
                specialization = %record.specialization,
                transition = decision.transition.as_str(),
                reason = %decision.reason,
                "Lifecycle transition committed"
            );
            let event = match decision.transition {
                Transition::Promote => {
                    report.promoted.push(id.clone());
                    RegistryEvent::AgentPromoted {
                        agent_id: id,
                        specialization: record.specialization.clone(),
                        overall: record.overall(),
                        reason: decision.reason,
                        promoted_at: now,
                    }
                }
                Transition::Eliminate => {
                    report.eliminated.push(id.clone());
                    RegistryEvent::AgentEliminated {
                        agent_id: id,
                        specialization: record.specialization.clone(),
                        overall: record.overall(),
                        reason: decision.reason,
                        eliminated_at: now,
                    }
                }
                Transition::Deactivate => {
                    report.deactivated.push(id.clone());
                    let idle_hours = outcome.base.get(&id).map(|r| r.idle_hours(now)).unwrap_or(0.0);
                    RegistryEvent::SubAgentDeactivated {
                        agent_id: id,
                        specialization: record.specialization.clone(),
                        idle_hours,
                        reason: decision.reason,
                        deactivated_at: now,
                    }
                }
                Transition::None => continue,
            };
            self.event_bus.publish(event);
        }

        info!(
            cycle = cycle.0,
            evaluated = report.evaluated,
            rescored = report.rescored,
            promoted = report.promoted.len(),
            eliminated = report.eliminated.len(),
            deactivated = report.deactivated.len(),
            "Evaluation pass committed"
        );
        Ok(report)
    }
}

/// Rescore and transition every active agent in `doc`. Pure; safe to run
/// again on a fresher document. Returns the decisions that changed a status.
///
/// `severities == None` means workload is unknown, so sub-agents keep their
/// status.
pub fn apply_evaluation(
    doc: &mut RegistryDocument,
    counters: &HashMap<AgentId, ActivityCounters>,
    unscored: &[AgentId],
    severities: Option<&HashMap<Specialization, BottleneckSeverity>>,
    now: DateTime<Utc>,
) -> Vec<(AgentId, TransitionDecision)> {
    let config = doc.config.clone();
    let cycle = EvaluationCycle::at(now, config.lifecycle.cycle_hours);
    let mut transitions = Vec::new();

    for (id, activity) in counters {
        let Some(record) = doc.get_mut(id) else {
            continue;
        };
        if record.status != AgentStatus::Active {
            continue;
        }
        let fresh = score(activity, &config.scoring, now);
        if record.metrics.computed_at.is_none() || !record.metrics.same_values(&fresh) {
            record.metrics = fresh;
            record.touch(now);
        }
        transition(record, &config.lifecycle, cycle, now, severities, &mut transitions);
    }

    // Agents without fresh activity are still judged on their stored scores.
    for id in unscored {
        if let Some(record) = doc.get_mut(id).filter(|r| r.is_active()) {
            transition(record, &config.lifecycle, cycle, now, severities, &mut transitions);
        }
    }

    transitions
}

fn transition(
    record: &mut crate::domain::agent::AgentRecord,
    thresholds: &crate::domain::lifecycle::LifecycleThresholds,
    cycle: EvaluationCycle,
    now: DateTime<Utc>,
    severities: Option<&HashMap<Specialization, BottleneckSeverity>>,
    transitions: &mut Vec<(AgentId, TransitionDecision)>,
) {
    let severity = match severities {
        Some(index) => index.get(&record.specialization).copied().unwrap_or_default(),
        None if record.is_sub_agent() => return,
        None => BottleneckSeverity::None,
    };
    let decision = evaluate_transition(record, thresholds, cycle, now, severity);
    let status_changes = decision.target != record.status;
    apply_transition(record, &decision, now);
    if status_changes {
        transitions.push((record.id.clone(), decision));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentRecord;
    use crate::domain::registry::RegistryConfig;
    use chrono::Duration;

    fn strong() -> ActivityCounters {
        ActivityCounters {
            items_created: 5,
            items_resolved: 5,
            contributions_opened: 5,
            contributions_accepted: 5,
            reviews_received: 2,
            reviews_approved: 2,
            novel_contributions: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_evaluation_promotes_strong_agent() {
        let now = Utc::now();
        let mut doc = RegistryDocument::new(RegistryConfig::default(), now);
        doc.insert_agent(AgentRecord::admit(AgentId::from("a"), Specialization::Backend, now));
        let counters = HashMap::from([(AgentId::from("a"), strong())]);

        let transitions = apply_evaluation(&mut doc, &counters, &[], None, now);
        assert_eq!(transitions.len(), 1);
        assert_eq!(doc.get(&AgentId::from("a")).unwrap().status, AgentStatus::HallOfFame);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_apply_evaluation_is_idempotent_within_cycle() {
        let now = Utc::now();
        let mut doc = RegistryDocument::new(RegistryConfig::default(), now);
        doc.insert_agent(AgentRecord::admit(AgentId::from("weak"), Specialization::Backend, now));
        let counters = HashMap::from([(AgentId::from("weak"), ActivityCounters::default())]);

        apply_evaluation(&mut doc, &counters, &[], None, now);
        let once = doc.clone();
        apply_evaluation(&mut doc, &counters, &[], None, now);
        assert!(once.same_content(&doc));
        assert_eq!(doc.get(&AgentId::from("weak")).unwrap().evaluation.elimination_streak, 1);
        assert_eq!(doc.get(&AgentId::from("weak")).unwrap().status, AgentStatus::Active);
    }

    #[test]
    fn test_sub_agents_untouched_without_signals() {
        let now = Utc::now();
        let mut doc = RegistryDocument::new(RegistryConfig::default(), now);
        let spawned_at = now - Duration::hours(20);
        let mut sub = AgentRecord::spawn_sub_agent(AgentId::from("sub"), Specialization::Testing, None, "spike", spawned_at);
        sub.metrics.computed_at = Some(spawned_at);
        doc.insert_agent(sub);
        let counters = HashMap::from([(AgentId::from("sub"), ActivityCounters::default())]);

        assert!(apply_evaluation(&mut doc, &counters, &[], None, now).is_empty());
        let empty = HashMap::new();
        let transitions = apply_evaluation(&mut doc, &counters, &[], Some(&empty), now);
        assert_eq!(transitions.len(), 1);
        assert_eq!(doc.get(&AgentId::from("sub")).unwrap().status, AgentStatus::Deactivated);
    }
}
