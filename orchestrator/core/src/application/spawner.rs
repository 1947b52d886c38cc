// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Spawn Service
//!
//! Turns workload signals into sub-agent admissions. Decisions are computed
//! against a snapshot; the admissions themselves go through the update
//! protocol, whose mutator re-checks the persisted `spawn_ledger` so two
//! processes evaluating the same spike cannot both admit.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::registry_update::{RegistryUpdater, UpdateError};
use crate::domain::agent::{AgentId, AgentRecord, AgentStatus, Specialization};
use crate::domain::events::RegistryEvent;
use crate::domain::registry::RegistryDocument;
use crate::domain::repository::{HealthProvider, SignalError, WorkloadSignalProvider};
use crate::domain::spawning::{DecisionContext, DecisionEngine, SpawnDecision};
use crate::domain::validation::ValidationError;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Workload signals unavailable: {0}")]
    Signals(#[from] SignalError),

    #[error(transparent)]
    Update(#[from] UpdateError),
}

#[derive(Debug, Clone, Default)]
pub struct SpawnReport {
    pub decisions: Vec<SpawnDecision>,
    pub admitted: Vec<AgentId>,
    pub committed: bool,
    pub attempts: u32,
}

struct PlannedAdmission {
    specialization: Specialization,
    ids: Vec<AgentId>,
    reason: String,
}

pub struct SpawnService {
    updater: Arc<RegistryUpdater>,
    engine: DecisionEngine,
    signals: Arc<dyn WorkloadSignalProvider>,
    health: Arc<dyn HealthProvider>,
    event_bus: EventBus,
}

impl SpawnService {
    pub fn new(
        updater: Arc<RegistryUpdater>,
        signals: Arc<dyn WorkloadSignalProvider>,
        health: Arc<dyn HealthProvider>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            updater,
            engine: DecisionEngine::new(),
            signals,
            health,
            event_bus,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// One decision pass: evaluate every signal, commit the admits.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<SpawnReport, SpawnError> {
        let snapshot = self.updater.snapshot().await.map_err(UpdateError::from)?;
        let signals = self.signals.get_signals().await?;
        let health = self.health.get_health().await.unwrap_or_else(|e| {
            warn!(error = %e, "Health signals unavailable; treating downstream APIs as healthy");
            HashMap::new()
        });

        let document = &snapshot.document;
        self.engine.cooldowns().seed(document.spawn_ledger.iter());
        let context = DecisionContext {
            health,
            active_agents: document.active_counts(),
        };
        let decisions = self.engine.evaluate(&signals, &context, &document.config.spawning, now);

        for decision in &decisions {
            metrics::counter!("colony_spawn_decisions_total", "admit" => decision.admit.to_string()).increment(1);
            debug!(
                specialization = %decision.specialization,
                admit = decision.admit,
                confidence = decision.confidence,
                reasoning = ?decision.reasoning,
                "Spawn decision"
            );
            self.event_bus.publish(RegistryEvent::SpawnDecisionMade {
                decision: decision.clone(),
            });
        }

        let planned: Vec<PlannedAdmission> = decisions
            .iter()
            .filter(|d| d.admit && d.proposed_count > 0)
            .map(|d| PlannedAdmission {
                specialization: d.specialization.clone(),
                ids: (0..d.proposed_count).map(|_| AgentId::generate(&d.specialization)).collect(),
                reason: format!("workload spike (confidence {:.3})", d.confidence),
            })
            .collect();

        let mut report = SpawnReport {
            decisions,
            ..Default::default()
        };
        if planned.is_empty() {
            info!(decisions = report.decisions.len(), "Spawn pass admitted nothing");
            return Ok(report);
        }

        let admitted: Mutex<Vec<AgentId>> = Mutex::new(Vec::new());
        let outcome = self
            .updater
            .apply("spawn", |doc| {
                *admitted.lock() = admit_planned(doc, &planned, now);
                Ok(())
            })
            .await?;

        report.committed = outcome.committed;
        report.attempts = outcome.attempts;
        if outcome.committed {
            for id in admitted.into_inner() {
                let Some(record) = outcome.document.get(&id) else {
                    continue;
                };
                self.publish_admitted(record, now);
                report.admitted.push(id);
            }
        }

        info!(
            decisions = report.decisions.len(),
            admitted = report.admitted.len(),
            attempts = report.attempts,
            "Spawn pass complete"
        );
        Ok(report)
    }

    /// Operator admission of a regular worker, or of a sub-agent when
    /// `parent` is given.
    pub async fn admit_manual(
        &self,
        specialization: Specialization,
        parent: Option<AgentId>,
        now: DateTime<Utc>,
    ) -> Result<AgentRecord, UpdateError> {
        let id = AgentId::generate(&specialization);
        let outcome = self
            .updater
            .apply("admit", |doc| {
                let record = match &parent {
                    Some(parent_id) => {
                        let parent = doc
                            .get(parent_id)
                            .ok_or_else(|| ValidationError::UnknownAgent(parent_id.clone()))?;
                        AgentRecord::spawn_sub_agent(id.clone(), specialization.clone(), Some(parent), "manual admission", now)
                    }
                    None => AgentRecord::admit(id.clone(), specialization.clone(), now),
                };
                doc.insert_agent(record);
                Ok(())
            })
            .await?;

        let record = outcome
            .document
            .get(&id)
            .cloned()
            .ok_or_else(|| UpdateError::Validation(ValidationError::UnknownAgent(id.clone())))?;
        info!(agent_id = %record.id, specialization = %record.specialization, "Agent admitted manually");
        self.publish_admitted(&record, now);
        Ok(record)
    }

    fn publish_admitted(&self, record: &AgentRecord, now: DateTime<Utc>) {
        self.event_bus.publish(RegistryEvent::AgentAdmitted {
            agent_id: record.id.clone(),
            specialization: record.specialization.clone(),
            sub_agent: record.is_sub_agent(),
            parent_id: record.lineage.parent_id.clone(),
            reason: record
                .lineage
                .spawn_reason
                .clone()
                .unwrap_or_else(|| "manual admission".to_string()),
            admitted_at: now,
        });
    }
}

/// Insert the planned sub-agents that still fit the persisted cooldown and
/// capacity. Returns the ids actually inserted.
fn admit_planned(doc: &mut RegistryDocument, planned: &[PlannedAdmission], now: DateTime<Utc>) -> Vec<AgentId> {
    let policy = doc.config.spawning.clone();
    let mut inserted = Vec::new();

    for plan in planned {
        if let Some(last) = doc.spawn_ledger.get(&plan.specialization) {
            if now - *last < policy.cooldown() {
                debug!(specialization = %plan.specialization, "Admission already recorded inside cooldown");
                continue;
            }
        }

        let room = policy
            .max_agents_per_specialization
            .saturating_sub(doc.active_count(&plan.specialization)) as usize;
        if room == 0 {
            continue;
        }

        let parent = top_performer(doc, &plan.specialization);
        let records: Vec<AgentRecord> = plan
            .ids
            .iter()
            .take(room)
            .map(|id| {
                AgentRecord::spawn_sub_agent(
                    id.clone(),
                    plan.specialization.clone(),
                    parent.as_ref(),
                    plan.reason.clone(),
                    now,
                )
            })
            .collect();

        for record in records {
            let id = record.id.clone();
            if doc.insert_agent(record) {
                inserted.push(id);
            }
        }
        doc.spawn_ledger.insert(plan.specialization.clone(), now);
    }
    inserted
}

/// Highest-scoring regular agent of a specialization; the lineage parent for
/// spawned sub-agents.
fn top_performer(doc: &RegistryDocument, specialization: &Specialization) -> Option<AgentRecord> {
    doc.agents
        .values()
        .filter(|a| &a.specialization == specialization && !a.is_sub_agent())
        .filter(|a| matches!(a.status, AgentStatus::Active | AgentStatus::HallOfFame))
        .max_by(|a, b| a.overall().total_cmp(&b.overall()).then_with(|| b.id.cmp(&a.id)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RetryPolicy;
    use crate::domain::repository::DocumentStore;
    use crate::domain::registry::RegistryConfig;
    use crate::domain::workload::{BottleneckSeverity, WorkloadSignal};
    use crate::infrastructure::signals::StaticHealthProvider;
    use crate::infrastructure::store::InMemoryDocumentStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedSignals(Vec<WorkloadSignal>);

    #[async_trait]
    impl WorkloadSignalProvider for FixedSignals {
        async fn get_signals(&self) -> Result<Vec<WorkloadSignal>, SignalError> {
            Ok(self.0.clone())
        }
    }

    fn spike(specialization: Specialization, now: DateTime<Utc>) -> WorkloadSignal {
        WorkloadSignal::from_counts(specialization, 16, 2, 2, BottleneckSeverity::Critical, now)
    }

    fn service(store: Arc<InMemoryDocumentStore>, signals: Vec<WorkloadSignal>) -> SpawnService {
        let updater = Arc::new(RegistryUpdater::new(
            store,
            RetryPolicy::default().with_base_delay(Duration::from_millis(1)),
            Duration::from_secs(1),
        ));
        SpawnService::new(
            updater,
            Arc::new(FixedSignals(signals)),
            Arc::new(StaticHealthProvider::default()),
            EventBus::with_default_capacity(),
        )
    }

    fn seeded_store(now: DateTime<Utc>) -> Arc<InMemoryDocumentStore> {
        let mut doc = RegistryDocument::new(RegistryConfig::default(), now);
        doc.insert_agent(AgentRecord::admit(AgentId::from("testing-lead"), Specialization::Testing, now));
        doc.insert_agent(AgentRecord::admit(AgentId::from("testing-2"), Specialization::Testing, now));
        Arc::new(InMemoryDocumentStore::with_document(doc))
    }

    #[tokio::test]
    async fn test_spike_admits_sub_agents_with_lineage() {
        let now = Utc::now();
        let store = seeded_store(now);
        let service = service(store.clone(), vec![spike(Specialization::Testing, now)]);

        let report = service.run_cycle(now).await.unwrap();
        assert!(report.committed);
        assert_eq!(report.admitted.len(), 2);

        let doc = store.fetch().await.unwrap().document;
        let spawned = doc.get(&report.admitted[0]).unwrap();
        assert!(spawned.is_sub_agent());
        assert_eq!(spawned.lineage.generation, 1);
        assert!(spawned.lineage.parent_id.is_some());
        assert_eq!(doc.spawn_ledger.get(&Specialization::Testing), Some(&now));
        assert_eq!(doc.stats.sub_agents, 2);
    }

    #[tokio::test]
    async fn test_persisted_ledger_blocks_second_process() {
        let now = Utc::now();
        let store = seeded_store(now);
        let first = service(store.clone(), vec![spike(Specialization::Testing, now)]);
        let second = service(store.clone(), vec![spike(Specialization::Testing, now)]);

        let a = first.run_cycle(now).await.unwrap();
        let b = second.run_cycle(now + chrono::Duration::seconds(30)).await.unwrap();
        assert_eq!(a.admitted.len(), 2);
        assert!(b.admitted.is_empty());
        assert!(b.decisions.iter().all(|d| !d.admit));
    }

    #[tokio::test]
    async fn test_admit_manual_under_parent() {
        let now = Utc::now();
        let store = seeded_store(now);
        let service = service(store.clone(), Vec::new());

        let regular = service.admit_manual(Specialization::Security, None, now).await.unwrap();
        assert!(!regular.is_sub_agent());
        let child = service
            .admit_manual(Specialization::Testing, Some(AgentId::from("testing-lead")), now)
            .await
            .unwrap();
        assert_eq!(child.lineage.parent_id, Some(AgentId::from("testing-lead")));

        let missing = service
            .admit_manual(Specialization::Testing, Some(AgentId::from("ghost")), now)
            .await;
        assert!(matches!(missing, Err(UpdateError::Validation(ValidationError::UnknownAgent(_)))));
    }
}
