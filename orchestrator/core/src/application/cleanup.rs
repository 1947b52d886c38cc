// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Retires idle sub-agents once the spike that spawned them is over.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::registry_update::{RegistryUpdater, UpdateError};
use crate::domain::agent::{AgentId, Specialization};
use crate::domain::events::RegistryEvent;
use crate::domain::lifecycle::{apply_transition, evaluate_transition, EvaluationCycle, Transition};
use crate::domain::registry::RegistryDocument;
use crate::domain::repository::WorkloadSignalProvider;
use crate::domain::workload::{severity_index, BottleneckSeverity};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub deactivated: Vec<AgentId>,
    /// No signal set was available, so nothing was retired.
    pub signals_unavailable: bool,
    pub committed: bool,
}

pub struct CleanupService {
    updater: Arc<RegistryUpdater>,
    signals: Arc<dyn WorkloadSignalProvider>,
    event_bus: EventBus,
}

impl CleanupService {
    pub fn new(updater: Arc<RegistryUpdater>, signals: Arc<dyn WorkloadSignalProvider>, event_bus: EventBus) -> Self {
        Self {
            updater,
            signals,
            event_bus,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<CleanupReport, UpdateError> {
        let severities = match self.signals.get_signals().await {
            Ok(signals) => severity_index(&signals),
            Err(e) => {
                warn!(error = %e, "Workload signals unavailable; skipping sub-agent cleanup");
                return Ok(CleanupReport {
                    signals_unavailable: true,
                    ..Default::default()
                });
            }
        };

        let retired: Mutex<Vec<(AgentId, f64, String)>> = Mutex::new(Vec::new());
        let outcome = self
            .updater
            .apply("cleanup", |doc| {
                *retired.lock() = deactivate_idle(doc, &severities, now);
                Ok(())
            })
            .await?;

        let mut report = CleanupReport {
            committed: outcome.committed,
            ..Default::default()
        };
        if !outcome.committed {
            return Ok(report);
        }

        for (id, idle_hours, reason) in retired.into_inner() {
            let Some(record) = outcome.document.get(&id) else {
                continue;
            };
            metrics::counter!("colony_lifecycle_transitions_total", "transition" => Transition::Deactivate.as_str())
                .increment(1);
            info!(agent_id = %id, idle_hours, "Sub-agent deactivated");
            self.event_bus.publish(RegistryEvent::SubAgentDeactivated {
                agent_id: id.clone(),
                specialization: record.specialization.clone(),
                idle_hours,
                reason,
                deactivated_at: now,
            });
            report.deactivated.push(id);
        }
        Ok(report)
    }
}

fn deactivate_idle(
    doc: &mut RegistryDocument,
    severities: &HashMap<Specialization, BottleneckSeverity>,
    now: DateTime<Utc>,
) -> Vec<(AgentId, f64, String)> {
    let thresholds = doc.config.lifecycle.clone();
    let cycle = EvaluationCycle::at(now, thresholds.cycle_hours);
    let mut retired = Vec::new();

    for record in doc.agents.values_mut().filter(|a| a.is_active() && a.is_sub_agent()) {
        let severity = severities.get(&record.specialization).copied().unwrap_or_default();
        let decision = evaluate_transition(record, &thresholds, cycle, now, severity);
        if decision.transition != Transition::Deactivate {
            continue;
        }
        let idle_hours = record.idle_hours(now);
        apply_transition(record, &decision, now);
        retired.push((record.id.clone(), idle_hours, decision.reason));
    }
    retired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::retry::RetryPolicy;
    use crate::domain::agent::{AgentRecord, AgentStatus};
    use crate::domain::registry::RegistryConfig;
    use crate::domain::repository::{DocumentStore, SignalError};
    use crate::domain::workload::WorkloadSignal;
    use crate::infrastructure::store::InMemoryDocumentStore;
    use async_trait::async_trait;
    use chrono::Duration;

    struct Signals(Vec<WorkloadSignal>);

    #[async_trait]
    impl WorkloadSignalProvider for Signals {
        async fn get_signals(&self) -> Result<Vec<WorkloadSignal>, SignalError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_idle_sub_agents_retired_only_when_spike_is_over() {
        let now = Utc::now();
        let mut doc = RegistryDocument::new(RegistryConfig::default(), now);
        let earlier = now - Duration::hours(13);
        doc.insert_agent(AgentRecord::spawn_sub_agent(AgentId::from("t-sub"), Specialization::Testing, None, "spike", earlier));
        doc.insert_agent(AgentRecord::spawn_sub_agent(AgentId::from("s-sub"), Specialization::Security, None, "spike", earlier));
        doc.insert_agent(AgentRecord::spawn_sub_agent(AgentId::from("fresh"), Specialization::Testing, None, "spike", now));
        let store = Arc::new(InMemoryDocumentStore::with_document(doc));

        let signals = vec![WorkloadSignal::from_counts(
            Specialization::Security,
            20,
            0,
            2,
            BottleneckSeverity::High,
            now,
        )];
        let updater = Arc::new(RegistryUpdater::new(
            store.clone(),
            RetryPolicy::default(),
            std::time::Duration::from_secs(1),
        ));
        let service = CleanupService::new(updater, Arc::new(Signals(signals)), EventBus::with_default_capacity());

        let report = service.run(now).await.unwrap();
        assert_eq!(report.deactivated, vec![AgentId::from("t-sub")]);

        let doc = store.fetch().await.unwrap().document;
        assert_eq!(doc.get(&AgentId::from("t-sub")).unwrap().status, AgentStatus::Deactivated);
        assert_eq!(doc.get(&AgentId::from("s-sub")).unwrap().status, AgentStatus::Active);
        assert_eq!(doc.get(&AgentId::from("fresh")).unwrap().status, AgentStatus::Active);
        assert_eq!(doc.stats.deactivated, 1);
    }
}
