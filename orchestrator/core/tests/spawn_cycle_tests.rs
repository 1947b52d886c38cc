// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use colony_core::application::registry_update::RegistryUpdater;
use colony_core::application::retry::RetryPolicy;
use colony_core::application::spawner::SpawnService;
use colony_core::domain::agent::{AgentId, AgentRecord, Specialization};
use colony_core::domain::events::RegistryEvent;
use colony_core::domain::registry::{RegistryConfig, RegistryDocument, Revision, Snapshot};
use colony_core::domain::repository::{DocumentStore, StoreError};
use colony_core::domain::workload::{BottleneckSeverity, CircuitState, HealthSignal, WorkloadSignal};
use colony_core::infrastructure::event_bus::EventBus;
use colony_core::infrastructure::signals::{JsonFileSignalProvider, SignalExport};
use colony_core::infrastructure::store::InMemoryDocumentStore;

fn store_with_one_security_agent(max_agents: u32) -> Arc<InMemoryDocumentStore> {
    let now = Utc::now();
    let mut config = RegistryConfig::default();
    config.spawning.max_agents_per_specialization = max_agents;
    let mut doc = RegistryDocument::new(config, now);
    doc.insert_agent(AgentRecord::admit(AgentId::from("security-1"), Specialization::Security, now));
    Arc::new(InMemoryDocumentStore::with_document(doc))
}

fn write_signals(path: &std::path::Path, api_health: f64, breaker: CircuitState) {
    let now = Utc::now();
    let export = SignalExport {
        generated_at: Some(now),
        workload: vec![WorkloadSignal::from_counts(
            Specialization::Security,
            9,
            0,
            1,
            BottleneckSeverity::Critical,
            now,
        )],
        health: HashMap::from([(
            Specialization::Security,
            HealthSignal {
                api_health,
                breaker,
            },
        )]),
    };
    std::fs::write(path, serde_json::to_vec_pretty(&export).unwrap()).unwrap();
}

/// Another control plane instance admits for `specialization` just before
/// our first commit lands.
struct RacingSpawnStore {
    inner: InMemoryDocumentStore,
    competing: Mutex<Option<(Specialization, DateTime<Utc>)>>,
}

#[async_trait]
impl DocumentStore for RacingSpawnStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        self.inner.fetch().await
    }

    async fn commit(&self, expected: &Revision, document: &RegistryDocument) -> Result<Revision, StoreError> {
        let pending = self.competing.lock().take();
        if let Some((specialization, at)) = pending {
            let snapshot = self.inner.fetch().await?;
            let mut theirs = snapshot.document;
            let parent = theirs.get(&AgentId::from("security-1")).cloned();
            for n in 0..2 {
                theirs.insert_agent(AgentRecord::spawn_sub_agent(
                    AgentId::new(format!("{}-other-{}", specialization, n)),
                    specialization.clone(),
                    parent.as_ref(),
                    "workload spike",
                    at,
                ));
            }
            theirs.spawn_ledger.insert(specialization, at);
            let generation = theirs.generation;
            theirs.stamp_commit(generation, Utc::now());
            self.inner.commit(&snapshot.revision, &theirs).await?;
        }
        self.inner.commit(expected, document).await
    }
}

fn service(store: Arc<dyn DocumentStore>, path: &std::path::Path, bus: EventBus) -> SpawnService {
    let updater = Arc::new(RegistryUpdater::new(
        store,
        RetryPolicy::default().with_base_delay(std::time::Duration::from_millis(1)),
        std::time::Duration::from_secs(1),
    ));
    let provider = Arc::new(JsonFileSignalProvider::new(path));
    SpawnService::new(updater, provider.clone(), provider, bus)
}

#[tokio::test]
async fn test_reference_spike_admits_with_expected_confidence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");
    write_signals(&path, 0.8, CircuitState::Closed);
    let store = store_with_one_security_agent(10);
    let bus = EventBus::with_default_capacity();
    let mut events = bus.subscribe();

    let report = service(store.clone(), &path, bus).run_cycle(Utc::now()).await.unwrap();

    let decision = &report.decisions[0];
    assert!(decision.admit, "{:?}", decision.reasoning);
    assert!((decision.factors.capacity - 0.9).abs() < 1e-9);
    assert!((decision.factors.api_health - 0.8).abs() < 1e-9);
    assert!((decision.confidence - 0.835).abs() < 1e-9);
    assert_eq!(report.admitted.len(), 2);

    let doc = store.fetch().await.unwrap().document;
    assert_eq!(doc.active_count(&Specialization::Security), 3);
    for id in &report.admitted {
        let record = doc.get(id).unwrap();
        assert!(record.is_sub_agent());
        assert_eq!(record.lineage.parent_id.as_ref().map(|p| p.as_str()), Some("security-1"));
    }

    assert!(matches!(events.try_recv(), Ok(RegistryEvent::SpawnDecisionMade { .. })));
    assert!(matches!(events.try_recv(), Ok(RegistryEvent::AgentAdmitted { sub_agent: true, .. })));
}

#[tokio::test]
async fn test_cooldown_spans_restarts_then_expires() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");
    write_signals(&path, 1.0, CircuitState::Closed);
    let store = store_with_one_security_agent(10);
    let now = Utc::now();

    let first = service(store.clone(), &path, EventBus::with_default_capacity())
        .run_cycle(now)
        .await
        .unwrap();
    assert_eq!(first.admitted.len(), 2);

    // A freshly started service reads the cooldown back from the registry.
    let restarted = service(store.clone(), &path, EventBus::with_default_capacity());
    let blocked = restarted.run_cycle(now + Duration::seconds(60)).await.unwrap();
    assert!(!blocked.decisions[0].admit);
    assert!(blocked.decisions[0].reasoning.iter().any(|r| r.contains("cooldown")));
    assert!(blocked.admitted.is_empty());

    let later = restarted.run_cycle(now + Duration::seconds(301)).await.unwrap();
    assert!(later.decisions[0].admit, "{:?}", later.decisions[0].reasoning);
    assert_eq!(later.admitted.len(), 2);
}

#[tokio::test]
async fn test_open_breaker_holds_admission() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");
    write_signals(&path, 1.0, CircuitState::Open);
    let store = store_with_one_security_agent(10);

    let report = service(store.clone(), &path, EventBus::with_default_capacity())
        .run_cycle(Utc::now())
        .await
        .unwrap();

    assert!(!report.decisions[0].admit);
    assert_eq!(report.decisions[0].factors.circuit_breaker, 0.0);
    assert!(report.admitted.is_empty());
    assert_eq!(store.fetch().await.unwrap().document.generation, 0);
}

#[tokio::test]
async fn test_missing_signal_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_with_one_security_agent(10);

    let result = service(store, &dir.path().join("absent.json"), EventBus::with_default_capacity())
        .run_cycle(Utc::now())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_racing_spawn_cycles_admit_once_per_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signals.json");
    write_signals(&path, 1.0, CircuitState::Closed);
    let now = Utc::now();
    let seeded = store_with_one_security_agent(10).fetch().await.unwrap().document;
    let store = Arc::new(RacingSpawnStore {
        inner: InMemoryDocumentStore::with_document(seeded),
        competing: Mutex::new(Some((Specialization::Security, now))),
    });

    let report = service(store.clone(), &path, EventBus::with_default_capacity())
        .run_cycle(now)
        .await
        .unwrap();

    assert!(report.decisions[0].admit);
    assert!(report.admitted.is_empty(), "admitted inside a cooldown: {:?}", report.admitted);
    assert!(!report.committed);

    let doc = store.fetch().await.unwrap().document;
    let sub_agents = doc.agents.values().filter(|a| a.is_sub_agent()).count();
    assert_eq!(sub_agents, 2);
    assert_eq!(doc.active_count(&Specialization::Security), 3);
}
