// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use colony_core::application::registry_update::{RegistryUpdater, UpdateError};
use colony_core::application::retry::RetryPolicy;
use colony_core::domain::agent::{AgentId, AgentRecord, Specialization};
use colony_core::domain::events::RegistryEvent;
use colony_core::domain::registry::{RegistryConfig, RegistryDocument, Revision, Snapshot};
use colony_core::domain::repository::{DocumentStore, StoreError};
use colony_core::domain::validation::ValidationError;
use colony_core::infrastructure::event_bus::EventBus;
use colony_core::infrastructure::store::InMemoryDocumentStore;

type Mutation = Box<dyn FnOnce(&mut RegistryDocument) + Send>;

/// Yields to the scheduler around every store call so concurrent callers
/// interleave between fetch and commit.
struct YieldingStore {
    inner: InMemoryDocumentStore,
}

#[async_trait]
impl DocumentStore for YieldingStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        let snapshot = self.inner.fetch().await;
        tokio::task::yield_now().await;
        snapshot
    }

    async fn commit(&self, expected: &Revision, document: &RegistryDocument) -> Result<Revision, StoreError> {
        tokio::task::yield_now().await;
        self.inner.commit(expected, document).await
    }
}

/// Every commit loses the race; the committed document never changes.
struct AlwaysConflictingStore {
    inner: InMemoryDocumentStore,
    commits: AtomicU32,
}

#[async_trait]
impl DocumentStore for AlwaysConflictingStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        self.inner.fetch().await
    }

    async fn commit(&self, expected: &Revision, _document: &RegistryDocument) -> Result<Revision, StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::RevisionMismatch {
            expected: expected.clone(),
            actual: Revision("someone-else".to_string()),
        })
    }
}

/// Commit never returns.
struct HangingStore {
    inner: InMemoryDocumentStore,
}

#[async_trait]
impl DocumentStore for HangingStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        self.inner.fetch().await
    }

    async fn commit(&self, _expected: &Revision, _document: &RegistryDocument) -> Result<Revision, StoreError> {
        std::future::pending().await
    }
}

/// The write lands, but the acknowledgement never arrives.
struct SilentCommitStore {
    inner: InMemoryDocumentStore,
}

#[async_trait]
impl DocumentStore for SilentCommitStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        self.inner.fetch().await
    }

    async fn commit(&self, expected: &Revision, document: &RegistryDocument) -> Result<Revision, StoreError> {
        self.inner.commit(expected, document).await?;
        std::future::pending().await
    }
}

/// Lands a competing write just before the first commit goes through.
struct InterferingStore {
    inner: InMemoryDocumentStore,
    interference: Mutex<Option<Mutation>>,
}

impl InterferingStore {
    fn new(inner: InMemoryDocumentStore, mutation: Mutation) -> Self {
        Self {
            inner,
            interference: Mutex::new(Some(mutation)),
        }
    }
}

#[async_trait]
impl DocumentStore for InterferingStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        self.inner.fetch().await
    }

    async fn commit(&self, expected: &Revision, document: &RegistryDocument) -> Result<Revision, StoreError> {
        let pending = self.interference.lock().take();
        if let Some(mutation) = pending {
            let snapshot = self.inner.fetch().await?;
            let mut theirs = snapshot.document;
            mutation(&mut theirs);
            let generation = theirs.generation;
            theirs.stamp_commit(generation, Utc::now());
            self.inner.commit(&snapshot.revision, &theirs).await?;
        }
        self.inner.commit(expected, document).await
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

fn add(id: &'static str) -> impl Fn(&mut RegistryDocument) -> Result<(), ValidationError> + Send + Sync {
    move |doc| {
        doc.insert_agent(AgentRecord::admit(AgentId::from(id), Specialization::Backend, Utc::now()));
        Ok(())
    }
}

fn seeded(ids: &[&str]) -> InMemoryDocumentStore {
    let now = Utc::now();
    let mut doc = RegistryDocument::new(RegistryConfig::default(), now);
    for id in ids {
        doc.insert_agent(AgentRecord::admit(AgentId::from(*id), Specialization::Backend, now));
    }
    InMemoryDocumentStore::with_document(doc)
}

#[tokio::test]
async fn test_idempotent_add() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let updater = RegistryUpdater::new(store.clone(), fast_policy(5), Duration::from_secs(1));

    let first = updater.apply("add", add("a")).await.unwrap();
    let second = updater.apply("add", add("a")).await.unwrap();
    assert!(first.committed);
    assert!(!second.committed);

    let doc = store.fetch().await.unwrap().document;
    assert_eq!(doc.agents.len(), 1);
    assert_eq!(doc.generation, 1);
}

#[tokio::test]
async fn test_concurrent_disjoint_adds_converge() {
    let store = Arc::new(YieldingStore {
        inner: InMemoryDocumentStore::new(),
    });
    let ids = ["n-0", "n-1", "n-2", "n-3", "n-4", "n-5"];

    let mut handles = Vec::new();
    for id in ids {
        let updater = RegistryUpdater::new(store.clone(), fast_policy(10), Duration::from_secs(1));
        handles.push(tokio::spawn(async move { updater.apply("add", add(id)).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().committed);
    }

    let doc = store.fetch().await.unwrap().document;
    for id in ids {
        assert!(doc.contains(&AgentId::from(id)), "missing {}", id);
    }
    assert_eq!(doc.agents.len(), ids.len());
    assert_eq!(doc.generation, ids.len() as u64);
    assert_eq!(doc.stats.active, ids.len());
}

#[tokio::test]
async fn test_two_callers_add_b_and_c_to_a() {
    let store = Arc::new(YieldingStore { inner: seeded(&["A"]) });
    let first = RegistryUpdater::new(store.clone(), fast_policy(5), Duration::from_secs(1));
    let second = RegistryUpdater::new(store.clone(), fast_policy(5), Duration::from_secs(1));

    let (b, c) = tokio::join!(first.apply("add", add("B")), second.apply("add", add("C")));
    b.unwrap();
    c.unwrap();

    let doc = store.fetch().await.unwrap().document;
    let ids: Vec<&str> = doc.agents.keys().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_exhausted_budget_raises_conflict_and_keeps_document() {
    let store = Arc::new(AlwaysConflictingStore {
        inner: seeded(&["A"]),
        commits: AtomicU32::new(0),
    });
    let bus = EventBus::with_default_capacity();
    let mut events = bus.subscribe();
    let updater = RegistryUpdater::new(store.clone(), fast_policy(4), Duration::from_secs(1)).with_event_bus(bus);

    let result = updater.apply("add", add("B")).await;
    match result {
        Err(UpdateError::Conflict(conflict)) => assert_eq!(conflict.attempts, 4),
        other => panic!("expected conflict, got {:?}", other.map(|o| o.committed)),
    }
    assert_eq!(store.commits.load(Ordering::SeqCst), 4);

    let doc = store.fetch().await.unwrap().document;
    assert!(!doc.contains(&AgentId::from("B")));
    assert!(matches!(
        events.try_recv(),
        Ok(RegistryEvent::UpdateConflictExhausted { attempts: 4, .. })
    ));
}

#[tokio::test]
async fn test_hung_commit_times_out_and_counts_as_attempt() {
    let store = Arc::new(HangingStore { inner: seeded(&[]) });
    let updater = RegistryUpdater::new(store, fast_policy(3), Duration::from_millis(20));

    let started = std::time::Instant::now();
    let result = updater.apply("add", add("B")).await;
    assert!(matches!(result, Err(UpdateError::Conflict(ref c)) if c.attempts == 3));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_timed_out_commit_that_landed_is_not_applied_twice() {
    let store = Arc::new(SilentCommitStore { inner: seeded(&["A"]) });
    let updater = RegistryUpdater::new(store.clone(), fast_policy(3), Duration::from_millis(20));

    let outcome = updater.apply("add", add("B")).await.unwrap();
    assert!(!outcome.committed);
    assert_eq!(outcome.attempts, 1);

    let doc = store.fetch().await.unwrap().document;
    assert_eq!(doc.agents.len(), 2);
    assert!(doc.contains(&AgentId::from("B")));
    assert_eq!(doc.generation, 1);
}

#[tokio::test]
async fn test_validation_failure_leaves_last_good_revision() {
    let store = Arc::new(seeded(&["A"]));
    let before = store.fetch().await.unwrap();
    let updater = RegistryUpdater::new(store.clone(), fast_policy(3), Duration::from_secs(1));

    let result = updater
        .apply("bad", |doc| {
            if let Some(a) = doc.get_mut(&AgentId::from("A")) {
                a.metrics.overall = 0.99;
            }
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(UpdateError::Validation(ValidationError::OverallMismatch { .. }))));

    let after = store.fetch().await.unwrap();
    assert_eq!(after.revision, before.revision);
}

#[tokio::test]
async fn test_disjoint_race_reapplies_mutation() {
    let interference: Mutation = Box::new(|doc| {
        doc.insert_agent(AgentRecord::admit(AgentId::from("theirs"), Specialization::Security, Utc::now()));
    });
    let store = Arc::new(InterferingStore::new(seeded(&["A"]), interference));
    let updater = RegistryUpdater::new(store.clone(), fast_policy(5), Duration::from_secs(1));

    let outcome = updater.apply("add", add("ours")).await.unwrap();
    assert_eq!(outcome.attempts, 2);

    let doc = store.fetch().await.unwrap().document;
    assert!(doc.contains(&AgentId::from("theirs")));
    assert!(doc.contains(&AgentId::from("ours")));
    assert_eq!(doc.generation, 2);
}

#[tokio::test]
async fn test_same_record_different_fields_merge() {
    let interference: Mutation = Box::new(|doc| {
        if let Some(a) = doc.get_mut(&AgentId::from("A")) {
            a.lineage.spawn_reason = Some("relabelled".to_string());
        }
    });
    let store = Arc::new(InterferingStore::new(seeded(&["A"]), interference));
    let updater = RegistryUpdater::new(store.clone(), fast_policy(5), Duration::from_secs(1));

    updater
        .apply("streak", |doc| {
            if let Some(a) = doc.get_mut(&AgentId::from("A")) {
                a.evaluation.elimination_streak = 1;
            }
            Ok(())
        })
        .await
        .unwrap();

    let doc = store.fetch().await.unwrap().document;
    let a = doc.get(&AgentId::from("A")).unwrap();
    assert_eq!(a.evaluation.elimination_streak, 1);
    assert_eq!(a.lineage.spawn_reason.as_deref(), Some("relabelled"));
}

#[tokio::test]
async fn test_same_field_conflict_retries_against_fresh_state() {
    let interference: Mutation = Box::new(|doc| {
        if let Some(a) = doc.get_mut(&AgentId::from("A")) {
            a.evaluation.elimination_streak = 5;
        }
    });
    let store = Arc::new(InterferingStore::new(seeded(&["A"]), interference));
    let updater = RegistryUpdater::new(store.clone(), fast_policy(5), Duration::from_secs(1));

    // Increment rather than overwrite, so the retry must observe their write.
    let outcome = updater
        .apply("streak", |doc| {
            if let Some(a) = doc.get_mut(&AgentId::from("A")) {
                a.evaluation.elimination_streak += 1;
            }
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);

    let doc = store.fetch().await.unwrap().document;
    assert_eq!(doc.get(&AgentId::from("A")).unwrap().evaluation.elimination_streak, 6);
}
