// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Atomic Update Protocol
//!
//! The only write path into the registry document. Callers never hand over a
//! finished document; they hand over a *mutator* that is applied to whatever
//! the latest committed state turns out to be.
//!
//! ## Attempt cycle
//!
//! 1. Fetch the committed document and its [`Revision`].
//! 2. Apply the mutator to a copy. A mutator error aborts immediately.
//! 3. Skip the commit if nothing changed; otherwise validate the candidate.
//! 4. Commit conditioned on the revision, bounded by `commit_timeout`.
//! 5. On a lost race, re-fetch and compare the ids each writer touched:
//!    - disjoint: re-apply the mutator to the fresh document, commit again;
//!    - overlapping: [`three_way`] merge; a compatible result is committed,
//!      an incompatible one backs off and restarts from step 1.
//! 6. Timeouts and transient store errors back off and restart from step 1.
//!
//! Every commit attempt counts against `max_attempts`. When the budget is
//! spent the call fails with [`ConflictError`]; the mutation is never dropped
//! silently and the store keeps its last committed revision.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::retry::RetryPolicy;
use crate::domain::events::RegistryEvent;
use crate::domain::merge::{three_way, touched_ids, MergeOutcome};
use crate::domain::registry::{RegistryDocument, Revision, Snapshot};
use crate::domain::repository::{DocumentStore, StoreError};
use crate::domain::validation::ValidationError;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("Registry update conflict: retry budget exhausted after {attempts} attempts (contested: {})", .contested.join(", "))]
pub struct ConflictError {
    pub attempts: u32,
    pub contested: Vec<String>,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("Registry mutation rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("Registry store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The document as committed (or the unchanged current one).
    pub document: RegistryDocument,
    /// The committed state the mutation was applied on top of.
    pub base: RegistryDocument,
    pub revision: Revision,
    pub attempts: u32,
    /// False when the mutation produced no change.
    pub committed: bool,
}

pub struct RegistryUpdater {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    commit_timeout: Duration,
    event_bus: Option<EventBus>,
}

enum Candidate {
    /// Apply the mutator to the snapshot.
    Fresh,
    /// A merged document ready to commit on top of the snapshot.
    Merged(Box<RegistryDocument>),
}

impl RegistryUpdater {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy, commit_timeout: Duration) -> Self {
        Self {
            store,
            policy,
            commit_timeout,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read-only view of the committed document.
    pub async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        self.store.fetch().await
    }

    /// Apply `mutator` to the registry until it commits, merges, or the
    /// retry budget runs out. `operation` labels logs and metrics.
    ///
    /// `mutator` may run several times and must be idempotent: a commit that
    /// timed out can still have landed, and the retry applies the mutator
    /// again on top of that committed result.
    pub async fn apply<F>(&self, operation: &str, mutator: F) -> Result<UpdateOutcome, UpdateError>
    where
        F: Fn(&mut RegistryDocument) -> Result<(), ValidationError> + Send + Sync,
    {
        let mut attempts: u32 = 0;
        let mut contested: Vec<String> = Vec::new();
        let mut snapshot = self.store.fetch().await?;
        let mut candidate = Candidate::Fresh;

        loop {
            let merged = matches!(candidate, Candidate::Merged(_));
            let mut proposed = match std::mem::replace(&mut candidate, Candidate::Fresh) {
                Candidate::Merged(doc) => *doc,
                Candidate::Fresh => {
                    let mut doc = snapshot.document.clone();
                    mutator(&mut doc).inspect_err(|e| {
                        warn!(operation, error = %e, "Registry mutation rejected");
                    })?;
                    doc
                }
            };

            if proposed.same_content(&snapshot.document) {
                debug!(operation, attempts, "Registry mutation produced no change; skipping commit");
                return Ok(UpdateOutcome {
                    document: snapshot.document.clone(),
                    base: snapshot.document,
                    revision: snapshot.revision,
                    attempts,
                    committed: false,
                });
            }

            if let Err(e) = proposed.validate() {
                if !merged {
                    warn!(operation, error = %e, "Registry mutation produced an invalid document");
                    return Err(UpdateError::Validation(e));
                }
                // Merged result is invalid: fall back to a full retry.
                warn!(operation, error = %e, "Merged document invalid; retrying from fresh state");
                if !self.policy.should_retry(attempts.max(1)) {
                    return Err(self.exhausted(operation, attempts, contested));
                }
                self.backoff(operation, attempts.max(1)).await;
                snapshot = self.store.fetch().await?;
                continue;
            }

            proposed.stamp_commit(snapshot.document.generation, Utc::now());
            attempts += 1;
            debug!(
                operation,
                attempt = attempts,
                revision = %snapshot.revision,
                merged,
                "Committing registry update"
            );

            let result = tokio::time::timeout(
                self.commit_timeout,
                self.store.commit(&snapshot.revision, &proposed),
            )
            .await;

            match result {
                Ok(Ok(revision)) => {
                    metrics::counter!("colony_registry_commits_total", "operation" => operation.to_string())
                        .increment(1);
                    record_population(&proposed);
                    info!(
                        operation,
                        attempts,
                        generation = proposed.generation,
                        revision = %revision,
                        "Registry update committed"
                    );
                    return Ok(UpdateOutcome {
                        document: proposed,
                        base: snapshot.document,
                        revision,
                        attempts,
                        committed: true,
                    });
                }
                Ok(Err(StoreError::RevisionMismatch { expected, actual })) => {
                    metrics::counter!("colony_registry_conflicts_total", "operation" => operation.to_string())
                        .increment(1);
                    warn!(
                        operation,
                        attempt = attempts,
                        %expected,
                        %actual,
                        "Registry commit lost a race"
                    );
                    if !self.policy.should_retry(attempts) {
                        return Err(self.exhausted(operation, attempts, contested));
                    }

                    let fresh = self.store.fetch().await?;
                    let ours = touched_ids(&snapshot.document, &proposed);
                    let theirs = touched_ids(&snapshot.document, &fresh.document);
                    contested = ours.overlap(&theirs);

                    if contested.is_empty() {
                        debug!(operation, "Competing change is disjoint; re-applying mutation");
                        snapshot = fresh;
                        continue;
                    }

                    match three_way(&snapshot.document, &proposed, &fresh.document) {
                        MergeOutcome::Merged(doc) => {
                            debug!(operation, contested = ?contested, "Field-level merge succeeded");
                            candidate = Candidate::Merged(doc);
                            snapshot = fresh;
                        }
                        MergeOutcome::Incompatible(ids) => {
                            warn!(operation, contested = ?ids, "Incompatible concurrent change; backing off");
                            contested = ids;
                            self.backoff(operation, attempts).await;
                            snapshot = self.store.fetch().await?;
                        }
                    }
                }
                Ok(Err(e)) if e.is_transient() => {
                    warn!(operation, attempt = attempts, error = %e, "Store unavailable during commit");
                    if !self.policy.should_retry(attempts) {
                        return Err(self.exhausted(operation, attempts, contested));
                    }
                    self.backoff(operation, attempts).await;
                    snapshot = self.store.fetch().await?;
                }
                Ok(Err(e)) => {
                    error!(operation, attempt = attempts, error = %e, "Registry commit failed");
                    return Err(UpdateError::Store(e));
                }
                Err(_elapsed) => {
                    metrics::counter!("colony_registry_commit_timeouts_total", "operation" => operation.to_string())
                        .increment(1);
                    warn!(
                        operation,
                        attempt = attempts,
                        timeout_ms = self.commit_timeout.as_millis() as u64,
                        "Registry commit timed out"
                    );
                    if !self.policy.should_retry(attempts) {
                        return Err(self.exhausted(operation, attempts, contested));
                    }
                    self.backoff(operation, attempts).await;
                    snapshot = self.store.fetch().await?;
                }
            }
        }
    }

    async fn backoff(&self, operation: &str, attempt: u32) {
        let delay = self.policy.delay_for_attempt(attempt);
        debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "Backing off before retry");
        tokio::time::sleep(delay).await;
    }

    fn exhausted(&self, operation: &str, attempts: u32, contested: Vec<String>) -> UpdateError {
        metrics::counter!("colony_registry_conflict_exhausted_total", "operation" => operation.to_string())
            .increment(1);
        error!(
            operation,
            attempts,
            contested = ?contested,
            "Registry update retry budget exhausted"
        );
        if let Some(bus) = &self.event_bus {
            bus.publish(RegistryEvent::UpdateConflictExhausted {
                operation: operation.to_string(),
                attempts,
                contested: contested.clone(),
                failed_at: Utc::now(),
            });
        }
        UpdateError::Conflict(ConflictError { attempts, contested })
    }
}

fn record_population(document: &RegistryDocument) {
    let stats = &document.stats;
    for (status, count) in [
        ("active", stats.active),
        ("hall_of_fame", stats.hall_of_fame),
        ("archived", stats.archived),
        ("deactivated", stats.deactivated),
    ] {
        metrics::gauge!("colony_agents", "status" => status).set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentRecord, Specialization};
    use crate::infrastructure::store::InMemoryDocumentStore;

    fn updater(store: Arc<InMemoryDocumentStore>) -> RegistryUpdater {
        RegistryUpdater::new(
            store,
            RetryPolicy::default()
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5)),
            Duration::from_secs(1),
        )
    }

    fn add(id: &'static str) -> impl Fn(&mut RegistryDocument) -> Result<(), ValidationError> + Send + Sync {
        move |doc| {
            doc.insert_agent(AgentRecord::admit(AgentId::from(id), Specialization::Testing, Utc::now()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_apply_commits_and_bumps_generation() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let updater = updater(store.clone());

        let outcome = updater.apply("add", add("a")).await.unwrap();
        assert!(outcome.committed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.document.generation, 1);
        assert_eq!(outcome.document.stats.active, 1);
        assert!(outcome.base.agents.is_empty());
    }

    #[tokio::test]
    async fn test_no_change_skips_commit() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let updater = updater(store.clone());
        updater.apply("add", add("a")).await.unwrap();

        let again = updater.apply("add", add("a")).await.unwrap();
        assert!(!again.committed);
        assert_eq!(again.attempts, 0);
        assert_eq!(store.fetch().await.unwrap().document.generation, 1);
    }

    #[tokio::test]
    async fn test_mutator_rejection_leaves_store_untouched() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let updater = updater(store.clone());
        let before = store.fetch().await.unwrap();

        let result = updater
            .apply("reject", |_doc| Err(ValidationError::Rejected("nope".to_string())))
            .await;
        assert!(matches!(result, Err(UpdateError::Validation(_))));
        assert_eq!(store.fetch().await.unwrap().revision, before.revision);
    }

    #[tokio::test]
    async fn test_invalid_document_rejected_before_commit() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let updater = updater(store.clone());
        updater.apply("add", add("a")).await.unwrap();
        let before = store.fetch().await.unwrap();

        let result = updater
            .apply("overwrite-overall", |doc| {
                if let Some(record) = doc.get_mut(&AgentId::from("a")) {
                    record.metrics.overall = 0.99;
                }
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(UpdateError::Validation(ValidationError::OverallMismatch { .. }))
        ));
        assert_eq!(store.fetch().await.unwrap().revision, before.revision);
    }
}
