// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-side views of the registry for work-assignment and detail consumers.

use std::sync::Arc;
use thiserror::Error;

use crate::domain::agent::{AgentId, AgentRecord, Specialization};
use crate::domain::registry::RegistryStats;
use crate::domain::repository::{DocumentStore, StoreError};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Agent '{0}' not found")]
    NotFound(AgentId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RegistryQueryService {
    store: Arc<dyn DocumentStore>,
}

impl RegistryQueryService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Active agents, optionally of one specialization, ordered by id.
    pub async fn list_active(&self, specialization: Option<&Specialization>) -> Result<Vec<AgentRecord>, QueryError> {
        let snapshot = self.store.fetch().await?;
        Ok(snapshot
            .document
            .active_agents()
            .filter(|a| specialization.is_none_or(|s| &a.specialization == s))
            .cloned()
            .collect())
    }

    /// Every record regardless of status.
    pub async fn list_all(&self) -> Result<Vec<AgentRecord>, QueryError> {
        let snapshot = self.store.fetch().await?;
        Ok(snapshot.document.agents.into_values().collect())
    }

    pub async fn get_record(&self, id: &AgentId) -> Result<AgentRecord, QueryError> {
        let snapshot = self.store.fetch().await?;
        snapshot
            .document
            .get(id)
            .cloned()
            .ok_or_else(|| QueryError::NotFound(id.clone()))
    }

    /// Stats as of the last commit, recomputed so that a never-written
    /// registry reports correct zeros.
    pub async fn stats(&self) -> Result<RegistryStats, QueryError> {
        let mut document = self.store.fetch().await?.document;
        document.recompute_stats();
        Ok(document.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentStatus;
    use crate::domain::registry::{RegistryConfig, RegistryDocument};
    use crate::infrastructure::store::InMemoryDocumentStore;
    use chrono::Utc;

    fn service() -> RegistryQueryService {
        let now = Utc::now();
        let mut doc = RegistryDocument::new(RegistryConfig::default(), now);
        doc.insert_agent(AgentRecord::admit(AgentId::from("sec-1"), Specialization::Security, now));
        doc.insert_agent(AgentRecord::admit(AgentId::from("be-1"), Specialization::Backend, now));
        let mut archived = AgentRecord::admit(AgentId::from("be-2"), Specialization::Backend, now);
        archived.status = AgentStatus::Archived;
        doc.insert_agent(archived);
        RegistryQueryService::new(Arc::new(InMemoryDocumentStore::with_document(doc)))
    }

    #[tokio::test]
    async fn test_list_active_filters_status_and_specialization() {
        let service = service();
        assert_eq!(service.list_active(None).await.unwrap().len(), 2);
        let backend = service.list_active(Some(&Specialization::Backend)).await.unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend[0].id.as_str(), "be-1");
    }

    #[tokio::test]
    async fn test_get_record_not_found() {
        let service = service();
        assert!(service.get_record(&AgentId::from("be-2")).await.is_ok());
        assert!(matches!(
            service.get_record(&AgentId::from("ghost")).await,
            Err(QueryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats() {
        let stats = service().stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.archived, 1);
    }
}
