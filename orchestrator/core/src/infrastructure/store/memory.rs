// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::registry::{RegistryConfig, RegistryDocument, Revision, Snapshot};
use crate::domain::repository::{DocumentStore, StoreError};

struct Versioned {
    document: RegistryDocument,
    counter: u64,
}

/// Process-local store for development and tests.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Versioned>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_document(RegistryDocument::new(RegistryConfig::default(), chrono::Utc::now()))
    }

    pub fn with_document(document: RegistryDocument) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Versioned { document, counter: 0 })),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        let inner = self.inner.read().await;
        Ok(Snapshot {
            document: inner.document.clone(),
            revision: Revision::counter(inner.counter),
        })
    }

    async fn commit(&self, expected: &Revision, document: &RegistryDocument) -> Result<Revision, StoreError> {
        let mut inner = self.inner.write().await;
        let current = Revision::counter(inner.counter);
        if &current != expected {
            return Err(StoreError::RevisionMismatch {
                expected: expected.clone(),
                actual: current,
            });
        }
        inner.counter += 1;
        inner.document = document.clone();
        Ok(Revision::counter(inner.counter))
    }
}
