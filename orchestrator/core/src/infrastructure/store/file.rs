// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON File Document Store
//!
//! Persists the registry document as pretty-printed JSON. The revision is the
//! SHA-256 of the file bytes, so any writer (including another process that
//! rewrites the file) invalidates outstanding snapshots.
//!
//! **Limitations:**
//! - The compare-and-write is serialised by an in-process async mutex only;
//!   separate processes sharing one file rely on the revision check plus the
//!   rename being atomic, which leaves a small window between the check and
//!   the rename.
//! - No history; the previous revision is overwritten.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::registry::{RegistryConfig, RegistryDocument, Revision, Snapshot};
use crate::domain::repository::{DocumentStore, StoreError};

#[derive(Clone)]
pub struct FileDocumentStore {
    path: PathBuf,
    /// Config block of the empty document served while the file is absent.
    seed: RegistryConfig,
    write_lock: Arc<Mutex<()>>,
}

impl FileDocumentStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_seed(path, RegistryConfig::default())
    }

    pub fn with_seed(path: impl AsRef<Path>, seed: RegistryConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            seed,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    async fn read(&self) -> Result<Snapshot, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let document: RegistryDocument = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialization(format!("{}: {}", self.path.display(), e)))?;
                Ok(Snapshot {
                    document,
                    revision: Revision::content_hash(&bytes),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot {
                document: RegistryDocument::new(self.seed.clone(), Utc::now()),
                revision: Revision::absent(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn current_revision(&self) -> Result<Revision, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Revision::content_hash(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Revision::absent()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn fetch(&self) -> Result<Snapshot, StoreError> {
        self.read().await
    }

    async fn commit(&self, expected: &Revision, document: &RegistryDocument) -> Result<Revision, StoreError> {
        let _guard = self.write_lock.lock().await;

        let actual = self.current_revision().await?;
        if &actual != expected {
            return Err(StoreError::RevisionMismatch {
                expected: expected.clone(),
                actual,
            });
        }

        let bytes = serde_json::to_vec_pretty(document).map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        let revision = Revision::content_hash(&bytes);
        debug!(path = %self.path.display(), revision = %revision, "Registry document written");
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentId, AgentRecord, Specialization};

    #[tokio::test]
    async fn test_absent_file_reads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDocumentStore::new(dir.path().join("registry.json"));
        let snapshot = store.fetch().await.unwrap();
        assert!(snapshot.document.agents.is_empty());
        assert_eq!(snapshot.revision, Revision::absent());
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn test_absent_file_uses_seed_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut seed = RegistryConfig::default();
        seed.lifecycle.elimination_cycles = 4;
        let store = FileDocumentStore::with_seed(dir.path().join("registry.json"), seed);
        let snapshot = store.fetch().await.unwrap();
        assert_eq!(snapshot.document.config.lifecycle.elimination_cycles, 4);
    }

    #[tokio::test]
    async fn test_commit_persists_and_detects_stale_revision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.json");
        let store = FileDocumentStore::new(&path);

        let snapshot = store.fetch().await.unwrap();
        let mut doc = snapshot.document.clone();
        doc.insert_agent(AgentRecord::admit(AgentId::from("a"), Specialization::Security, Utc::now()));
        let revision = store.commit(&snapshot.revision, &doc).await.unwrap();

        let reopened = FileDocumentStore::new(&path);
        let fresh = reopened.fetch().await.unwrap();
        assert_eq!(fresh.revision, revision);
        assert!(fresh.document.contains(&AgentId::from("a")));

        let stale = store.commit(&snapshot.revision, &doc).await;
        assert!(matches!(stale, Err(StoreError::RevisionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = FileDocumentStore::new(&path);
        assert!(matches!(store.fetch().await, Err(StoreError::Serialization(_))));
    }
}
