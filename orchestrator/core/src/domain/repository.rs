// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Ports
//!
//! Contracts the control plane depends on, implemented in
//! `crate::infrastructure`.
//!
//! | Trait | Role | Implementations |
//! |-------|------|----------------|
//! | [`DocumentStore`] | Holder of the registry document, conditional commit | `InMemoryDocumentStore`, `FileDocumentStore` |
//! | [`ActivityCollector`] | Raw per-agent activity counters | `JsonFileActivityCollector`, `CachedActivityCollector` |
//! | [`WorkloadSignalProvider`] | Per-specialization workload | `JsonFileSignalProvider`, `CachedSignalProvider` |
//! | [`HealthProvider`] | Downstream API health and breaker state | `StaticHealthProvider`, `JsonFileSignalProvider` |

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::agent::{AgentId, Specialization};
use crate::domain::registry::{RegistryDocument, Revision, Snapshot};
use crate::domain::scoring::ActivityCounters;
use crate::domain::workload::{HealthSignal, WorkloadSignal};

/// Optimistic-concurrency document store.
///
/// `commit` must be atomic: either the whole document becomes the new
/// committed state or nothing changes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Current committed document and its revision.
    async fn fetch(&self) -> Result<Snapshot, StoreError>;

    /// Replace the document if the committed revision still equals
    /// `expected`; otherwise fail with [`StoreError::RevisionMismatch`].
    async fn commit(&self, expected: &Revision, document: &RegistryDocument) -> Result<Revision, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Revision mismatch: expected {expected}, found {actual}")]
    RevisionMismatch { expected: Revision, actual: Revision },

    #[error("Store temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[async_trait]
pub trait ActivityCollector: Send + Sync {
    async fn get_activity(&self, agent_id: &AgentId, window_days: u32) -> Result<ActivityCounters, ActivityError>;
}

#[derive(Debug, Clone, Error)]
pub enum ActivityError {
    #[error("Activity source unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Malformed activity data: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait WorkloadSignalProvider: Send + Sync {
    async fn get_signals(&self) -> Result<Vec<WorkloadSignal>, SignalError>;
}

#[async_trait]
pub trait HealthProvider: Send + Sync {
    async fn get_health(&self) -> Result<HashMap<Specialization, HealthSignal>, SignalError>;
}

#[derive(Debug, Clone, Error)]
pub enum SignalError {
    #[error("Signal source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed signal data: {0}")]
    Malformed(String),
}
