// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workload and Health Signal Adapters
//!
//! [`CachedSignalProvider`] polls an inner provider at most once per
//! `max_age` and degrades to the last good signal set when the provider
//! fails, logging a [`StaleSignalError`] instead of blocking the caller.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::agent::Specialization;
use crate::domain::repository::{HealthProvider, SignalError, WorkloadSignalProvider};
use crate::domain::workload::{HealthSignal, StaleSignalError, WorkloadSignal};

pub struct CachedSignalProvider {
    inner: Arc<dyn WorkloadSignalProvider>,
    max_age: Duration,
    cache: Mutex<Option<(Vec<WorkloadSignal>, DateTime<Utc>)>>,
}

impl CachedSignalProvider {
    pub fn new(inner: Arc<dyn WorkloadSignalProvider>, max_age: Duration) -> Self {
        Self {
            inner,
            max_age,
            cache: Mutex::new(None),
        }
    }

    pub fn from_seconds(inner: Arc<dyn WorkloadSignalProvider>, max_age_seconds: u64) -> Self {
        Self::new(inner, Duration::seconds(max_age_seconds as i64))
    }

    pub async fn get_at(&self, now: DateTime<Utc>) -> Result<Vec<WorkloadSignal>, SignalError> {
        let cached = self.cache.lock().clone();
        if let Some((signals, fetched_at)) = &cached {
            if now - *fetched_at < self.max_age {
                debug!(count = signals.len(), "Using cached workload signals");
                return Ok(signals.clone());
            }
        }

        match self.inner.get_signals().await {
            Ok(signals) => {
                self.warn_if_outdated(&signals, now);
                *self.cache.lock() = Some((signals.clone(), now));
                Ok(signals)
            }
            Err(e) => match cached {
                Some((signals, fetched_at)) => {
                    let stale = StaleSignalError {
                        source_name: "workload".to_string(),
                        age_seconds: (now - fetched_at).num_seconds(),
                        max_age_seconds: self.max_age.num_seconds(),
                        detail: e.to_string(),
                    };
                    warn!("{}; using cached signals", stale);
                    Ok(signals)
                }
                None => Err(e),
            },
        }
    }

    fn warn_if_outdated(&self, signals: &[WorkloadSignal], now: DateTime<Utc>) {
        for signal in signals.iter().filter(|s| s.age(now) > self.max_age) {
            let stale = StaleSignalError {
                source_name: format!("workload[{}]", signal.specialization),
                age_seconds: signal.age(now).num_seconds(),
                max_age_seconds: self.max_age.num_seconds(),
                detail: "provider returned an old observation".to_string(),
            };
            warn!("{}", stale);
        }
    }
}

#[async_trait]
impl WorkloadSignalProvider for CachedSignalProvider {
    async fn get_signals(&self) -> Result<Vec<WorkloadSignal>, SignalError> {
        self.get_at(Utc::now()).await
    }
}

/// Fixed health map; specializations not listed are healthy.
#[derive(Debug, Clone, Default)]
pub struct StaticHealthProvider {
    health: HashMap<Specialization, HealthSignal>,
}

impl StaticHealthProvider {
    pub fn new(health: HashMap<Specialization, HealthSignal>) -> Self {
        Self { health }
    }
}

#[async_trait]
impl HealthProvider for StaticHealthProvider {
    async fn get_health(&self) -> Result<HashMap<Specialization, HealthSignal>, SignalError> {
        Ok(self.health.clone())
    }
}

/// Exported signal file layout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SignalExport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub workload: Vec<WorkloadSignal>,
    #[serde(default)]
    pub health: HashMap<Specialization, HealthSignal>,
}

/// Reads workload and health from one JSON export.
pub struct JsonFileSignalProvider {
    path: PathBuf,
}

impl JsonFileSignalProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn load(&self) -> Result<SignalExport, SignalError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SignalError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_slice(&bytes).map_err(|e| SignalError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl WorkloadSignalProvider for JsonFileSignalProvider {
    async fn get_signals(&self) -> Result<Vec<WorkloadSignal>, SignalError> {
        Ok(self.load().await?.workload)
    }
}

#[async_trait]
impl HealthProvider for JsonFileSignalProvider {
    async fn get_health(&self) -> Result<HashMap<Specialization, HealthSignal>, SignalError> {
        Ok(self.load().await?.health)
    }
}

/// Provider with no workload, used when no source is configured.
pub struct NoSignalProvider;

#[async_trait]
impl WorkloadSignalProvider for NoSignalProvider {
    async fn get_signals(&self) -> Result<Vec<WorkloadSignal>, SignalError> {
        Ok(Vec::new())
    }
}
