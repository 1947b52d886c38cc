// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Activity Collector Adapters
//!
//! - [`CachedActivityCollector`] bounds call volume against the collaboration
//!   platform: counters are reused until they are older than `max_age`, and a
//!   failed refresh falls back to the cached value with a stale warning.
//! - [`JsonFileActivityCollector`] reads counters from an exported JSON file so
//!   cycles can be driven offline.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::agent::AgentId;
use crate::domain::repository::{ActivityCollector, ActivityError};
use crate::domain::scoring::ActivityCounters;
use crate::domain::workload::StaleSignalError;

#[derive(Debug, Clone, Copy)]
struct CachedActivity {
    counters: ActivityCounters,
    window_days: u32,
    fetched_at: DateTime<Utc>,
}

pub struct CachedActivityCollector {
    inner: Arc<dyn ActivityCollector>,
    max_age: Duration,
    cache: Mutex<HashMap<AgentId, CachedActivity>>,
}

impl CachedActivityCollector {
    pub fn new(inner: Arc<dyn ActivityCollector>, max_age: Duration) -> Self {
        Self {
            inner,
            max_age,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_hours(inner: Arc<dyn ActivityCollector>, max_age_hours: u32) -> Self {
        Self::new(inner, Duration::hours(i64::from(max_age_hours)))
    }

    /// Counters for `agent_id`, refetched only when the cached entry is stale.
    pub async fn get_at(
        &self,
        agent_id: &AgentId,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<ActivityCounters, ActivityError> {
        let cached = self.cache.lock().get(agent_id).copied();
        if let Some(entry) = cached {
            if entry.window_days == window_days && now - entry.fetched_at < self.max_age {
                debug!(agent_id = %agent_id, "Using cached activity");
                return Ok(entry.counters);
            }
        }

        match self.inner.get_activity(agent_id, window_days).await {
            Ok(counters) => {
                self.cache.lock().insert(
                    agent_id.clone(),
                    CachedActivity {
                        counters,
                        window_days,
                        fetched_at: now,
                    },
                );
                Ok(counters)
            }
            Err(e) => match cached {
                Some(entry) => {
                    let stale = StaleSignalError {
                        source_name: format!("activity[{}]", agent_id),
                        age_seconds: (now - entry.fetched_at).num_seconds(),
                        max_age_seconds: self.max_age.num_seconds(),
                        detail: e.to_string(),
                    };
                    warn!(agent_id = %agent_id, "{}; using cached activity", stale);
                    Ok(entry.counters)
                }
                None => Err(e),
            },
        }
    }

    pub fn invalidate(&self, agent_id: &AgentId) {
        self.cache.lock().remove(agent_id);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}

#[async_trait]
impl ActivityCollector for CachedActivityCollector {
    async fn get_activity(&self, agent_id: &AgentId, window_days: u32) -> Result<ActivityCounters, ActivityError> {
        self.get_at(agent_id, window_days, Utc::now()).await
    }
}

/// Exported activity file layout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActivityExport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_days: Option<u32>,
    #[serde(default)]
    pub agents: HashMap<AgentId, ActivityCounters>,
}

pub struct JsonFileActivityCollector {
    path: PathBuf,
}

impl JsonFileActivityCollector {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn load(&self) -> Result<ActivityExport, ActivityError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ActivityError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_slice(&bytes).map_err(|e| ActivityError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ActivityCollector for JsonFileActivityCollector {
    async fn get_activity(&self, agent_id: &AgentId, window_days: u32) -> Result<ActivityCounters, ActivityError> {
        let export = self.load().await?;
        if let Some(exported) = export.window_days.filter(|w| *w != window_days) {
            debug!(exported, requested = window_days, "Activity export covers a different window");
        }
        // Agents missing from the export had no activity in the window.
        Ok(export.agents.get(agent_id).copied().unwrap_or_default())
    }
}

/// Used when no source is configured. Every lookup fails, so the evaluator
/// keeps stored scores instead of zeroing them.
pub struct NoActivityCollector;

#[async_trait]
impl ActivityCollector for NoActivityCollector {
    async fn get_activity(&self, _agent_id: &AgentId, _window_days: u32) -> Result<ActivityCounters, ActivityError> {
        Err(ActivityError::Unavailable("no activity source configured".to_string()))
    }
}
