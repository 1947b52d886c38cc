// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workload and Health Signals
//!
//! Read-only inputs supplied by external collaborators: per-specialization
//! workload (open items, pending reviews, agents on duty) and the health of the
//! downstream systems a specialization integrates with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::agent::Specialization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckSeverity {
    #[default]
    None,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSignal {
    pub specialization: Specialization,
    pub open_items: u32,
    pub pending_reviews: u32,
    pub active_agents: u32,
    pub workload_per_agent: f64,
    #[serde(default)]
    pub bottleneck_severity: BottleneckSeverity,
    pub observed_at: DateTime<Utc>,
}

impl WorkloadSignal {
    /// Build a signal deriving `workload_per_agent` from the raw counts.
    pub fn from_counts(
        specialization: Specialization,
        open_items: u32,
        pending_reviews: u32,
        active_agents: u32,
        bottleneck_severity: BottleneckSeverity,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let workload_per_agent = (open_items + pending_reviews) as f64 / active_agents.max(1) as f64;
        Self {
            specialization,
            open_items,
            pending_reviews,
            active_agents,
            workload_per_agent,
            bottleneck_severity,
            observed_at,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.observed_at
    }
}

/// Severity per specialization; specializations absent from the signal set
/// are treated as [`BottleneckSeverity::None`].
pub fn severity_index(signals: &[WorkloadSignal]) -> HashMap<Specialization, BottleneckSeverity> {
    signals
        .iter()
        .map(|s| (s.specialization.clone(), s.bottleneck_severity))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    HalfOpen,
    Open,
}

/// Downstream health for one specialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSignal {
    /// SLA / error-rate derived health in [0,1].
    pub api_health: f64,
    #[serde(default)]
    pub breaker: CircuitState,
}

impl Default for HealthSignal {
    fn default() -> Self {
        Self {
            api_health: 1.0,
            breaker: CircuitState::Closed,
        }
    }
}

/// Collaborator data older than its max-age. Callers degrade to the cached
/// value and log this rather than failing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{source_name} data is stale: age {age_seconds}s exceeds max-age {max_age_seconds}s ({detail})")]
pub struct StaleSignalError {
    pub source_name: String,
    pub age_seconds: i64,
    pub max_age_seconds: i64,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_counts_derives_workload() {
        let signal = WorkloadSignal::from_counts(
            Specialization::Testing,
            12,
            6,
            2,
            BottleneckSeverity::High,
            Utc::now(),
        );
        assert!((signal.workload_per_agent - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_counts_with_no_agents() {
        let signal = WorkloadSignal::from_counts(
            Specialization::Security,
            4,
            0,
            0,
            BottleneckSeverity::Moderate,
            Utc::now(),
        );
        assert!((signal.workload_per_agent - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(BottleneckSeverity::Critical > BottleneckSeverity::High);
        assert!(BottleneckSeverity::Moderate > BottleneckSeverity::None);
    }
}
