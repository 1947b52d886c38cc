// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Records
//!
//! The population entity tracked by the registry. An [`AgentRecord`] is created
//! only through admission (`AgentRecord::admit`, `AgentRecord::spawn_sub_agent`),
//! mutated by the scoring engine (metrics) and the lifecycle state machine
//! (status), and never deleted: eviction sets [`AgentStatus::Archived`].
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`AgentId`] | Opaque, immutable identifier (registry primary key) |
//! | [`Specialization`] | Role tag, fixed known set plus custom extension |
//! | [`AgentStatus`] | Lifecycle status (`active`, `hall_of_fame`, `archived`, `deactivated`) |
//! | [`Lineage`] | Parent link and sub-agent flag |
//! | [`EvaluationState`] | Hysteresis streaks for the lifecycle state machine |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::scoring::ScoreSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id of the form `<specialization>-<8 hex>`.
    pub fn generate(specialization: &Specialization) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", specialization.as_str(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Worker role. Serialized as a snake_case string so that unknown roles
/// round-trip through [`Specialization::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Specialization {
    Architect,
    Security,
    Performance,
    Testing,
    Documentation,
    Refactoring,
    Frontend,
    Backend,
    DevOps,
    Generalist,
    Custom(String),
}

impl Specialization {
    pub const KNOWN: [Specialization; 10] = [
        Specialization::Architect,
        Specialization::Security,
        Specialization::Performance,
        Specialization::Testing,
        Specialization::Documentation,
        Specialization::Refactoring,
        Specialization::Frontend,
        Specialization::Backend,
        Specialization::DevOps,
        Specialization::Generalist,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Specialization::Architect => "architect",
            Specialization::Security => "security",
            Specialization::Performance => "performance",
            Specialization::Testing => "testing",
            Specialization::Documentation => "documentation",
            Specialization::Refactoring => "refactoring",
            Specialization::Frontend => "frontend",
            Specialization::Backend => "backend",
            Specialization::DevOps => "devops",
            Specialization::Generalist => "generalist",
            Specialization::Custom(name) => name,
        }
    }

    /// Roles whose work overlaps closely enough for mentoring.
    ///
    /// The relation is symmetric and excludes identity.
    pub fn is_related_to(&self, other: &Specialization) -> bool {
        use Specialization::*;
        if self == other {
            return false;
        }
        let pair = |a: &Specialization, b: &Specialization| {
            matches!(
                (a, b),
                (Architect, Backend)
                    | (Architect, Refactoring)
                    | (Architect, Performance)
                    | (Security, Backend)
                    | (Security, DevOps)
                    | (Performance, Backend)
                    | (Performance, DevOps)
                    | (Testing, Refactoring)
                    | (Testing, Security)
                    | (Documentation, Frontend)
                    | (Documentation, Architect)
                    | (Frontend, Backend)
                    | (Refactoring, Backend)
            )
        };
        pair(self, other) || pair(other, self)
    }

    pub fn is_generalist(&self) -> bool {
        matches!(self, Specialization::Generalist)
    }
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid specialization '{0}': must be a non-empty lowercase slug")]
pub struct InvalidSpecialization(pub String);

impl FromStr for Specialization {
    type Err = InvalidSpecialization;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        if normalized.is_empty()
            || !normalized
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(InvalidSpecialization(s.to_string()));
        }
        let known = Specialization::KNOWN
            .iter()
            .find(|candidate| candidate.as_str() == normalized)
            .cloned();
        Ok(known.unwrap_or(Specialization::Custom(normalized)))
    }
}

impl Serialize for Specialization {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Specialization {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    HallOfFame,
    Archived,
    /// Sub-agents only.
    Deactivated,
}

impl AgentStatus {
    /// `hall_of_fame` and `archived` never transition again. `deactivated`
    /// is final for sub-agents as well.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::HallOfFame => "hall_of_fame",
            AgentStatus::Archived => "archived",
            AgentStatus::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Lineage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<AgentId>,
    #[serde(default)]
    pub is_sub_agent: bool,
    /// 0 for manually admitted agents, parent generation + 1 for spawned ones.
    #[serde(default)]
    pub generation: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_reason: Option<String>,
}

/// Consecutive evaluation cycles spent above the promotion threshold or below
/// the elimination threshold. `last_cycle` makes re-evaluation within the same
/// cycle a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EvaluationState {
    #[serde(default)]
    pub promotion_streak: u32,
    #[serde(default)]
    pub elimination_streak: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub specialization: Specialization,
    pub status: AgentStatus,
    #[serde(default)]
    pub metrics: ScoreSet,
    #[serde(default)]
    pub lineage: Lineage,
    #[serde(default)]
    pub evaluation: EvaluationState,
    pub spawned_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Manual admission of a regular (non sub-agent) worker.
    pub fn admit(id: AgentId, specialization: Specialization, now: DateTime<Utc>) -> Self {
        Self {
            id,
            specialization,
            status: AgentStatus::Active,
            metrics: ScoreSet::default(),
            lineage: Lineage::default(),
            evaluation: EvaluationState::default(),
            spawned_at: now,
            last_updated_at: now,
        }
    }

    /// Ephemeral worker spawned by the decision engine to relieve a workload spike.
    pub fn spawn_sub_agent(
        id: AgentId,
        specialization: Specialization,
        parent: Option<&AgentRecord>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::admit(id, specialization, now);
        record.lineage = Lineage {
            parent_id: parent.map(|p| p.id.clone()),
            is_sub_agent: true,
            generation: parent.map(|p| p.lineage.generation + 1).unwrap_or(1),
            spawn_reason: Some(reason.into()),
        };
        record
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    pub fn is_sub_agent(&self) -> bool {
        self.lineage.is_sub_agent
    }

    pub fn overall(&self) -> f64 {
        self.metrics.overall
    }

    /// Hours since the record last changed; the idle measure for cleanup.
    pub fn idle_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_updated_at).num_seconds().max(0) as f64 / 3600.0
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated_at {
            self.last_updated_at = now;
        }
    }
}
