// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Registry Document (Aggregate Root)
//!
//! The single shared population record: every agent, every mentorship, the
//! configuration all components read, and derived statistics. The document
//! is only ever changed by applying a mutator through
//! [`RegistryUpdater`](crate::application::registry_update::RegistryUpdater);
//! stores hand out [`Snapshot`]s and accept conditional commits keyed on a
//! [`Revision`].
//!
//! ## Persisted layout
//! ```yaml
//! schema_version: 1
//! generation: 42
//! agents: { "<id>": AgentRecord, ... }
//! mentorships: [ MentorshipRecord, ... ]
//! config: { lifecycle, scoring, spawning, mentorship }
//! stats: { total, active, hall_of_fame, archived, deactivated, ... }
//! spawn_ledger: { "<specialization>": <last admit time> }
//! updated_at: <timestamp>
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::domain::agent::{AgentId, AgentRecord, AgentStatus, Specialization};
use crate::domain::lifecycle::LifecycleThresholds;
use crate::domain::mentorship::{MentorshipPolicy, MentorshipRecord, MentorshipStatus};
use crate::domain::scoring::{self, ScoringConfig};
use crate::domain::spawning::SpawnPolicy;
use crate::domain::validation::ValidationError;

pub const SCHEMA_VERSION: u32 = 1;

const OVERALL_TOLERANCE: f64 = 1e-6;

/// Thresholds, weights and capacities shared by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub lifecycle: LifecycleThresholds,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub spawning: SpawnPolicy,
    #[serde(default)]
    pub mentorship: MentorshipPolicy,
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.lifecycle.validate().map_err(ValidationError::InvalidConfig)?;
        self.scoring.weights.validate().map_err(ValidationError::InvalidConfig)?;
        self.spawning.validate().map_err(ValidationError::InvalidConfig)?;
        self.mentorship.validate().map_err(ValidationError::InvalidConfig)?;
        Ok(())
    }
}

/// Derived counts, recomputed on every commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub hall_of_fame: usize,
    pub archived: usize,
    pub deactivated: usize,
    /// Active sub-agents.
    pub sub_agents: usize,
    pub active_mentorships: usize,
    pub completed_mentorships: usize,
    pub failed_mentorships: usize,
    /// Active agents per specialization.
    #[serde(default)]
    pub by_specialization: BTreeMap<String, usize>,
}

impl RegistryStats {
    pub fn count(&self, status: AgentStatus) -> usize {
        match status {
            AgentStatus::Active => self.active,
            AgentStatus::HallOfFame => self.hall_of_fame,
            AgentStatus::Archived => self.archived,
            AgentStatus::Deactivated => self.deactivated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub schema_version: u32,
    /// Incremented on every commit.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub agents: BTreeMap<AgentId, AgentRecord>,
    #[serde(default)]
    pub mentorships: Vec<MentorshipRecord>,
    #[serde(default)]
    pub config: RegistryConfig,
    #[serde(default)]
    pub stats: RegistryStats,
    /// Last admit time per specialization, shared cooldown state.
    #[serde(default)]
    pub spawn_ledger: BTreeMap<Specialization, DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        Self::new(RegistryConfig::default(), Utc::now())
    }
}

impl RegistryDocument {
    pub fn new(config: RegistryConfig, now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generation: 0,
            agents: BTreeMap::new(),
            mentorships: Vec::new(),
            config,
            stats: RegistryStats::default(),
            spawn_ledger: BTreeMap::new(),
            updated_at: now,
        }
    }

    pub fn get(&self, id: &AgentId) -> Option<&AgentRecord> {
        self.agents.get(id)
    }

    pub fn get_mut(&mut self, id: &AgentId) -> Option<&mut AgentRecord> {
        self.agents.get_mut(id)
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    /// Add a record unless its id is already present. Returns whether the
    /// record was inserted; an existing record is left untouched.
    pub fn insert_agent(&mut self, record: AgentRecord) -> bool {
        if self.agents.contains_key(&record.id) {
            return false;
        }
        self.agents.insert(record.id.clone(), record);
        true
    }

    pub fn active_agents(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values().filter(|a| a.is_active())
    }

    pub fn active_count(&self, specialization: &Specialization) -> u32 {
        self.active_agents()
            .filter(|a| &a.specialization == specialization)
            .count() as u32
    }

    pub fn active_counts(&self) -> HashMap<Specialization, u32> {
        let mut counts = HashMap::new();
        for agent in self.active_agents() {
            *counts.entry(agent.specialization.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn active_mentorships_for(&self, mentor: &AgentId) -> usize {
        self.mentorships
            .iter()
            .filter(|m| m.is_active() && &m.mentor_id == mentor)
            .count()
    }

    pub fn has_active_mentorship_as_mentee(&self, mentee: &AgentId) -> bool {
        self.mentorships
            .iter()
            .any(|m| m.is_active() && &m.mentee_id == mentee)
    }

    pub fn recompute_stats(&mut self) {
        let mut stats = RegistryStats {
            total: self.agents.len(),
            ..Default::default()
        };
        for agent in self.agents.values() {
            match agent.status {
                AgentStatus::Active => {
                    stats.active += 1;
                    if agent.is_sub_agent() {
                        stats.sub_agents += 1;
                    }
                    *stats
                        .by_specialization
                        .entry(agent.specialization.to_string())
                        .or_insert(0) += 1;
                }
                AgentStatus::HallOfFame => stats.hall_of_fame += 1,
                AgentStatus::Archived => stats.archived += 1,
                AgentStatus::Deactivated => stats.deactivated += 1,
            }
        }
        for mentorship in &self.mentorships {
            match mentorship.status {
                MentorshipStatus::Active => stats.active_mentorships += 1,
                MentorshipStatus::Completed => stats.completed_mentorships += 1,
                MentorshipStatus::Failed => stats.failed_mentorships += 1,
            }
        }
        self.stats = stats;
    }

    /// Bookkeeping applied to a candidate right before it is committed on
    /// top of a document at `previous_generation`.
    pub fn stamp_commit(&mut self, previous_generation: u64, now: DateTime<Utc>) {
        self.schema_version = SCHEMA_VERSION;
        self.generation = previous_generation + 1;
        self.updated_at = now;
        self.recompute_stats();
    }

    /// Equality of the persisted content, ignoring commit bookkeeping
    /// (`generation`, `updated_at`, `stats`).
    pub fn same_content(&self, other: &RegistryDocument) -> bool {
        self.agents == other.agents
            && self.mentorships == other.mentorships
            && self.config == other.config
            && self.spawn_ledger == other.spawn_ledger
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.config.validate()?;
        let weights = &self.config.scoring.weights;

        for (key, record) in &self.agents {
            if key != &record.id {
                return Err(ValidationError::KeyMismatch {
                    key: key.clone(),
                    id: record.id.clone(),
                });
            }
            let metrics = &record.metrics;
            let fields = [
                ("throughput", metrics.throughput),
                ("resolution_rate", metrics.resolution_rate),
                ("acceptance_rate", metrics.acceptance_rate),
                ("peer_feedback", metrics.peer_feedback),
                ("novelty", metrics.novelty),
                ("overall", metrics.overall),
            ];
            for (field, value) in fields {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ValidationError::ScoreOutOfRange {
                        agent: record.id.clone(),
                        field,
                        value,
                    });
                }
            }
            let expected = scoring::overall(weights, metrics);
            if (expected - metrics.overall).abs() > OVERALL_TOLERANCE {
                return Err(ValidationError::OverallMismatch {
                    agent: record.id.clone(),
                    stored: metrics.overall,
                    expected,
                });
            }
        }

        let mut seen = HashSet::new();
        let mut load: HashMap<&AgentId, usize> = HashMap::new();
        let mut mentees = HashSet::new();
        for mentorship in &self.mentorships {
            if !seen.insert(&mentorship.mentorship_id) {
                return Err(ValidationError::DuplicateMentorship(
                    mentorship.mentorship_id.clone(),
                ));
            }
            for agent in [&mentorship.mentor_id, &mentorship.mentee_id] {
                if !self.agents.contains_key(agent) {
                    return Err(ValidationError::DanglingReference {
                        mentorship: mentorship.mentorship_id.clone(),
                        agent: agent.clone(),
                    });
                }
            }
            if mentorship.mentor_id == mentorship.mentee_id {
                return Err(ValidationError::SelfMentorship(
                    mentorship.mentorship_id.clone(),
                ));
            }
            if mentorship.is_active() {
                *load.entry(&mentorship.mentor_id).or_insert(0) += 1;
                if !mentees.insert(&mentorship.mentee_id) {
                    return Err(ValidationError::MenteeDoubleBooked(mentorship.mentee_id.clone()));
                }
            }
        }

        let capacity = self.config.mentorship.capacity;
        if let Some((mentor, active)) = load.into_iter().find(|(_, n)| *n > capacity as usize) {
            return Err(ValidationError::MentorOverCapacity {
                mentor: mentor.clone(),
                active,
                capacity,
            });
        }

        Ok(())
    }
}

/// Opaque revision marker used for conditional commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    /// Revision of a store that has never been written.
    pub fn absent() -> Self {
        Self("absent".to_string())
    }

    pub fn counter(value: u64) -> Self {
        Self(format!("r{}", value))
    }

    /// SHA-256 of the serialized document.
    pub fn content_hash(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A committed document and the revision it was read at.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub document: RegistryDocument,
    pub revision: Revision,
}
