// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Registry Events
//!
//! Structured decision, promotion, eviction and mentorship events emitted by
//! the application services after a successful commit, for downstream
//! notification collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentId, Specialization};
use crate::domain::mentorship::{MentorshipId, MentorshipStatus};
use crate::domain::spawning::SpawnDecision;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    AgentAdmitted {
        agent_id: AgentId,
        specialization: Specialization,
        sub_agent: bool,
        parent_id: Option<AgentId>,
        reason: String,
        admitted_at: DateTime<Utc>,
    },
    AgentPromoted {
        agent_id: AgentId,
        specialization: Specialization,
        overall: f64,
        reason: String,
        promoted_at: DateTime<Utc>,
    },
    AgentEliminated {
        agent_id: AgentId,
        specialization: Specialization,
        overall: f64,
        reason: String,
        eliminated_at: DateTime<Utc>,
    },
    SubAgentDeactivated {
        agent_id: AgentId,
        specialization: Specialization,
        idle_hours: f64,
        reason: String,
        deactivated_at: DateTime<Utc>,
    },
    SpawnDecisionMade {
        decision: SpawnDecision,
    },
    MentorshipAssigned {
        mentorship_id: MentorshipId,
        mentor_id: AgentId,
        mentee_id: AgentId,
        match_score: f64,
        assigned_at: DateTime<Utc>,
    },
    MentorshipEvaluated {
        mentorship_id: MentorshipId,
        mentor_id: AgentId,
        mentee_id: AgentId,
        status: MentorshipStatus,
        improvement: f64,
        evaluated_at: DateTime<Utc>,
    },
    UpdateConflictExhausted {
        operation: String,
        attempts: u32,
        contested: Vec<String>,
        failed_at: DateTime<Utc>,
    },
}

impl RegistryEvent {
    /// Agents the event is about.
    pub fn agent_ids(&self) -> Vec<&AgentId> {
        match self {
            RegistryEvent::AgentAdmitted { agent_id, .. }
            | RegistryEvent::AgentPromoted { agent_id, .. }
            | RegistryEvent::AgentEliminated { agent_id, .. }
            | RegistryEvent::SubAgentDeactivated { agent_id, .. } => vec![agent_id],
            RegistryEvent::MentorshipAssigned {
                mentor_id, mentee_id, ..
            }
            | RegistryEvent::MentorshipEvaluated {
                mentor_id, mentee_id, ..
            } => vec![mentor_id, mentee_id],
            RegistryEvent::SpawnDecisionMade { .. } | RegistryEvent::UpdateConflictExhausted { .. } => {
                Vec::new()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::AgentAdmitted { .. } => "agent_admitted",
            RegistryEvent::AgentPromoted { .. } => "agent_promoted",
            RegistryEvent::AgentEliminated { .. } => "agent_eliminated",
            RegistryEvent::SubAgentDeactivated { .. } => "sub_agent_deactivated",
            RegistryEvent::SpawnDecisionMade { .. } => "spawn_decision_made",
            RegistryEvent::MentorshipAssigned { .. } => "mentorship_assigned",
            RegistryEvent::MentorshipEvaluated { .. } => "mentorship_evaluated",
            RegistryEvent::UpdateConflictExhausted { .. } => "update_conflict_exhausted",
        }
    }
}
