// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Document Validation Errors
//!
//! Raised by mutators that reject a proposed change and by
//! [`RegistryDocument::validate`](crate::domain::registry::RegistryDocument::validate)
//! when a candidate document breaks an invariant. A validation failure is
//! detected before any commit, so the store keeps its last valid revision.

use thiserror::Error;

use crate::domain::agent::AgentId;
use crate::domain::mentorship::MentorshipId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Agent map key '{key}' does not match record id '{id}'")]
    KeyMismatch { key: AgentId, id: AgentId },

    #[error("Agent '{agent}' has {field} = {value}, outside [0,1]")]
    ScoreOutOfRange {
        agent: AgentId,
        field: &'static str,
        value: f64,
    },

    #[error("Agent '{agent}' overall {stored:.6} differs from weighted sub-scores {expected:.6}")]
    OverallMismatch {
        agent: AgentId,
        stored: f64,
        expected: f64,
    },

    #[error("Agent '{0}' not found")]
    UnknownAgent(AgentId),

    #[error("Agent '{0}' already exists")]
    DuplicateAgent(AgentId),

    #[error("Duplicate mentorship id '{0}'")]
    DuplicateMentorship(MentorshipId),

    #[error("Mentorship '{mentorship}' references unknown agent '{agent}'")]
    DanglingReference { mentorship: MentorshipId, agent: AgentId },

    #[error("Mentorship '{0}' pairs an agent with itself")]
    SelfMentorship(MentorshipId),

    #[error("Mentee '{0}' has more than one active mentorship")]
    MenteeDoubleBooked(AgentId),

    #[error("Mentor '{mentor}' has {active} active mentorships, capacity is {capacity}")]
    MentorOverCapacity {
        mentor: AgentId,
        active: usize,
        capacity: u32,
    },

    #[error("Invalid registry config: {0}")]
    InvalidConfig(String),

    #[error("Mutation rejected: {0}")]
    Rejected(String),
}
