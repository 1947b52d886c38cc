// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mentorship Records
//!
//! Pairings between a `hall_of_fame` mentor and an under-performing mentee.
//! Matching lives in `colony-swarm`; the record and its policy live here
//! because both are part of the registry document.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::agent::AgentId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MentorshipId(pub String);

impl MentorshipId {
    pub fn new() -> Self {
        Self(format!("mentorship-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MentorshipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MentorshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentorshipStatus {
    Active,
    Completed,
    Failed,
}

impl MentorshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MentorshipStatus::Active => "active",
            MentorshipStatus::Completed => "completed",
            MentorshipStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentorshipRecord {
    pub mentorship_id: MentorshipId,
    pub mentor_id: AgentId,
    pub mentee_id: AgentId,
    pub assigned_at: DateTime<Utc>,
    pub status: MentorshipStatus,
    pub match_score: f64,
    /// Mentee overall score at assignment.
    pub baseline_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl MentorshipRecord {
    pub fn assign(
        mentor_id: AgentId,
        mentee_id: AgentId,
        match_score: f64,
        baseline_score: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            mentorship_id: MentorshipId::new(),
            mentor_id,
            mentee_id,
            assigned_at: now,
            status: MentorshipStatus::Active,
            match_score: match_score.clamp(0.0, 1.0),
            baseline_score,
            final_score: None,
            evaluated_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MentorshipStatus::Active
    }

    /// `final_score - baseline_score` once evaluated.
    pub fn improvement(&self) -> Option<f64> {
        self.final_score.map(|f| f - self.baseline_score)
    }

    pub fn is_due(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.is_active() && now - self.assigned_at >= window
    }

    pub fn involves(&self, id: &AgentId) -> bool {
        &self.mentor_id == id || &self.mentee_id == id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentorshipPolicy {
    /// Concurrent active mentorships per mentor.
    pub capacity: u32,
    pub min_match_score: f64,
    pub evaluation_window_days: u32,
    /// Minimum improvement (absolute overall points) for success.
    pub success_threshold: f64,
    /// Mentees must score below this to be considered for mentoring.
    pub mentee_score_ceiling: f64,
}

impl Default for MentorshipPolicy {
    fn default() -> Self {
        Self {
            capacity: 3,
            min_match_score: 0.5,
            evaluation_window_days: 14,
            success_threshold: 0.15,
            mentee_score_ceiling: 0.6,
        }
    }
}

impl MentorshipPolicy {
    pub fn evaluation_window(&self) -> Duration {
        Duration::days(i64::from(self.evaluation_window_days))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("mentorship capacity must be at least 1".to_string());
        }
        for (name, value) in [
            ("min_match_score", self.min_match_score),
            ("success_threshold", self.success_threshold),
            ("mentee_score_ceiling", self.mentee_score_ceiling),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0,1], got {}", name, value));
            }
        }
        Ok(())
    }
}
