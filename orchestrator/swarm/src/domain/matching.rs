// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Mentor Matching
//!
//! Pairs an under-performing mentee with a `hall_of_fame` mentor that still
//! has capacity, and judges the pairing once its evaluation window closes.
//!
//! - [`MentorMatcher::score`]: weighted fit of one mentor for one mentee.
//! - [`MentorMatcher::assign`]: best eligible mentor, or a [`NoMatchReason`].
//! - [`MentorMatcher::evaluate_mentorship`]: completed/failed verdict.
//!
//! A missing match is an outcome, not an error: callers get
//! [`MatchOutcome::NoMatch`] with the reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use colony_core::domain::agent::{AgentRecord, AgentStatus, Specialization};
use colony_core::domain::mentorship::{MentorshipPolicy, MentorshipRecord, MentorshipStatus};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub specialization: f64,
    pub performance: f64,
    pub capacity: f64,
    pub compatibility: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            specialization: 0.40,
            performance: 0.30,
            capacity: 0.20,
            compatibility: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub total: f64,
    pub specialization: f64,
    pub performance: f64,
    pub capacity: f64,
    pub compatibility: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoMatchReason {
    MenteeIneligible(String),
    /// No `hall_of_fame` agent exists to mentor.
    NoEligibleMentors,
    /// Mentors exist but all are at capacity.
    CapacityExceeded { mentors: usize, capacity: u32 },
    BelowMinimumScore { best: f64, minimum: f64 },
}

impl std::fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoMatchReason::MenteeIneligible(why) => write!(f, "mentee ineligible: {}", why),
            NoMatchReason::NoEligibleMentors => f.write_str("no hall_of_fame mentors"),
            NoMatchReason::CapacityExceeded { mentors, capacity } => {
                write!(f, "all {} mentor(s) at capacity {}", mentors, capacity)
            }
            NoMatchReason::BelowMinimumScore { best, minimum } => {
                write!(f, "best match {:.3} below minimum {:.2}", best, minimum)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Assigned(MentorshipRecord),
    NoMatch(NoMatchReason),
}

impl MatchOutcome {
    pub fn assigned(&self) -> Option<&MentorshipRecord> {
        match self {
            MatchOutcome::Assigned(record) => Some(record),
            MatchOutcome::NoMatch(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MentorMatcher {
    policy: MentorshipPolicy,
    weights: MatchWeights,
}

impl MentorMatcher {
    pub fn new(policy: MentorshipPolicy) -> Self {
        Self {
            policy,
            weights: MatchWeights::default(),
        }
    }

    pub fn policy(&self) -> &MentorshipPolicy {
        &self.policy
    }

    /// Fit of `mentor` for `mentee`, given the mentor's current active load
    /// and the pairing history.
    pub fn score(
        &self,
        mentee: &AgentRecord,
        mentor: &AgentRecord,
        load: usize,
        history: &[MentorshipRecord],
    ) -> MatchScore {
        let specialization = specialization_fit(&mentee.specialization, &mentor.specialization);
        let performance = mentor.overall().clamp(0.0, 1.0);
        let capacity = if self.policy.capacity == 0 {
            0.0
        } else {
            (1.0 - load as f64 / f64::from(self.policy.capacity)).clamp(0.0, 1.0)
        };
        let compatibility = compatibility(mentee, mentor, history);

        let w = &self.weights;
        MatchScore {
            total: w.specialization * specialization
                + w.performance * performance
                + w.capacity * capacity
                + w.compatibility * compatibility,
            specialization,
            performance,
            capacity,
            compatibility,
        }
    }

    /// Pick a mentor for `mentee` from `pool`. `mentorships` is the current
    /// registry list and supplies both mentor load and pairing history.
    pub fn assign(
        &self,
        mentee: &AgentRecord,
        pool: &[AgentRecord],
        mentorships: &[MentorshipRecord],
        now: DateTime<Utc>,
    ) -> MatchOutcome {
        if let Err(why) = self.check_mentee(mentee, mentorships) {
            return MatchOutcome::NoMatch(NoMatchReason::MenteeIneligible(why));
        }

        let mentors: Vec<&AgentRecord> = pool
            .iter()
            .filter(|a| a.status == AgentStatus::HallOfFame && a.id != mentee.id)
            .collect();
        if mentors.is_empty() {
            return MatchOutcome::NoMatch(NoMatchReason::NoEligibleMentors);
        }

        let capacity = self.policy.capacity as usize;
        let available: Vec<(&AgentRecord, usize)> = mentors
            .iter()
            .map(|m| (*m, active_load(m, mentorships)))
            .filter(|(_, load)| *load < capacity)
            .collect();
        if available.is_empty() {
            return MatchOutcome::NoMatch(NoMatchReason::CapacityExceeded {
                mentors: mentors.len(),
                capacity: self.policy.capacity,
            });
        }

        let best = available
            .into_iter()
            .map(|(mentor, load)| (mentor, load, self.score(mentee, mentor, load, mentorships)))
            .min_by(|a, b| {
                b.2.total
                    .total_cmp(&a.2.total)
                    .then(a.1.cmp(&b.1))
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });

        match best {
            Some((mentor, _, score)) if score.total >= self.policy.min_match_score => {
                MatchOutcome::Assigned(MentorshipRecord::assign(
                    mentor.id.clone(),
                    mentee.id.clone(),
                    score.total,
                    mentee.overall(),
                    now,
                ))
            }
            Some((_, _, score)) => MatchOutcome::NoMatch(NoMatchReason::BelowMinimumScore {
                best: score.total,
                minimum: self.policy.min_match_score,
            }),
            None => MatchOutcome::NoMatch(NoMatchReason::NoEligibleMentors),
        }
    }

    /// Close `record` once its window has passed. Returns `None` while the
    /// mentorship is still running or already closed.
    pub fn evaluate_mentorship(
        &self,
        record: &MentorshipRecord,
        mentee_overall: f64,
        now: DateTime<Utc>,
    ) -> Option<MentorshipRecord> {
        if !record.is_due(self.policy.evaluation_window(), now) {
            return None;
        }
        let mut closed = record.clone();
        closed.final_score = Some(mentee_overall);
        closed.evaluated_at = Some(now);
        let improvement = mentee_overall - record.baseline_score;
        // Tolerate float noise right at the threshold.
        closed.status = if improvement + 1e-9 >= self.policy.success_threshold {
            MentorshipStatus::Completed
        } else {
            MentorshipStatus::Failed
        };
        Some(closed)
    }

    fn check_mentee(&self, mentee: &AgentRecord, mentorships: &[MentorshipRecord]) -> Result<(), String> {
        if !mentee.is_active() {
            return Err(format!("status is {}", mentee.status));
        }
        if mentee.is_sub_agent() {
            return Err("sub-agents are not mentored".to_string());
        }
        if mentee.metrics.computed_at.is_none() {
            return Err("not yet scored".to_string());
        }
        if mentee.overall() >= self.policy.mentee_score_ceiling {
            return Err(format!(
                "overall {:.3} at or above ceiling {:.2}",
                mentee.overall(),
                self.policy.mentee_score_ceiling
            ));
        }
        if mentorships.iter().any(|m| m.is_active() && m.mentee_id == mentee.id) {
            return Err("already has an active mentor".to_string());
        }
        Ok(())
    }
}

fn active_load(mentor: &AgentRecord, mentorships: &[MentorshipRecord]) -> usize {
    mentorships
        .iter()
        .filter(|m| m.is_active() && m.mentor_id == mentor.id)
        .count()
}

fn specialization_fit(mentee: &Specialization, mentor: &Specialization) -> f64 {
    if mentee == mentor {
        1.0
    } else if mentee.is_related_to(mentor) {
        0.6
    } else if mentor.is_generalist() {
        0.25
    } else {
        0.0
    }
}

fn compatibility(mentee: &AgentRecord, mentor: &AgentRecord, history: &[MentorshipRecord]) -> f64 {
    if mentee.lineage.parent_id.as_ref() == Some(&mentor.id) {
        return 1.0;
    }
    let previous = history
        .iter()
        .filter(|m| m.mentor_id == mentor.id && m.mentee_id == mentee.id && !m.is_active())
        .max_by_key(|m| m.assigned_at);
    match previous.map(|m| m.status) {
        Some(MentorshipStatus::Completed) => 0.9,
        Some(MentorshipStatus::Failed) => 0.1,
        _ => 0.5,
    }
}
