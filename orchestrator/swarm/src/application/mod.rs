// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Mentorship Service
//!
//! Assigns mentors to eligible mentees and closes mentorships whose
//! evaluation window has passed. Both passes are single registry mutations:
//! the matcher runs inside the mutator against the freshest document, so
//! mentor capacity is checked against what is actually committed.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drives `MentorMatcher` through the atomic update protocol

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use colony_core::application::control_loop::ControlTask;
use colony_core::application::registry_update::{RegistryUpdater, UpdateError};
use colony_core::domain::agent::{AgentId, AgentRecord, AgentStatus};
use colony_core::domain::events::RegistryEvent;
use colony_core::domain::mentorship::{MentorshipRecord, MentorshipStatus};
use colony_core::domain::registry::RegistryDocument;
use colony_core::infrastructure::event_bus::EventBus;

use crate::domain::{MatchOutcome, MentorMatcher, NoMatchReason};

#[derive(Debug, Clone, Default)]
pub struct AssignmentReport {
    pub assigned: Vec<MentorshipRecord>,
    pub unmatched: Vec<(AgentId, NoMatchReason)>,
    pub committed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MentorshipEvaluationReport {
    pub completed: Vec<MentorshipRecord>,
    pub failed: Vec<MentorshipRecord>,
    pub committed: bool,
}

pub struct MentorshipService {
    updater: Arc<RegistryUpdater>,
    event_bus: EventBus,
}

impl MentorshipService {
    pub fn new(updater: Arc<RegistryUpdater>, event_bus: EventBus) -> Self {
        Self { updater, event_bus }
    }

    /// Try to pair every eligible mentee, neediest first.
    pub async fn assign_pending(&self, now: DateTime<Utc>) -> Result<AssignmentReport, UpdateError> {
        let result: Mutex<(Vec<MentorshipRecord>, Vec<(AgentId, NoMatchReason)>)> = Mutex::new(Default::default());
        let outcome = self
            .updater
            .apply("mentor-assign", |doc| {
                *result.lock() = assign_all(doc, now);
                Ok(())
            })
            .await?;

        let (assigned, unmatched) = result.into_inner();
        for (mentee, reason) in &unmatched {
            debug!(mentee_id = %mentee, reason = %reason, "No mentor assigned");
        }

        let mut report = AssignmentReport {
            unmatched,
            committed: outcome.committed,
            ..Default::default()
        };
        if !outcome.committed {
            return Ok(report);
        }

        for record in assigned {
            if !outcome
                .document
                .mentorships
                .iter()
                .any(|m| m.mentorship_id == record.mentorship_id)
            {
                continue;
            }
            metrics::counter!("colony_mentorships_assigned_total").increment(1);
            info!(
                mentorship_id = %record.mentorship_id,
                mentor_id = %record.mentor_id,
                mentee_id = %record.mentee_id,
                match_score = record.match_score,
                "Mentor assigned"
            );
            self.event_bus.publish(RegistryEvent::MentorshipAssigned {
                mentorship_id: record.mentorship_id.clone(),
                mentor_id: record.mentor_id.clone(),
                mentee_id: record.mentee_id.clone(),
                match_score: record.match_score,
                assigned_at: record.assigned_at,
            });
            report.assigned.push(record);
        }
        Ok(report)
    }

    /// Close every active mentorship whose window has passed.
    pub async fn evaluate_due(&self, now: DateTime<Utc>) -> Result<MentorshipEvaluationReport, UpdateError> {
        let closed: Mutex<Vec<MentorshipRecord>> = Mutex::new(Vec::new());
        let outcome = self
            .updater
            .apply("mentor-evaluate", |doc| {
                *closed.lock() = close_due(doc, now);
                Ok(())
            })
            .await?;

        let mut report = MentorshipEvaluationReport {
            committed: outcome.committed,
            ..Default::default()
        };
        if !outcome.committed {
            return Ok(report);
        }

        for record in closed.into_inner() {
            let improvement = record.improvement().unwrap_or(0.0);
            info!(
                mentorship_id = %record.mentorship_id,
                status = record.status.as_str(),
                improvement,
                "Mentorship evaluated"
            );
            self.event_bus.publish(RegistryEvent::MentorshipEvaluated {
                mentorship_id: record.mentorship_id.clone(),
                mentor_id: record.mentor_id.clone(),
                mentee_id: record.mentee_id.clone(),
                status: record.status,
                improvement,
                evaluated_at: now,
            });
            if record.status == MentorshipStatus::Completed {
                report.completed.push(record);
            } else {
                report.failed.push(record);
            }
        }
        Ok(report)
    }
}

fn assign_all(doc: &mut RegistryDocument, now: DateTime<Utc>) -> (Vec<MentorshipRecord>, Vec<(AgentId, NoMatchReason)>) {
    let matcher = MentorMatcher::new(doc.config.mentorship.clone());
    let ceiling = matcher.policy().mentee_score_ceiling;

    let pool: Vec<AgentRecord> = doc
        .agents
        .values()
        .filter(|a| a.status == AgentStatus::HallOfFame)
        .cloned()
        .collect();
    let mut mentees: Vec<AgentRecord> = doc
        .active_agents()
        .filter(|a| !a.is_sub_agent() && a.metrics.computed_at.is_some() && a.overall() < ceiling)
        .filter(|a| !doc.has_active_mentorship_as_mentee(&a.id))
        .cloned()
        .collect();
    mentees.sort_by(|a, b| a.overall().total_cmp(&b.overall()).then_with(|| a.id.cmp(&b.id)));

    let mut assigned = Vec::new();
    let mut unmatched = Vec::new();
    for mentee in mentees {
        match matcher.assign(&mentee, &pool, &doc.mentorships, now) {
            MatchOutcome::Assigned(record) => {
                doc.mentorships.push(record.clone());
                assigned.push(record);
            }
            MatchOutcome::NoMatch(reason) => unmatched.push((mentee.id, reason)),
        }
    }
    (assigned, unmatched)
}

fn close_due(doc: &mut RegistryDocument, now: DateTime<Utc>) -> Vec<MentorshipRecord> {
    let matcher = MentorMatcher::new(doc.config.mentorship.clone());
    let mut closed = Vec::new();
    for index in 0..doc.mentorships.len() {
        let record = &doc.mentorships[index];
        let mentee_overall = doc
            .get(&record.mentee_id)
            .map(|m| m.overall())
            .unwrap_or(record.baseline_score);
        if let Some(done) = matcher.evaluate_mentorship(record, mentee_overall, now) {
            doc.mentorships[index] = done.clone();
            closed.push(done);
        }
    }
    closed
}

#[async_trait]
impl ControlTask for MentorshipService {
    fn name(&self) -> &'static str {
        "mentor"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<String> {
        let evaluated = self.evaluate_due(now).await?;
        let assigned = self.assign_pending(now).await?;
        Ok(format!(
            "{} mentorship(s) assigned, {} unmatched, {} completed, {} failed",
            assigned.assigned.len(),
            assigned.unmatched.len(),
            evaluated.completed.len(),
            evaluated.failed.len()
        ))
    }
}
