// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Record-Level Three-Way Merge
//!
//! Reconciles two documents derived from a common base when a conditional
//! commit loses the race. Pure and I/O free.
//!
//! | Base → ours / theirs | Result |
//! |----------------------|--------|
//! | unchanged / changed | theirs |
//! | changed / unchanged | ours |
//! | added on one side | kept |
//! | changed on both, disjoint fields | field-by-field union, later `last_updated_at` |
//! | same field changed on both to different values | `Incompatible` |
//!
//! Mentorships merge by `mentorship_id` as whole records; the spawn ledger
//! merges per specialization, and an entry written by both sides is
//! `Incompatible` even when the timestamps agree; the config block merges as
//! a single value.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::agent::{AgentId, AgentRecord, Specialization};
use crate::domain::mentorship::{MentorshipId, MentorshipRecord};
use crate::domain::registry::RegistryDocument;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged(Box<RegistryDocument>),
    /// Contested keys (agent ids, `mentorship:<id>`, `spawn_ledger:<spec>`, `config`).
    Incompatible(Vec<String>),
}

/// Keys that differ between a base document and a derived one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchedIds {
    pub agents: BTreeSet<AgentId>,
    pub mentorships: BTreeSet<MentorshipId>,
    pub spawn_ledger: BTreeSet<Specialization>,
    pub config: bool,
}

impl TouchedIds {
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
            && self.mentorships.is_empty()
            && self.spawn_ledger.is_empty()
            && !self.config
    }

    /// Keys touched by both sides.
    pub fn overlap(&self, other: &TouchedIds) -> Vec<String> {
        let mut contested: Vec<String> = self
            .agents
            .intersection(&other.agents)
            .map(|id| id.to_string())
            .collect();
        contested.extend(
            self.mentorships
                .intersection(&other.mentorships)
                .map(|id| format!("mentorship:{}", id)),
        );
        contested.extend(
            self.spawn_ledger
                .intersection(&other.spawn_ledger)
                .map(|s| format!("spawn_ledger:{}", s)),
        );
        if self.config && other.config {
            contested.push("config".to_string());
        }
        contested
    }

    pub fn is_disjoint(&self, other: &TouchedIds) -> bool {
        self.overlap(other).is_empty()
    }
}

pub fn touched_ids(base: &RegistryDocument, other: &RegistryDocument) -> TouchedIds {
    TouchedIds {
        agents: changed_keys(&base.agents, &other.agents),
        mentorships: changed_keys(&index_mentorships(base), &index_mentorships(other)),
        spawn_ledger: changed_keys(&base.spawn_ledger, &other.spawn_ledger),
        config: base.config != other.config,
    }
}

fn changed_keys<K: Ord + Clone, V: PartialEq>(
    base: &BTreeMap<K, V>,
    other: &BTreeMap<K, V>,
) -> BTreeSet<K> {
    base.keys()
        .chain(other.keys())
        .filter(|k| base.get(*k) != other.get(*k))
        .cloned()
        .collect()
}

fn index_mentorships(doc: &RegistryDocument) -> BTreeMap<MentorshipId, MentorshipRecord> {
    doc.mentorships
        .iter()
        .map(|m| (m.mentorship_id.clone(), m.clone()))
        .collect()
}

/// Pick the side that changed a value relative to base.
fn pick<T: PartialEq + Clone>(base: Option<&T>, ours: Option<&T>, theirs: Option<&T>) -> Result<Option<T>, ()> {
    if ours == theirs || ours == base {
        Ok(theirs.cloned())
    } else if theirs == base {
        Ok(ours.cloned())
    } else {
        Err(())
    }
}

fn pick_field<T: PartialEq + Clone>(base: &T, ours: &T, theirs: &T) -> Result<T, ()> {
    pick(Some(base), Some(ours), Some(theirs)).map(|v| v.unwrap_or_else(|| theirs.clone()))
}

fn merge_record(base: &AgentRecord, ours: &AgentRecord, theirs: &AgentRecord) -> Result<AgentRecord, ()> {
    Ok(AgentRecord {
        id: pick_field(&base.id, &ours.id, &theirs.id)?,
        specialization: pick_field(&base.specialization, &ours.specialization, &theirs.specialization)?,
        status: pick_field(&base.status, &ours.status, &theirs.status)?,
        metrics: pick_field(&base.metrics, &ours.metrics, &theirs.metrics)?,
        lineage: pick_field(&base.lineage, &ours.lineage, &theirs.lineage)?,
        evaluation: pick_field(&base.evaluation, &ours.evaluation, &theirs.evaluation)?,
        spawned_at: pick_field(&base.spawned_at, &ours.spawned_at, &theirs.spawned_at)?,
        last_updated_at: ours.last_updated_at.max(theirs.last_updated_at),
    })
}

/// Keys in the order they appear in `theirs`, then any only in `ours`.
fn merged_key_order<K: Ord + Clone>(theirs: &[K], ours: &[K]) -> Vec<K> {
    let mut seen = BTreeSet::new();
    theirs
        .iter()
        .chain(ours.iter())
        .filter(|k| seen.insert((*k).clone()))
        .cloned()
        .collect()
}

pub fn three_way(base: &RegistryDocument, ours: &RegistryDocument, theirs: &RegistryDocument) -> MergeOutcome {
    let mut contested = Vec::new();
    let mut merged = theirs.clone();

    // Agents
    let keys: BTreeSet<&AgentId> = base
        .agents
        .keys()
        .chain(ours.agents.keys())
        .chain(theirs.agents.keys())
        .collect();
    let mut agents = BTreeMap::new();
    for id in keys {
        let (b, o, t) = (base.agents.get(id), ours.agents.get(id), theirs.agents.get(id));
        let value = match pick(b, o, t) {
            Ok(v) => v,
            Err(()) => match (b, o, t) {
                (Some(b), Some(o), Some(t)) => match merge_record(b, o, t) {
                    Ok(record) => Some(record),
                    Err(()) => {
                        contested.push(id.to_string());
                        continue;
                    }
                },
                _ => {
                    contested.push(id.to_string());
                    continue;
                }
            },
        };
        if let Some(record) = value {
            agents.insert(id.clone(), record);
        }
    }
    merged.agents = agents;

    // Mentorships
    let (base_m, ours_m, theirs_m) = (
        index_mentorships(base),
        index_mentorships(ours),
        index_mentorships(theirs),
    );
    let order = merged_key_order(
        &theirs.mentorships.iter().map(|m| m.mentorship_id.clone()).collect::<Vec<_>>(),
        &ours.mentorships.iter().map(|m| m.mentorship_id.clone()).collect::<Vec<_>>(),
    );
    let mut mentorships = Vec::with_capacity(order.len());
    for id in order {
        match pick(base_m.get(&id), ours_m.get(&id), theirs_m.get(&id)) {
            Ok(Some(record)) => mentorships.push(record),
            Ok(None) => {}
            Err(()) => contested.push(format!("mentorship:{}", id)),
        }
    }
    merged.mentorships = mentorships;

    // Spawn ledger: an entry records an admission made under the cooldown it
    // guards, so two writers admitting for one specialization never merge.
    let ledger_keys: BTreeSet<&Specialization> = base
        .spawn_ledger
        .keys()
        .chain(ours.spawn_ledger.keys())
        .chain(theirs.spawn_ledger.keys())
        .collect();
    let mut spawn_ledger = BTreeMap::new();
    for s in ledger_keys {
        let (b, o, t) = (base.spawn_ledger.get(s), ours.spawn_ledger.get(s), theirs.spawn_ledger.get(s));
        let value = if o != b && t != b {
            contested.push(format!("spawn_ledger:{}", s));
            continue;
        } else if o != b {
            o
        } else {
            t
        };
        if let Some(at) = value {
            spawn_ledger.insert(s.clone(), *at);
        }
    }
    merged.spawn_ledger = spawn_ledger;

    // Config
    match pick(Some(&base.config), Some(&ours.config), Some(&theirs.config)) {
        Ok(Some(config)) => merged.config = config,
        Ok(None) => {}
        Err(()) => contested.push("config".to_string()),
    }

    if contested.is_empty() {
        merged.recompute_stats();
        MergeOutcome::Merged(Box::new(merged))
    } else {
        MergeOutcome::Incompatible(contested)
    }
}
