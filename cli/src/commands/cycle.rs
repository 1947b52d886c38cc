// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! One-shot control passes
//!
//! Each subcommand runs exactly one pass against the configured store and
//! exits, for deployments that schedule passes externally.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use crate::services::ColonyServices;

#[derive(Subcommand)]
pub enum CycleCommand {
    /// Rescore active agents and apply lifecycle transitions
    Evaluate,

    /// Evaluate workload signals and admit sub-agents
    Spawn {
        /// Print every decision with its reasoning
        #[arg(short, long)]
        verbose: bool,
    },

    /// Deactivate idle sub-agents whose bottleneck has cleared
    Cleanup,

    /// Close finished mentorships and assign mentors to new mentees
    Mentor,
}

pub async fn handle_command(command: CycleCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = ColonyServices::load(config_path)?;
    let now = Utc::now();

    match command {
        CycleCommand::Evaluate => {
            let report = services.evaluator().run(now).await?;
            println!(
                "Cycle {}: evaluated {}, rescored {}",
                report.cycle, report.evaluated, report.rescored
            );
            print_ids("Promoted", &report.promoted);
            print_ids("Eliminated", &report.eliminated);
            print_ids("Deactivated", &report.deactivated);
            if !report.unscored.is_empty() {
                println!(
                    "{}",
                    format!("{} agent(s) kept previous scores (activity unavailable)", report.unscored.len()).yellow()
                );
            }
        }
        CycleCommand::Spawn { verbose } => {
            let report = services.spawner().run_cycle(now).await?;
            for decision in &report.decisions {
                let verdict = if decision.admit {
                    format!("admit {}", decision.proposed_count).green()
                } else {
                    "hold".dimmed()
                };
                println!(
                    "{:<16} {:<8} confidence {:.3}",
                    decision.specialization.to_string(),
                    verdict,
                    decision.confidence
                );
                if verbose {
                    for line in &decision.reasoning {
                        println!("    {}", line.dimmed());
                    }
                }
            }
            print_ids("Admitted", &report.admitted);
        }
        CycleCommand::Cleanup => {
            let report = services.cleanup().run(now).await?;
            if report.signals_unavailable {
                println!("{}", "Skipped: workload signals unavailable".yellow());
            } else {
                print_ids("Deactivated", &report.deactivated);
            }
        }
        CycleCommand::Mentor => {
            let mentorship = services.mentorship();
            let evaluated = mentorship.evaluate_due(now).await?;
            let assigned = mentorship.assign_pending(now).await?;
            for record in evaluated.completed.iter().chain(evaluated.failed.iter()) {
                println!(
                    "{} {} → {}: {} ({:+.3})",
                    "closed".bold(),
                    record.mentor_id,
                    record.mentee_id,
                    record.status.as_str(),
                    record.improvement().unwrap_or(0.0)
                );
            }
            for record in &assigned.assigned {
                println!(
                    "{} {} → {} (match {:.3})",
                    "assigned".green(),
                    record.mentor_id,
                    record.mentee_id,
                    record.match_score
                );
            }
            for (mentee, reason) in &assigned.unmatched {
                println!("{} {}: {}", "unmatched".dimmed(), mentee, reason);
            }
        }
    }

    Ok(())
}

fn print_ids(label: &str, ids: &[colony_core::domain::agent::AgentId]) {
    if ids.is_empty() {
        return;
    }
    let joined: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
    println!("{}: {}", label.bold(), joined.join(", "));
}
