// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Registry document commands
//!
//! Commands: init, stats

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use colony_core::domain::registry::{RegistryStats, Revision};

use crate::services::ColonyServices;

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// Write an empty registry document seeded from configuration
    Init,

    /// Show population and mentorship statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: RegistryCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = ColonyServices::load(config_path)?;
    match command {
        RegistryCommand::Init => init(&services).await,
        RegistryCommand::Stats { json } => stats(&services, json).await,
    }
}

async fn init(services: &ColonyServices) -> Result<()> {
    let snapshot = services.store.fetch().await.context("Failed to read registry")?;
    if snapshot.revision != Revision::absent() {
        println!(
            "{}",
            format!(
                "Registry already initialized (generation {}, {} agent(s))",
                snapshot.document.generation,
                snapshot.document.agents.len()
            )
            .yellow()
        );
        return Ok(());
    }

    let mut document = snapshot.document;
    document.validate().context("Configured registry settings are invalid")?;
    document.stamp_commit(document.generation, Utc::now());
    let revision = services
        .store
        .commit(&snapshot.revision, &document)
        .await
        .context("Failed to write registry")?;

    println!(
        "{}",
        format!("✓ Registry initialized at {}", services.config.spec.store.path.display()).green()
    );
    println!("  Revision: {}", revision);
    Ok(())
}

async fn stats(services: &ColonyServices, json: bool) -> Result<()> {
    let stats = services.query().stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &RegistryStats) {
    println!("{}", "Population:".bold());
    println!("  Total:        {}", stats.total);
    println!("  Active:       {} ({} sub-agent(s))", stats.active, stats.sub_agents);
    println!("  Hall of fame: {}", stats.hall_of_fame);
    println!("  Archived:     {}", stats.archived);
    println!("  Deactivated:  {}", stats.deactivated);
    println!();

    if !stats.by_specialization.is_empty() {
        println!("{}", "Active by specialization:".bold());
        for (specialization, count) in &stats.by_specialization {
            println!("  {:<16} {}", specialization, count);
        }
        println!();
    }

    println!("{}", "Mentorships:".bold());
    println!("  Active:    {}", stats.active_mentorships);
    println!("  Completed: {}", stats.completed_mentorships);
    println!("  Failed:    {}", stats.failed_mentorships);
}
