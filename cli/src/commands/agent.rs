// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use colony_core::domain::agent::{AgentId, AgentRecord, AgentStatus, Specialization};

use crate::services::ColonyServices;

#[derive(Subcommand)]
pub enum AgentCommand {
    /// List agents (active only unless --all)
    List {
        /// Only this specialization
        #[arg(short, long)]
        specialization: Option<Specialization>,

        /// Include hall-of-fame, archived and deactivated records
        #[arg(long)]
        all: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one agent record (JSON)
    Show {
        /// Agent ID
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },

    /// Admit a new agent
    Admit {
        /// Specialization of the new agent
        #[arg(value_name = "SPECIALIZATION")]
        specialization: Specialization,

        /// Admit as a sub-agent of this parent
        #[arg(long, value_name = "AGENT_ID")]
        parent: Option<String>,
    },
}

pub async fn handle_command(command: AgentCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = ColonyServices::load(config_path)?;

    match command {
        AgentCommand::List {
            specialization,
            all,
            json,
        } => list_agents(&services, specialization, all, json).await,
        AgentCommand::Show { agent_id } => show_agent(&services, AgentId::new(agent_id)).await,
        AgentCommand::Admit { specialization, parent } => {
            admit_agent(&services, specialization, parent.map(AgentId::new)).await
        }
    }
}

async fn list_agents(
    services: &ColonyServices,
    specialization: Option<Specialization>,
    all: bool,
    json: bool,
) -> Result<()> {
    let query = services.query();
    let agents: Vec<AgentRecord> = if all {
        query
            .list_all()
            .await?
            .into_iter()
            .filter(|a| specialization.as_ref().is_none_or(|s| &a.specialization == s))
            .collect()
    } else {
        query.list_active(specialization.as_ref()).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!("{}", "No agents found".yellow());
        return Ok(());
    }

    println!("{} agent(s) found:", agents.len());
    println!(
        "{:<24} {:<16} {:<14} {:>7} {}",
        "ID", "SPECIALIZATION", "STATUS", "OVERALL", "PARENT"
    );

    for agent in agents {
        let parent = agent
            .lineage
            .parent_id
            .as_ref()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<16} {:<14} {:>7.3} {}",
            agent.id.as_str().bold(),
            agent.specialization.to_string(),
            colored_status(agent.status),
            agent.overall(),
            parent
        );
    }

    Ok(())
}

fn colored_status(status: AgentStatus) -> colored::ColoredString {
    let label = format!("{:<14}", status.as_str());
    match status {
        AgentStatus::Active => label.normal(),
        AgentStatus::HallOfFame => label.green(),
        AgentStatus::Archived => label.red(),
        AgentStatus::Deactivated => label.dimmed(),
    }
}

async fn show_agent(services: &ColonyServices, agent_id: AgentId) -> Result<()> {
    let record = services.query().get_record(&agent_id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn admit_agent(
    services: &ColonyServices,
    specialization: Specialization,
    parent: Option<AgentId>,
) -> Result<()> {
    let record = services
        .spawner()
        .admit_manual(specialization, parent, Utc::now())
        .await
        .context("Admission failed")?;

    println!("{}", format!("✓ Agent admitted: {}", record.id).green());
    if let Some(parent) = &record.lineage.parent_id {
        println!("  Sub-agent of {} (generation {})", parent, record.lineage.generation);
    }
    Ok(())
}
