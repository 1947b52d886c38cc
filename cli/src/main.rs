// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Colony Control Plane CLI
//!
//! The `colony` binary operates the agent registry: one-shot control passes
//! for cron-style deployments, read-only inspection, and `serve`, which runs
//! every control loop plus the read API in one process.
//!
//! ## Commands
//!
//! - `colony config show|validate|generate` - Configuration management
//! - `colony registry init|stats` - Registry document lifecycle
//! - `colony agent list|show|admit` - Agent inspection and manual admission
//! - `colony cycle evaluate|spawn|cleanup|mentor` - Run a single control pass
//! - `colony serve` - Run all control loops and the HTTP API until interrupted

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod services;

use commands::{AgentCommand, ConfigCommand, CycleCommand, RegistryCommand};

/// Colony - registry and lifecycle control plane for an agent population
#[derive(Parser)]
#[command(name = "colony")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "COLONY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "COLONY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs instead of compact text
    #[arg(long, global = true, env = "COLONY_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Registry document lifecycle
    #[command(name = "registry")]
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },

    /// Agent inspection and admission
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Run a single control pass
    #[command(name = "cycle")]
    Cycle {
        #[command(subcommand)]
        command: CycleCommand,
    },

    /// Run every control loop and the read API until interrupted
    #[command(name = "serve")]
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_json)?;

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Registry { command }) => commands::registry::handle_command(command, cli.config).await,
        Some(Commands::Agent { command }) => commands::agent::handle_command(command, cli.config).await,
        Some(Commands::Cycle { command }) => commands::cycle::handle_command(command, cli.config).await,
        Some(Commands::Serve(args)) => commands::serve::run(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
