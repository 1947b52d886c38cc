// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use colony_core::domain::colony_config::ColonyConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the full resolved manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./colony-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = ColonyConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. COLONY_CONFIG_PATH: {}",
            std::env::var("COLONY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./colony-config.yaml");
        println!("  4. ~/.colony/config.yaml");
        println!("  5. /etc/colony/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config).context("Failed to render configuration")?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Store:".bold());
    println!("  Backend: {:?}", spec.store.backend);
    println!("  Path: {}", spec.store.path.display());
    println!(
        "  Update: {} attempt(s), commit timeout {}ms",
        spec.update.max_attempts, spec.update.commit_timeout_ms
    );
    println!();

    println!("{}", "Schedule (seconds):".bold());
    println!("  evaluate: {}", spec.schedule.evaluation_interval_secs);
    println!("  spawn:    {}", spec.schedule.spawn_interval_secs);
    println!("  cleanup:  {}", spec.schedule.cleanup_interval_secs);
    println!("  mentor:   {}", spec.schedule.mentor_interval_secs);
    println!();

    println!("{}", "Collaborators:".bold());
    println!(
        "  Activity: {}",
        spec.activity
            .source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "  Signals: {}",
        spec.signals
            .source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!();

    let lifecycle = &spec.registry.lifecycle;
    println!("{}", "Lifecycle:".bold());
    println!(
        "  Promote at ≥ {:.2} for {} cycle(s), eliminate at ≤ {:.2} for {} cycle(s)",
        lifecycle.promotion_threshold,
        lifecycle.promotion_cycles,
        lifecycle.elimination_threshold,
        lifecycle.elimination_cycles
    );
    let protected: Vec<String> = lifecycle.protected_specializations.iter().map(|s| s.to_string()).collect();
    println!("  Protected: {}", protected.join(", "));
    println!();

    println!("{}", "Surfaces:".bold());
    if spec.api.enabled {
        println!("  API: {}:{}", spec.api.bind_address, spec.api.port);
    } else {
        println!("  API: {}", "disabled".dimmed());
    }
    if spec.observability.metrics.enabled {
        println!("  Metrics: :{}", spec.observability.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ColonyConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    ColonyConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
