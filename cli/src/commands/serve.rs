// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Long-running control plane
//!
//! Starts the four control loops on their configured intervals, the read
//! API, and the Prometheus exporter, then waits for Ctrl+C or SIGTERM. All
//! loops share one cancellation token so shutdown stops them together.

use anyhow::{Context, Result};
use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use colony_core::application::{ControlLoop, ControlTask};
use colony_core::presentation::api;

use crate::services::ColonyServices;

#[derive(Args)]
pub struct ServeArgs {
    /// Skip the evaluation loop
    #[arg(long)]
    no_evaluate: bool,

    /// Skip the spawn loop
    #[arg(long)]
    no_spawn: bool,

    /// Skip the cleanup loop
    #[arg(long)]
    no_cleanup: bool,

    /// Skip the mentorship loop
    #[arg(long)]
    no_mentor: bool,

    /// Override the API port from configuration
    #[arg(long, env = "COLONY_API_PORT")]
    port: Option<u16>,
}

pub async fn run(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let services = ColonyServices::load(config_path)?;
    let spec = services.config.spec.clone();
    info!(name = %services.config.metadata.name, "Colony control plane starting");

    if spec.observability.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], spec.observability.metrics.port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus metrics exporter listening");
    }

    let shutdown = CancellationToken::new();
    let schedule = &spec.schedule;
    let mut tasks: Vec<(Arc<dyn ControlTask>, u64)> = Vec::new();
    if !args.no_evaluate {
        tasks.push((Arc::new(services.evaluator()) as Arc<dyn ControlTask>, schedule.evaluation_interval_secs));
    }
    if !args.no_spawn {
        tasks.push((Arc::new(services.spawner()) as Arc<dyn ControlTask>, schedule.spawn_interval_secs));
    }
    if !args.no_cleanup {
        tasks.push((Arc::new(services.cleanup()) as Arc<dyn ControlTask>, schedule.cleanup_interval_secs));
    }
    if !args.no_mentor {
        tasks.push((Arc::new(services.mentorship()) as Arc<dyn ControlTask>, schedule.mentor_interval_secs));
    }

    let handles: Vec<_> = tasks
        .into_iter()
        .map(|(task, secs)| {
            Arc::new(ControlLoop::new(task, Duration::from_secs(secs.max(1))).with_shutdown_token(shutdown.clone()))
                .start()
        })
        .collect();

    if spec.api.enabled {
        let port = args.port.unwrap_or(spec.api.port);
        let addr = format!("{}:{}", spec.api.bind_address, port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        info!("Registry API listening on {}", addr);

        let app = api::app(Arc::new(services.query()));
        let token = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                token.cancel();
            })
            .await
            .context("HTTP server failed")?;
    } else {
        shutdown_signal().await;
        shutdown.cancel();
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Control loop ended abnormally");
        }
    }
    info!("Colony control plane stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
