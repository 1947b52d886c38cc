// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Control Loop - Interval-driven runner for registry control passes
//!
//! Each of the evaluator, spawner, cleanup and mentor matcher runs as an
//! independent task on its own interval. Tasks share nothing except the
//! document store, so they can be started in any combination and in any
//! number of processes.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Background scheduling with graceful shutdown

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::application::cleanup::CleanupService;
use crate::application::evaluator::Evaluator;
use crate::application::spawner::SpawnService;

/// One control pass that can be repeated on a schedule.
#[async_trait]
pub trait ControlTask: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run a single pass and return a one-line summary for the log.
    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<String>;
}

pub struct ControlLoop {
    task: Arc<dyn ControlTask>,
    period: Duration,
    shutdown_token: CancellationToken,
}

impl ControlLoop {
    pub fn new(task: Arc<dyn ControlTask>, period: Duration) -> Self {
        Self {
            task,
            period,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Share one token between several loops to stop them together.
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let name = self.task.name();
        info!(task = name, period_secs = self.period.as_secs(), "Starting control loop");

        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!(task = name, "Running control pass");
                    match self.task.run_once(Utc::now()).await {
                        Ok(summary) => info!(task = name, "{}", summary),
                        // Exhausted retries and store failures surface here; the next tick retries.
                        Err(e) => error!(task = name, error = %e, "Control pass failed"),
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!(task = name, "Shutdown signal received, stopping control loop");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ControlTask for Evaluator {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<String> {
        let report = self.run(now).await?;
        Ok(format!(
            "evaluated {} agent(s): {} promoted, {} eliminated, {} deactivated, {} unscored",
            report.evaluated,
            report.promoted.len(),
            report.eliminated.len(),
            report.deactivated.len(),
            report.unscored.len()
        ))
    }
}

#[async_trait]
impl ControlTask for SpawnService {
    fn name(&self) -> &'static str {
        "spawn"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<String> {
        let report = self.run_cycle(now).await?;
        Ok(format!(
            "{} decision(s), {} sub-agent(s) admitted",
            report.decisions.len(),
            report.admitted.len()
        ))
    }
}

#[async_trait]
impl ControlTask for CleanupService {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<String> {
        let report = self.run(now).await?;
        Ok(if report.signals_unavailable {
            "skipped: workload signals unavailable".to_string()
        } else {
            format!("{} sub-agent(s) deactivated", report.deactivated.len())
        })
    }
}
