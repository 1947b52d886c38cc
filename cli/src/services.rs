// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service wiring shared by the one-shot commands and `serve`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use colony_core::application::{
    CleanupService, Evaluator, RegistryQueryService, RegistryUpdater, RetryPolicy, SpawnService,
};
use colony_core::domain::colony_config::{ColonyConfigManifest, StoreBackend};
use colony_core::domain::repository::{ActivityCollector, DocumentStore, HealthProvider, WorkloadSignalProvider};
use colony_core::infrastructure::activity::{CachedActivityCollector, JsonFileActivityCollector, NoActivityCollector};
use colony_core::infrastructure::event_bus::EventBus;
use colony_core::infrastructure::signals::{
    CachedSignalProvider, JsonFileSignalProvider, NoSignalProvider, StaticHealthProvider,
};
use colony_core::infrastructure::store;
use colony_swarm::application::MentorshipService;

pub struct ColonyServices {
    pub config: ColonyConfigManifest,
    pub store: Arc<dyn DocumentStore>,
    pub updater: Arc<RegistryUpdater>,
    pub event_bus: EventBus,
    activity: Arc<CachedActivityCollector>,
    signals: Arc<dyn WorkloadSignalProvider>,
    health: Arc<dyn HealthProvider>,
}

impl ColonyServices {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = ColonyConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
        config.validate().context("Configuration validation failed")?;
        Ok(Self::build(config))
    }

    pub fn build(config: ColonyConfigManifest) -> Self {
        let spec = &config.spec;
        if spec.store.backend == StoreBackend::Memory {
            warn!("Using the in-memory store; registry state is lost on exit");
        }
        let store = store::from_config(&spec.store, &spec.registry);
        let event_bus = EventBus::with_default_capacity();
        let updater = Arc::new(
            RegistryUpdater::new(
                store.clone(),
                RetryPolicy::from(&spec.update),
                spec.update.commit_timeout(),
            )
            .with_event_bus(event_bus.clone()),
        );

        let collector: Arc<dyn ActivityCollector> = match &spec.activity.source {
            Some(path) => {
                info!(source = %path.display(), "Reading agent activity from export");
                Arc::new(JsonFileActivityCollector::new(path))
            }
            None => {
                warn!("No activity source configured; evaluations reuse stored scores");
                Arc::new(NoActivityCollector)
            }
        };
        let activity = Arc::new(CachedActivityCollector::from_hours(collector, spec.activity.max_age_hours));

        let (raw_signals, health): (Arc<dyn WorkloadSignalProvider>, Arc<dyn HealthProvider>) =
            match &spec.signals.source {
                Some(path) => {
                    info!(source = %path.display(), "Reading workload and health signals from export");
                    let provider = Arc::new(JsonFileSignalProvider::new(path));
                    (provider.clone(), provider)
                }
                None => {
                    warn!("No signal source configured; no workload will be reported");
                    (Arc::new(NoSignalProvider), Arc::new(StaticHealthProvider::default()))
                }
            };
        let signals: Arc<dyn WorkloadSignalProvider> =
            Arc::new(CachedSignalProvider::from_seconds(raw_signals, spec.signals.max_age_seconds));

        Self {
            config,
            store,
            updater,
            event_bus,
            activity,
            signals,
            health,
        }
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(
            self.updater.clone(),
            self.activity.clone(),
            self.event_bus.clone(),
            self.config.spec.activity.window_days,
        )
        .with_signals(self.signals.clone())
    }

    pub fn spawner(&self) -> SpawnService {
        SpawnService::new(
            self.updater.clone(),
            self.signals.clone(),
            self.health.clone(),
            self.event_bus.clone(),
        )
    }

    pub fn cleanup(&self) -> CleanupService {
        CleanupService::new(self.updater.clone(), self.signals.clone(), self.event_bus.clone())
    }

    pub fn mentorship(&self) -> MentorshipService {
        MentorshipService::new(self.updater.clone(), self.event_bus.clone())
    }

    pub fn query(&self) -> RegistryQueryService {
        RegistryQueryService::new(self.store.clone())
    }
}
