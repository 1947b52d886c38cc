// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Colony Configuration Manifest
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing how a
// control-plane process runs:
// - Document store backend and location
// - Update protocol retry budget and commit timeout
// - Control loop schedule
// - Collaborator sources (activity, workload signals)
// - Seed values for a new registry document's config block
// - HTTP API and observability settings
//
// Thresholds and weights read at run time come from the registry document;
// the `registry` section here only seeds a freshly initialised document.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::registry::RegistryConfig;

pub const API_VERSION: &str = "colony.dev/v1";
pub const KIND: &str = "ColonyConfig";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColonyConfigManifest {
    /// API version (must be "colony.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ColonyConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: ColonyConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ColonyConfigSpec {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub update: UpdateConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub activity: ActivityConfig,

    #[serde(default)]
    pub signals: SignalsConfig,

    /// Seed for a new document's `config` block.
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Registry document path (file backend)
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: default_store_path(),
        }
    }
}

/// Retry budget of the atomic update protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter fraction applied to each delay (0.3 = ±30%)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            commit_timeout_ms: default_commit_timeout_ms(),
        }
    }
}

impl UpdateConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}

/// Control loop intervals, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,

    #[serde(default = "default_spawn_interval")]
    pub spawn_interval_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_mentor_interval")]
    pub mentor_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: default_evaluation_interval(),
            spawn_interval_secs: default_spawn_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
            mentor_interval_secs: default_mentor_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Cached activity older than this is refetched.
    #[serde(default = "default_activity_max_age_hours")]
    pub max_age_hours: u32,

    /// JSON export of per-agent activity counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            max_age_hours: default_activity_max_age_hours(),
            source: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// JSON export of workload and health signals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    #[serde(default = "default_signal_max_age")]
    pub max_age_seconds: u64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            source: None,
            max_age_seconds: default_signal_max_age(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_store_path() -> PathBuf {
    PathBuf::from("colony-registry.json")
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.3
}

fn default_commit_timeout_ms() -> u64 {
    10_000
}

fn default_evaluation_interval() -> u64 {
    3600
}

fn default_spawn_interval() -> u64 {
    300
}

fn default_cleanup_interval() -> u64 {
    1800
}

fn default_mentor_interval() -> u64 {
    3600
}

fn default_window_days() -> u32 {
    30
}

fn default_activity_max_age_hours() -> u32 {
    12
}

fn default_signal_max_age() -> u64 {
    900
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ColonyConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "colony".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ColonyConfigSpec::default(),
        }
    }
}

impl ColonyConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. COLONY_CONFIG_PATH environment variable
    /// 2. ./colony-config.yaml (working directory)
    /// 3. ~/.colony/config.yaml (user home)
    /// 4. /etc/colony/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("COLONY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!("COLONY_CONFIG_PATH points to missing file: {:?}", path);
        }

        let cwd = PathBuf::from("./colony-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".colony").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/colony/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Container deployments override selected settings through env vars.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("COLONY_STORE_PATH") {
            tracing::info!("Environment override: COLONY_STORE_PATH={}", val);
            self.spec.store.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("COLONY_MAX_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(n) => {
                    tracing::info!("Environment override: COLONY_MAX_ATTEMPTS={}", n);
                    self.spec.update.max_attempts = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for COLONY_MAX_ATTEMPTS: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("COLONY_COMMIT_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: COLONY_COMMIT_TIMEOUT_MS={}", ms);
                    self.spec.update.commit_timeout_ms = ms;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for COLONY_COMMIT_TIMEOUT_MS: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let update = &self.spec.update;
        if update.max_attempts == 0 {
            anyhow::bail!("spec.update.max_attempts must be at least 1");
        }
        if update.multiplier < 1.0 {
            anyhow::bail!("spec.update.multiplier must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&update.jitter) {
            anyhow::bail!("spec.update.jitter must be in [0,1]");
        }
        if update.commit_timeout_ms == 0 {
            anyhow::bail!("spec.update.commit_timeout_ms must be positive");
        }

        if self.spec.store.backend == StoreBackend::File && self.spec.store.path.as_os_str().is_empty() {
            anyhow::bail!("spec.store.path cannot be empty for the file backend");
        }

        self.spec
            .registry
            .validate()
            .map_err(|e| anyhow::anyhow!("spec.registry: {}", e))?;

        Ok(())
    }
}
