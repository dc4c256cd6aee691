//! Configuration loading from TOML files
//!
//! The file path comes from `--config` (default `config/sensmap.toml`). Every
//! section and key is optional; a missing or malformed file falls back to the
//! built-in defaults.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/sensmap.toml";

#[derive(Debug, Clone, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_bind_address")]
    bind_address: String,
    /// API port (0 to disable)
    #[serde(default = "default_server_port")]
    port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_server_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GridConfig {
    #[serde(default = "default_cell_size_m")]
    cell_size_m: f64,
}

fn default_cell_size_m() -> f64 {
    15.0
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { cell_size_m: default_cell_size_m() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RoutingConfig {
    #[serde(default = "default_osrm_url")]
    osrm_url: String,
    /// OSRM profile segment of the route URL
    #[serde(default = "default_routing_profile")]
    profile: String,
    #[serde(default = "default_routing_timeout_ms")]
    timeout_ms: u64,
    /// Used for the straight-line fallback duration
    #[serde(default = "default_walking_speed_mps")]
    walking_speed_mps: f64,
}

fn default_osrm_url() -> String {
    "https://router.project-osrm.org".to_string()
}

fn default_routing_profile() -> String {
    "walking".to_string()
}

fn default_routing_timeout_ms() -> u64 {
    8000
}

fn default_walking_speed_mps() -> f64 {
    1.4
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            osrm_url: default_osrm_url(),
            profile: default_routing_profile(),
            timeout_ms: default_routing_timeout_ms(),
            walking_speed_mps: default_walking_speed_mps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StorageConfig {
    #[serde(default = "default_snapshot_file")]
    snapshot_file: String,
    #[serde(default = "default_profile_file")]
    profile_file: String,
}

fn default_snapshot_file() -> String {
    "data/grid.json".to_string()
}

fn default_profile_file() -> String {
    "data/profile.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { snapshot_file: default_snapshot_file(), profile_file: default_profile_file() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct IntervalConfig {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self { interval_secs: default_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    grid: GridConfig,
    #[serde(default)]
    routing: RoutingConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    compaction: IntervalConfig,
    #[serde(default)]
    metrics: IntervalConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    server_port: u16,
    cell_size_m: f64,
    osrm_url: String,
    routing_profile: String,
    routing_timeout_ms: u64,
    walking_speed_mps: f64,
    snapshot_file: String,
    profile_file: String,
    compaction_interval_secs: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            bind_address: toml_config.server.bind_address,
            server_port: toml_config.server.port,
            cell_size_m: toml_config.grid.cell_size_m,
            osrm_url: toml_config.routing.osrm_url,
            routing_profile: toml_config.routing.profile,
            routing_timeout_ms: toml_config.routing.timeout_ms,
            walking_speed_mps: toml_config.routing.walking_speed_mps,
            snapshot_file: toml_config.storage.snapshot_file,
            profile_file: toml_config.storage.profile_file,
            compaction_interval_secs: toml_config.compaction.interval_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.cell_size_m.is_finite() && self.cell_size_m > 0.0,
            "grid.cell_size_m must be positive, got {}",
            self.cell_size_m
        );
        anyhow::ensure!(
            self.walking_speed_mps.is_finite() && self.walking_speed_mps > 0.0,
            "routing.walking_speed_mps must be positive, got {}",
            self.walking_speed_mps
        );
        anyhow::ensure!(self.compaction_interval_secs > 0, "compaction.interval_secs must be > 0");
        anyhow::ensure!(self.metrics_interval_secs > 0, "metrics.interval_secs must be > 0");
        Ok(())
    }

    /// Load configuration from `path`, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    pub fn osrm_url(&self) -> &str {
        &self.osrm_url
    }

    pub fn routing_profile(&self) -> &str {
        &self.routing_profile
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn walking_speed_mps(&self) -> f64 {
        self.walking_speed_mps
    }

    pub fn snapshot_file(&self) -> &str {
        &self.snapshot_file
    }

    pub fn profile_file(&self) -> &str {
        &self.profile_file
    }

    pub fn compaction_interval(&self) -> Duration {
        Duration::from_secs(self.compaction_interval_secs)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    // Builder methods for testing

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    pub fn with_storage(mut self, snapshot_file: &str, profile_file: &str) -> Self {
        self.snapshot_file = snapshot_file.to_string();
        self.profile_file = profile_file.to_string();
        self
    }
}
