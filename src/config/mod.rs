//! Configuration module for clustermesh.
//!
//! Handles loading, validation, and hot-reloading of configuration files.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub nodes: Vec<NodeSeedConfig>,
    #[serde(default)]
    pub balancers: Vec<BalancerSeedConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_admin_host")]
    pub admin_host: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            admin_host: default_admin_host(),
            admin_port: default_admin_port(),
        }
    }
}

/// Cluster-wide tuning: how often nodes are probed and how aggressively
/// a consistently-failing node is evicted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// `< 0` disables automatic removal of broken nodes entirely.
    #[serde(default = "default_remove_broken_nodes_ms")]
    pub remove_broken_nodes_ms: i64,
    #[serde(default)]
    pub health_checker: HealthCheckerKind,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            remove_broken_nodes_ms: default_remove_broken_nodes_ms(),
            health_checker: HealthCheckerKind::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthCheckerKind {
    TcpConnect {
        #[serde(default = "default_probe_timeout_ms")]
        timeout_ms: u64,
    },
    HttpPing {
        #[serde(default = "default_ping_path")]
        path: String,
        #[serde(default = "default_probe_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for HealthCheckerKind {
    fn default() -> Self {
        HealthCheckerKind::TcpConnect {
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// One statically-seeded node, registered with the container at
/// startup. Nodes added later via the admin API are not persisted
/// back here — topology persistence across restarts is a non-goal.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSeedConfig {
    pub jvm_route: String,
    pub connection_uri: String,
    pub balancer_name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub hot_standby: bool,
    #[serde(default)]
    pub io_thread: u64,
    #[serde(default = "default_load_factor")]
    pub load_factor: i32,
    #[serde(default)]
    pub contexts: Vec<ContextSeedConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextSeedConfig {
    pub path: String,
    #[serde(default)]
    pub virtual_hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalancerSeedConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub sticky_session: bool,
    #[serde(default = "default_sticky_cookie")]
    pub sticky_session_cookie: String,
    #[serde(default = "default_sticky_path")]
    pub sticky_session_path: String,
    #[serde(default)]
    pub sticky_session_force: bool,
    #[serde(default)]
    pub sticky_session_remove: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
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

fn default_admin_host() -> String {
    "0.0.0.0".to_string()
}
fn default_admin_port() -> u16 {
    9080
}
fn default_health_check_interval_ms() -> u64 {
    10_000
}
fn default_remove_broken_nodes_ms() -> i64 {
    60_000
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_ping_path() -> String {
    "/".to_string()
}
fn default_load_factor() -> i32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_sticky_cookie() -> String {
    "JSESSIONID".to_string()
}
fn default_sticky_path() -> String {
    "jsessionid".to_string()
}
fn default_max_attempts() -> i32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Config {
    /// Load configuration from a file, dispatching on extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("yaml");

        match extension {
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| Error::Config(format!("invalid YAML: {e}")))
            }
            "toml" => toml::from_str(&content).map_err(|e| Error::Config(format!("invalid TOML: {e}"))),
            other => Err(Error::Config(format!("unsupported config format: {other}"))),
        }
    }

    /// Discover and load configuration from standard locations, falling
    /// back to an empty (no seeded nodes) default.
    pub fn discover_and_load() -> Result<Self> {
        let mut search_paths = vec![
            PathBuf::from("clustermesh.yaml"),
            PathBuf::from("clustermesh.toml"),
        ];
        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".clustermesh/config.yaml"));
        }
        search_paths.push(PathBuf::from("/etc/clustermesh/config.yaml"));

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Validate a config file without constructing a `Container` from it.
    pub fn validate_file(path: &Path) -> Result<()> {
        let config = Self::from_file(path)?;
        config.validate()
    }
}
