use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::core_types::CategoryId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// PostgreSQL pool and transaction bounds
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Extra attempts when the pool times out handing out a connection
    #[serde(default = "default_acquire_retries")]
    pub acquire_retries: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    20
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_acquire_retries() -> u32 {
    2
}

fn default_lock_timeout_ms() -> u64 {
    3_000
}

fn default_statement_timeout_ms() -> u64 {
    10_000
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            acquire_retries: default_acquire_retries(),
            lock_timeout_ms: default_lock_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Failed-attempt lockout policy
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LockoutConfig {
    pub threshold: i32,
    pub duration_secs: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration_secs: 15 * 60,
        }
    }
}

/// Categories and thread types that can never have a companion
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PairingConfig {
    #[serde(default)]
    pub excluded_category_ids: Vec<CategoryId>,
    #[serde(default = "default_excluded_thread_types")]
    pub excluded_thread_types: Vec<String>,
}

fn default_excluded_thread_types() -> Vec<String> {
    vec!["NPT".to_string()]
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            excluded_category_ids: Vec::new(),
            excluded_thread_types: default_excluded_thread_types(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub scan_interval_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 300,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditConfig {
    pub channel_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 4096,
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}
