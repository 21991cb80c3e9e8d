//! Service configuration.
//!
//! Loaded from a JSON file (path from `ASHARE_SCREENER_CONFIG`, default
//! `screener.json`); a missing file yields the defaults. Secrets can be
//! supplied through the environment instead of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::screener::PipelineConfig;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "ASHARE_SCREENER_CONFIG";
/// Environment override for the tushare token
pub const TUSHARE_TOKEN_ENV: &str = "TUSHARE_TOKEN";
/// Environment override for the advisory API key
pub const ADVISORY_KEY_ENV: &str = "ADVISORY_API_KEY";

// ============================================================================
// Main Configuration
// ============================================================================

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub screener: PipelineConfig,

    #[serde(default)]
    pub auto_refresh: AutoRefreshConfig,

    #[serde(default)]
    pub advisory: AdvisoryConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from disk plus environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "screener.json".to_string());
        let mut config = if Path::new(&path).exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path))?;
            let config: Config = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path))?;
            info!(path = path.as_str(), "configuration loaded");
            config
        } else {
            info!(path = path.as_str(), "config file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment secrets take precedence over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(TUSHARE_TOKEN_ENV) {
            if !token.is_empty() {
                self.data.tushare_token = Some(token);
            }
        }
        if let Ok(key) = std::env::var(ADVISORY_KEY_ENV) {
            if !key.is_empty() {
                self.advisory.api_key = Some(key);
            }
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4450
}

// ============================================================================
// Data Providers
// ============================================================================

/// Provider chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Provider names in failover order
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    /// Tushare Pro API token; the tushare provider is skipped without one
    #[serde(default)]
    pub tushare_token: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            tushare_token: None,
        }
    }
}

fn default_providers() -> Vec<String> {
    vec![
        "eastmoney".to_string(),
        "tushare".to_string(),
        "tencent".to_string(),
    ]
}

// ============================================================================
// Auto Refresh
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRefreshConfig {
    /// Start the auto-refresh loop at boot
    #[serde(default)]
    pub enabled: bool,

    /// Sleep between auto cycles
    #[serde(default = "default_auto_interval")]
    pub interval_secs: u64,
}

impl Default for AutoRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_auto_interval(),
        }
    }
}

fn default_auto_interval() -> u64 {
    300
}

// ============================================================================
// Advisory
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    /// Chat-completion endpoint
    #[serde(default = "default_advisory_url")]
    pub api_url: String,

    /// API key; the advisory facade answers neutrally without one
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_advisory_model")]
    pub model: String,

    #[serde(default = "default_advisory_timeout")]
    pub timeout_secs: u64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            api_url: default_advisory_url(),
            api_key: None,
            model: default_advisory_model(),
            timeout_secs: default_advisory_timeout(),
        }
    }
}

fn default_advisory_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".to_string()
}

fn default_advisory_model() -> String {
    "deepseek-chat".to_string()
}

fn default_advisory_timeout() -> u64 {
    20
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default tracing filter; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Tests
// ============================================================================
