//! Verdict configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VerdictError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerdictConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl VerdictConfig {
    /// Load config from the default path (~/.verdict/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VerdictError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VerdictError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VerdictError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Verdict home directory (~/.verdict).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".verdict")
    }
}

/// Reasoning provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name ("sonar") or "custom:https://my-server.com/v1".
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    /// Override endpoint (empty = provider default).
    #[serde(default)]
    pub endpoint: String,
    /// API key (empty = resolve from environment).
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Read timeout for the completion call.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "sonar".into()
}
fn default_llm_model() -> String {
    "sonar".into()
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_connect_timeout() -> u64 {
    10
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: String::new(),
            api_key: String::new(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Reference (market) data configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Master switch for enrichment. Off by default — evaluations run
    /// un-enriched until an API key is configured.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_market_base_url")]
    pub base_url: String,
    #[serde(default = "default_market_timeout")]
    pub timeout_secs: u64,
    /// How long a symbol validation result stays cached.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Max distinct symbols kept in the validation cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_market_base_url() -> String {
    "https://finnhub.io".into()
}
fn default_market_timeout() -> u64 {
    10
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_cache_capacity() -> usize {
    256
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            base_url: default_market_base_url(),
            timeout_secs: default_market_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Dispatch cadence and worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed dispatch interval in seconds. Ignored when `cron` is set.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Optional 5-field cron cadence, e.g. "*/5 * * * *".
    #[serde(default)]
    pub cron: String,
    /// How far past due a PENDING schedule is still picked up.
    #[serde(default = "default_late_tolerance")]
    pub late_tolerance_mins: i64,
    /// How far ahead of time a schedule may fire.
    #[serde(default = "default_early_tolerance")]
    pub early_tolerance_mins: i64,
    /// Max evaluation workers in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_interval() -> u64 {
    300
}
fn default_late_tolerance() -> i64 {
    5
}
fn default_early_tolerance() -> i64 {
    1
}
fn default_max_concurrent() -> usize {
    8
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            cron: String::new(),
            late_tolerance_mins: default_late_tolerance(),
            early_tolerance_mins: default_early_tolerance(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// SQLite database path (empty = ~/.verdict/verdict.db).
    #[serde(default)]
    pub path: String,
}

impl StoreConfig {
    /// Resolve the database path.
    pub fn db_path(&self) -> PathBuf {
        if self.path.is_empty() {
            VerdictConfig::home_dir().join("verdict.db")
        } else {
            PathBuf::from(&self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VerdictConfig::default();
        assert_eq!(config.scheduler.late_tolerance_mins, 5);
        assert_eq!(config.scheduler.early_tolerance_mins, 1);
        assert_eq!(config.scheduler.max_concurrent, 8);
        assert!(!config.market.enabled);
        assert_eq!(config.llm.provider, "sonar");
    }

    #[test]
    fn test_partial_toml() {
        let config: VerdictConfig = toml::from_str(
            r#"
            [scheduler]
            interval_secs = 60

            [market]
            enabled = true
            api_key = "k"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.interval_secs, 60);
        assert_eq!(config.scheduler.max_concurrent, 8);
        assert!(config.market.enabled);
        assert_eq!(config.market.base_url, "https://finnhub.io");
    }
}
