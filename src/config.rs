//! Configuration loading for the watcher.
//!
//! Precedence: explicit `--config` path, then `~/.briefwatch/config.yaml` if
//! it exists, then the embedded default. `BRIEFWATCH_BASE_URL` and
//! `BRIEFWATCH_EVENTS_ADDR` override the service section after loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum polling cadence. The fallback poller must stay polite even when
/// a config asks for something faster.
const MIN_POLL_INTERVAL_MS: u64 = 250;
const MIN_RECONNECT_BASE_MS: u64 = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub sync: SyncTuning,
    #[serde(default)]
    pub cost: CostModel,
    /// Directory for the JSONL event log. Unset disables the log.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL of the orchestration HTTP API.
    pub base_url: String,
    /// `host:port` of the push event listener.
    pub events_addr: String,
}

/// Knobs for the synchronization loop. All fields have defaults so a minimal
/// config can omit the section entirely.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncTuning {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl SyncTuning {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_base(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_reconnect_base_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    15000
}

/// Token pricing for the estimated cost readout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CostModel {
    #[serde(default = "default_usd_per_1k_tokens")]
    pub usd_per_1k_tokens: f64,
}

impl CostModel {
    pub fn estimate(&self, tokens: u64) -> f64 {
        (tokens as f64 / 1000.0) * self.usd_per_1k_tokens
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            usd_per_1k_tokens: default_usd_per_1k_tokens(),
        }
    }
}

fn default_usd_per_1k_tokens() -> f64 {
    0.015
}

impl Config {
    /// Loads configuration with the documented precedence and applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::home_config_path() {
                Some(home_path) if home_path.exists() => Self::from_file(&home_path)?,
                _ => Self::default_config(),
            },
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))
    }

    /// Built-in defaults shipped in the binary.
    pub fn default_config() -> Self {
        const DEFAULT_CONFIG_YAML: &str = include_str!("../briefwatch.yaml");

        serde_yaml::from_str(DEFAULT_CONFIG_YAML)
            .expect("Failed to parse embedded briefwatch.yaml - this is a bug in the briefwatch.yaml file")
    }

    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".briefwatch").join("config.yaml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(base_url) = std::env::var("BRIEFWATCH_BASE_URL") {
            if !base_url.is_empty() {
                self.service.base_url = base_url;
            }
        }
        if let Ok(events_addr) = std::env::var("BRIEFWATCH_EVENTS_ADDR") {
            if !events_addr.is_empty() {
                self.service.events_addr = events_addr;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.service.base_url.starts_with("http://")
            && !self.service.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "service.base_url must start with http:// or https://, got '{}'",
                self.service.base_url
            );
        }

        if self.service.events_addr.is_empty() {
            anyhow::bail!("service.events_addr must not be empty");
        }

        if self.sync.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            anyhow::bail!(
                "sync.poll_interval_ms must be at least {} ms, got {}",
                MIN_POLL_INTERVAL_MS,
                self.sync.poll_interval_ms
            );
        }

        if self.sync.connect_timeout_ms == 0 {
            anyhow::bail!("sync.connect_timeout_ms must not be zero");
        }

        if self.sync.reconnect_base_ms < MIN_RECONNECT_BASE_MS {
            anyhow::bail!(
                "sync.reconnect_base_ms must be at least {} ms, got {}",
                MIN_RECONNECT_BASE_MS,
                self.sync.reconnect_base_ms
            );
        }

        if self.sync.reconnect_max_ms < self.sync.reconnect_base_ms {
            anyhow::bail!(
                "sync.reconnect_max_ms ({}) must not be below sync.reconnect_base_ms ({})",
                self.sync.reconnect_max_ms,
                self.sync.reconnect_base_ms
            );
        }

        if self.cost.usd_per_1k_tokens < 0.0 {
            anyhow::bail!("cost.usd_per_1k_tokens must not be negative");
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
