//! Application configuration management.
//!
//! Configuration is stored at `~/.config/partysync/config.json`. The server
//! URL and acting user can be overridden with `PARTYSYNC_SERVER_URL` and
//! `PARTYSYNC_USER` (a `.env` file is honored by the binary).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVER_URL};
use crate::cache::{StalenessPolicy, DEFAULT_COOLDOWN_SECS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "partysync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_SERVER_URL: &str = "PARTYSYNC_SERVER_URL";
pub const ENV_USER: &str = "PARTYSYNC_USER";

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS as u64
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_cooldown_secs")]
    pub refresh_cooldown_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub persist_cache: bool,
    #[serde(default)]
    pub current_user: Option<String>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            refresh_cooldown_secs: default_cooldown_secs(),
            request_timeout_secs: default_timeout_secs(),
            persist_cache: true,
            current_user: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults if absent), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_SERVER_URL).filter(|s| !s.trim().is_empty()) {
            self.server_url = url;
        }
        if let Some(user) = lookup(ENV_USER).filter(|s| !s.trim().is_empty()) {
            self.current_user = Some(user);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy::from_secs(self.refresh_cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"current_user":"alice"}"#).unwrap();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.refresh_cooldown_secs, 30);
        assert!(config.persist_cache);
        assert_eq!(config.current_user.as_deref(), Some("alice"));
        assert_eq!(config.staleness_policy(), StalenessPolicy::default());
    }

    #[test]
    fn test_huge_cooldown_does_not_panic() {
        let config: Config = serde_json::from_str(r#"{"refresh_cooldown_secs":18446744073709551615}"#).unwrap();
        assert!(config.staleness_policy().cooldown() > chrono::Duration::days(365));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            ENV_SERVER_URL => Some("http://localhost:8080".to_string()),
            ENV_USER => Some("".to_string()),
            _ => None,
        });
        assert_eq!(config.server_url, "http://localhost:8080");
        assert!(config.current_user.is_none());
    }
}
