//! Configuration management for Bdash.
//!
//! Handles loading configuration from a TOML file and environment variables:
//! sharing credentials, engine options and the configured data sources.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::engine::EngineOptions;
use crate::error::{BdashError, Result};
use crate::model::{BdashServerSetting, DataSource, DataSourceId, GithubSetting, Setting};

/// Environment variable for the GitHub access token.
pub const ENV_GITHUB_TOKEN: &str = "BDASH_GITHUB_TOKEN";
/// Environment variable for the Bdash Server access token.
pub const ENV_BDASH_SERVER_TOKEN: &str = "BDASH_SERVER_TOKEN";
/// Environment variable for the Bdash Server base URL.
pub const ENV_BDASH_SERVER_URL: &str = "BDASH_SERVER_URL";

/// Main configuration structure for Bdash.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Data source used for new queries; falls back to the first one.
    #[serde(default)]
    pub default_data_source_id: Option<DataSourceId>,

    #[serde(default)]
    pub github: GithubSetting,

    #[serde(default)]
    pub bdash_server: BdashServerSetting,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub data_sources: Vec<DataSource>,
}

/// Execution engine settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Cancel runs after this many seconds. Unset waits forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bdash")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| BdashError::config(format!("Failed to read config file: {e}")))?;

        let config = Self::parse_toml(&content, path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            BdashError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Checks values that serde cannot: URLs and data source ids.
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = self.bdash_server.base_url() {
            let url = Url::parse(base_url).map_err(|e| {
                BdashError::config(format!("Invalid bdash_server.base_url '{base_url}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(BdashError::config(format!(
                    "Invalid bdash_server.base_url '{base_url}': expected an http or https URL"
                )));
            }
        }

        if let Some(api_url) = self.github.api_url.as_deref() {
            Url::parse(api_url).map_err(|e| {
                BdashError::config(format!("Invalid github.api_url '{api_url}': {e}"))
            })?;
        }

        if self.engine.timeout_secs == Some(0) {
            return Err(BdashError::config(
                "engine.timeout_secs must be at least 1; leave it unset for no timeout",
            ));
        }

        let mut seen = HashSet::new();
        for ds in &self.data_sources {
            if !seen.insert(ds.id) {
                return Err(BdashError::config(format!(
                    "Duplicate data source id {} ('{}')",
                    ds.id, ds.name
                )));
            }
        }

        if let Some(id) = self.default_data_source_id {
            if !seen.contains(&id) {
                warn!(
                    data_source_id = %id,
                    "default_data_source_id does not match a data source, using the first one"
                );
            }
        }

        Ok(())
    }

    /// Applies `BDASH_*` environment variables to values the file leaves unset.
    pub fn apply_env_defaults(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.github.token().is_none() {
            if let Some(token) = lookup(ENV_GITHUB_TOKEN) {
                self.github.token = Some(token);
            }
        }
        if self.bdash_server.token().is_none() {
            if let Some(token) = lookup(ENV_BDASH_SERVER_TOKEN) {
                self.bdash_server.token = Some(token);
            }
        }
        if self.bdash_server.base_url().is_none() {
            if let Some(url) = lookup(ENV_BDASH_SERVER_URL) {
                self.bdash_server.base_url = Some(url);
            }
        }
    }

    /// Settings consumed by query creation and sharing.
    pub fn setting(&self) -> Setting {
        Setting {
            default_data_source_id: self.default_data_source_id,
            github: self.github.clone(),
            bdash_server: self.bdash_server.clone(),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            timeout: self.engine.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn data_source(&self, id: DataSourceId) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.id == id)
    }
}
