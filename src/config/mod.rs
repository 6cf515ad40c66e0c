//! Configuration management for binsmith

pub mod schema;

pub use schema::Config;

use crate::error::{BinsmithError, BinsmithResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable overriding `resolver.token`
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Environment variable overriding `storage.token`
pub const STORAGE_TOKEN_ENV: &str = "BINSMITH_STORAGE_TOKEN";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("binsmith")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("binsmith")
    }

    /// Default parent of per-build working directories
    pub fn builds_dir() -> PathBuf {
        Self::state_dir().join("builds")
    }

    /// Default root of the filesystem artifact store
    pub fn artifacts_dir() -> PathBuf {
        Self::state_dir().join("artifacts")
    }

    /// Load configuration, using defaults if the file doesn't exist.
    ///
    /// Token environment variables are applied on top of the file.
    pub async fn load(&self) -> BinsmithResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BinsmithResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BinsmithError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| BinsmithError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> BinsmithResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            BinsmithError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> BinsmithResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BinsmithError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(token) = non_empty_env(GITHUB_TOKEN_ENV) {
        debug!("Using GitHub token from {}", GITHUB_TOKEN_ENV);
        config.resolver.token = Some(token);
    }
    if let Some(token) = non_empty_env(STORAGE_TOKEN_ENV) {
        debug!("Using storage token from {}", STORAGE_TOKEN_ENV);
        config.storage.token = Some(token);
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
