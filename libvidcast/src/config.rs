//! Configuration management for Vidcast

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub media: MediaConfig,
    pub scheduling: Option<SchedulingConfig>,
    pub youtube: Option<PlatformConfig>,
    pub instagram: Option<PlatformConfig>,
    pub tiktok: Option<PlatformConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Paths to the external media tools used for probing and conditioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Seconds between scheduler polls (default: 60)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_poll_interval() -> u64 {
    60
}

/// Configuration for one platform target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub enabled: bool,
    /// Override for the platform API base URL; defaults to the production
    /// endpoint of the adapter.
    pub api_base: Option<String>,
    /// Accounts by logical name, e.g. "personal" or "charity".
    #[serde(default)]
    pub accounts: HashMap<String, AccountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// File holding the account's access token.
    pub token_file: String,
    /// Remote user/channel ID, required by platforms that address media
    /// endpoints by user (Instagram).
    pub user_id: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/vidcast/uploads.db".to_string(),
            },
            media: MediaConfig::default(),
            scheduling: Some(SchedulingConfig {
                poll_interval: default_poll_interval(),
            }),
            youtube: None,
            instagram: None,
            tiktok: None,
        }
    }

    /// Poll interval in seconds, falling back to the default when no
    /// scheduling section is present.
    pub fn poll_interval(&self) -> u64 {
        self.scheduling
            .as_ref()
            .map(|s| s.poll_interval)
            .unwrap_or_else(default_poll_interval)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("VIDCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("vidcast").join("config.toml"))
}
