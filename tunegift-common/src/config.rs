//! Configuration loading
//!
//! Resolution priority for every value: environment variable, then TOML
//! config file, then compiled default. API keys are expected via environment
//! in production; the TOML file is convenient for development.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// One external provider endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

/// Service configuration, loaded from TOML with env overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file path
    pub database_path: Option<String>,
    /// HTTP bind address, e.g. "127.0.0.1:5710"
    pub bind_address: Option<String>,
    /// LLM lyrics provider
    #[serde(default)]
    pub lyrics: ProviderConfig,
    /// Music-generation provider
    #[serde(default)]
    pub music: ProviderConfig,
    /// Stem-separation provider
    #[serde(default)]
    pub stems: ProviderConfig,
    /// Durable storage endpoint for separated stems
    #[serde(default)]
    pub storage: ProviderConfig,
    /// Publicly reachable base URL of this service, used to build the
    /// webhook callback URLs handed to providers
    pub public_url: Option<String>,
    /// Notification collaborator URL (fire-and-forget POSTs)
    pub notify_url: Option<String>,
    /// Poll sweep interval in seconds
    pub poll_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration: TUNEGIFT_CONFIG path, else platform config dir,
    /// else defaults. Environment overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut config = if let Ok(path) = std::env::var("TUNEGIFT_CONFIG") {
            Self::load_from(&PathBuf::from(path))?
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                Self::load_from(&default_path)?
            } else {
                Config::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read config failed ({}): {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse config failed ({}): {}", path.display(), e)))
    }

    /// Environment variables win over TOML values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TUNEGIFT_DATABASE_PATH") {
            self.database_path = Some(v);
        }
        if let Ok(v) = std::env::var("TUNEGIFT_BIND_ADDRESS") {
            self.bind_address = Some(v);
        }
        if let Ok(v) = std::env::var("TUNEGIFT_LYRICS_API_KEY") {
            if self.lyrics.api_key.is_some() {
                warn!("Lyrics API key found in both environment and TOML; using environment");
            }
            self.lyrics.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("TUNEGIFT_MUSIC_API_KEY") {
            if self.music.api_key.is_some() {
                warn!("Music API key found in both environment and TOML; using environment");
            }
            self.music.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("TUNEGIFT_STEMS_API_KEY") {
            self.stems.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("TUNEGIFT_PUBLIC_URL") {
            self.public_url = Some(v);
        }
        if let Ok(v) = std::env::var("TUNEGIFT_NOTIFY_URL") {
            self.notify_url = Some(v);
        }
    }

    /// Callback URL for a webhook path, if the public URL is configured
    pub fn callback_url(&self, path: &str) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')))
    }

    /// Database path with OS-dependent default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("tunegift.db"))
    }

    pub fn bind_address(&self) -> String {
        self.bind_address.clone().unwrap_or_else(|| "127.0.0.1:5710".to_string())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(180))
    }
}

/// Default configuration file path for the platform
fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("tunegift").join("tunegift-gen.toml"))
        .unwrap_or_else(|| PathBuf::from("tunegift-gen.toml"))
}

/// Default data directory for the platform
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tunegift"))
        .unwrap_or_else(|| PathBuf::from("./tunegift_data"))
}
