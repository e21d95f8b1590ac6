//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub http: HttpConfig,

    /// Stream generation settings
    pub stream: StreamConfig,

    /// Storage locations
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration with fallback chain, then apply environment
    /// overrides (`HTTP_PORT`, `TEST_MODE`).
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // An explicitly given config path must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: monkeyd.yml
        let local_config = PathBuf::from("monkeyd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/monkeyd/monkeyd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("monkeyd").join("monkeyd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("HTTP_PORT") {
            match port.parse() {
                Ok(port) => self.http.port = port,
                Err(_) => tracing::warn!(%port, "ignoring unparseable HTTP_PORT"),
            }
        }
        if let Ok(mode) = std::env::var("TEST_MODE") {
            self.stream.test_mode = mode != "false";
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen port
    pub port: u16,

    /// Bind address
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 5500,
            bind: "0.0.0.0".to_string(),
        }
    }
}

/// Stream generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Adds the synthetic baseline audience when on
    #[serde(rename = "test-mode")]
    pub test_mode: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { test_mode: true }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the file-backed document store
    #[serde(rename = "data-dir")]
    pub data_dir: String,

    /// Newline-delimited dictionary file
    #[serde(rename = "dictionary-path")]
    pub dictionary_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".monkeyd".to_string(),
            dictionary_path: "data/words.txt".to_string(),
        }
    }
}
