//! # Application Configuration
//!
//! Loads the TOML configuration from the user's config directory
//! (`~/.config/doorlock/config.toml` on Linux). A missing file is replaced by
//! the defaults on first start, so the program works out of the box against
//! the public broker.
//!
//! Validation happens once at startup. A configuration that names no status
//! response topic (key absent or empty), or reuses the command topic for it,
//! stops the program before any connection attempt is made.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::lock::{LockError, LockTopics};

const CONFIG_DIR: &str = "doorlock";
const CONFIG_FILE: &str = "config.toml";

/// `[topics]` is mandatory because the status response topic has no
/// sensible fallback. Every other section may be omitted.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    pub topics: TopicSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub ui: UIConfig,
}

/// Broker endpoint and session parameters.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerSection {
    pub host: String,
    pub port: u16,
    /// WebSocket path. `None` selects a raw MQTT connection.
    pub path: Option<String>,
    pub use_tls: bool,
    pub keep_alive_secs: u64,
    pub client_id_prefix: String,
    /// Fixed client id, bypasses random generation
    pub client_id: Option<String>,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: "mqtt.eclipseprojects.io".to_string(),
            port: 443,
            path: Some("/mqtt".to_string()),
            use_tls: true,
            keep_alive_secs: 30,
            client_id_prefix: "clientID".to_string(),
            client_id: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct TopicSection {
    #[serde(default = "default_command_topic")]
    pub command: String,
    /// Where the actuator answers status requests. Required in the file.
    pub status_response: String,
}

fn default_command_topic() -> String {
    "smartdoorlock".to_string()
}

/// Only used to write the initial config file.
impl Default for TopicSection {
    fn default() -> Self {
        Self {
            command: default_command_topic(),
            status_response: "smartdoorlock/status".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ReconnectSection {
    /// 0 disables reconnecting after a lost session
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct UIConfig {
    pub fullscreen: bool,
    pub fps: u8,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            fullscreen: false,
            fps: 30,
        }
    }
}

impl AppConfig {
    /// Default location inside the platform config directory.
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Writes the defaults to `path` unless a file already exists there.
    pub async fn ensure_default_config(path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            debug!("Using existing config at {}", path.display());
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write default config: {}", e))?;

        info!("Created default config at {}", path.display());
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig =
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Startup preconditions for a usable session.
    pub fn validate(&self) -> Result<(), LockError> {
        let b = &self.broker;
        if b.host.trim().is_empty() {
            return Err(LockError::Config("broker host is empty".to_string()));
        }
        if b.port == 0 {
            return Err(LockError::Config("broker port must not be 0".to_string()));
        }
        if let Some(path) = &b.path {
            if !path.starts_with('/') {
                return Err(LockError::Config(format!(
                    "websocket path '{}' must start with '/'",
                    path
                )));
            }
        }
        if self.topics.command.is_empty() {
            return Err(LockError::Config("command topic is not set".to_string()));
        }
        if self.topics.status_response.is_empty() {
            return Err(LockError::Config(
                "status response topic is not set".to_string(),
            ));
        }
        if self.topics.command == self.topics.status_response {
            return Err(LockError::Config(
                "status response topic must differ from the command topic".to_string(),
            ));
        }
        if self.ui.fps == 0 {
            return Err(LockError::Config("ui fps must not be 0".to_string()));
        }
        Ok(())
    }

    pub fn lock_topics(&self) -> LockTopics {
        LockTopics {
            command: self.topics.command.clone(),
            status_response: self.topics.status_response.clone(),
        }
    }
}
