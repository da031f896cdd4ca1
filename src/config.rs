// src/config.rs
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Result, Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, debug};

pub const CONFIG_FILE_NAME: &str = "RustRabbitTx.json";

// Configuration structures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub channel: ChannelSettings,
    #[serde(default)]
    pub queues: QueueSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Channel ids are `<id_prefix>-<n>`
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    /// Commands a managed channel queues before senders wait
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueueSettings {
    /// Queues declared when the engine starts
    #[serde(default)]
    pub declare: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default values
fn default_id_prefix() -> String { "channel".to_string() }
fn default_command_buffer() -> usize { 64 }
fn default_log_filter() -> String { "info".to_string() }

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: default_log_filter() }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel.id_prefix.trim().is_empty() {
            return Err(anyhow!("Configuration error: channel.id_prefix cannot be empty"));
        }
        if self.channel.command_buffer == 0 {
            return Err(anyhow!("Configuration error: channel.command_buffer must be at least 1"));
        }
        if let Some(name) = self.queues.declare.iter().find(|name| name.trim().is_empty()) {
            return Err(anyhow!("Configuration error: invalid queue name {:?} in queues.declare", name));
        }
        Ok(())
    }
}

// Configuration loading and management functions
pub fn find_config_file() -> Result<PathBuf> {
    // Check various locations
    let config_dir_file = Path::new("config").join(CONFIG_FILE_NAME);
    let locations = [
        ("Current directory", Path::new(CONFIG_FILE_NAME).to_path_buf()),
        ("Config directory", config_dir_file),
    ];

    for (location_name, path) in locations.iter() {
        if path.exists() {
            debug!("Found config file in {}: {}", location_name, path.display());
            return Ok(path.clone());
        }
    }

    // Try the user's home directory
    if let Some(home_dir) = home::home_dir() {
        let home_config = home_dir.join(format!(".{CONFIG_FILE_NAME}"));
        if home_config.exists() {
            debug!("Found config file in home directory: {}", home_config.display());
            return Ok(home_config);
        }
    }

    Err(anyhow!("Could not find {} in the current directory, ./config or your home directory", CONFIG_FILE_NAME))
}

pub fn load_config() -> Result<EngineConfig> {
    let config_path = find_config_file()?;
    load_config_from(&config_path)
}

pub fn load_config_from(config_path: &Path) -> Result<EngineConfig> {
    let config_content = fs::read_to_string(config_path)
        .context(format!("Failed to read config file at {}", config_path.display()))?;

    let config: EngineConfig = serde_json::from_str(&config_content)
        .context("Configuration file contains invalid JSON or mistyped fields")?;

    config.validate()?;
    Ok(config)
}

pub fn create_default_config_file(path: &Path) -> Result<()> {
    let default_config = EngineConfig {
        queues: QueueSettings {
            declare: vec!["Transactions".to_string()],
        },
        ..EngineConfig::default()
    };

    let json = serde_json::to_string_pretty(&default_config)
        .context("Failed to serialize default configuration")?;

    // Create parent directories if they don't exist
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory at {}", parent.display()))?;
        }
    }

    fs::write(path, json)
        .context(format!("Failed to write configuration to {}", path.display()))?;

    info!("Created default configuration file at: {}", path.display());
    Ok(())
}
