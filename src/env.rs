// src/env.rs
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dotenv::dotenv;

use crate::config::EngineConfig;

pub const CONFIG_PATH_VAR: &str = "RABBIT_TX_CONFIG";
pub const CHANNEL_PREFIX_VAR: &str = "RABBIT_TX_CHANNEL_PREFIX";
pub const COMMAND_BUFFER_VAR: &str = "RABBIT_TX_COMMAND_BUFFER";
pub const LOG_FILTER_VAR: &str = "RABBIT_TX_LOG";

/// Settings that can come from the environment (or a `.env` file).
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EnvOverrides {
    pub config_path: Option<PathBuf>,
    pub channel_prefix: Option<String>,
    pub command_buffer: Option<usize>,
    pub log_filter: Option<String>,
}

impl EnvOverrides {
    /// Reads overrides from the process environment after loading `.env`.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_vars(&vars)
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).filter(|value| !value.trim().is_empty()).cloned();

        let command_buffer = match get(COMMAND_BUFFER_VAR) {
            Some(val) => Some(
                val.trim()
                    .parse::<usize>()
                    .context(format!("{COMMAND_BUFFER_VAR} must be a positive integer, got {val:?}"))?,
            ),
            None => None,
        };

        Ok(EnvOverrides {
            config_path: get(CONFIG_PATH_VAR).map(PathBuf::from),
            channel_prefix: get(CHANNEL_PREFIX_VAR),
            command_buffer,
            log_filter: get(LOG_FILTER_VAR),
        })
    }

    /// Applies the overrides on top of a file-based configuration.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(prefix) = &self.channel_prefix {
            config.channel.id_prefix = prefix.clone();
        }
        if let Some(buffer) = self.command_buffer {
            config.channel.command_buffer = buffer;
        }
        if let Some(filter) = &self.log_filter {
            config.logging.filter = filter.clone();
        }
    }
}
