//! Configuration for a swarm
//!
//! Provides defaults for model selection, turn caps and instance provisioning.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::instance::InstanceKind;

/// Swarm-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Model used for agents that do not name one
    pub default_model: String,

    /// Turn cap applied when a run does not pass its own
    pub max_turns: usize,

    /// Budget handed to the provisioning service when starting an instance
    pub provisioning_timeout: Duration,

    /// Kind of instance started for the shared affinity key
    pub instance_kind: InstanceKind,

    /// Enable debug logging of every completion
    pub debug_mode: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            default_model: "claude-3-7-sonnet".to_string(),
            max_turns: 10,
            provisioning_timeout: Duration::from_secs(60 * 60),
            instance_kind: InstanceKind::Ubuntu,
            debug_mode: false,
        }
    }
}

/// Configuration builder
pub struct ConfigBuilder {
    config: SwarmConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SwarmConfig::default(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn max_turns(mut self, turns: usize) -> Self {
        self.config.max_turns = turns;
        self
    }

    pub fn provisioning_timeout(mut self, timeout: Duration) -> Self {
        self.config.provisioning_timeout = timeout;
        self
    }

    pub fn instance_kind(mut self, kind: InstanceKind) -> Self {
        self.config.instance_kind = kind;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug_mode = enabled;
        self
    }

    pub fn build(self) -> SwarmConfig {
        self.config
    }
}

/// Load configuration from environment variables
pub fn from_env() -> SwarmConfig {
    let mut config = SwarmConfig::default();

    if let Ok(model) = std::env::var("SWARM_MODEL") {
        config.default_model = model;
    }

    if let Ok(turns) = std::env::var("SWARM_MAX_TURNS") {
        if let Ok(turns) = turns.parse::<usize>() {
            config.max_turns = turns;
        }
    }

    if let Ok(timeout) = std::env::var("SWARM_PROVISION_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.provisioning_timeout = Duration::from_secs(secs);
        }
    }

    if let Ok(debug) = std::env::var("SWARM_DEBUG") {
        config.debug_mode = debug.to_lowercase() == "true" || debug == "1";
    }

    config
}

/// Load configuration from a TOML file. Missing keys keep their defaults.
pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<SwarmConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: SwarmConfig = toml::from_str(&contents)?;
    Ok(config)
}
