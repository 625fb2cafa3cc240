//! Error types for the swarm runtime

use thiserror::Error;
use tower::BoxError;

/// Result type alias for the swarm runtime
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Main error type for the swarm runtime
#[derive(Debug, Error)]
pub enum SwarmError {
    /// The roster or a run request is malformed. Never retried.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The provisioning service failed to create or list instances.
    #[error("Provisioning error: {message}")]
    Provisioning {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The completion service failed while serving a turn.
    #[error("Completion error for agent {agent}: {message}")]
    Completion {
        agent: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The completion service asked for a tool the agent does not carry
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SwarmError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wraps a provisioning-service failure.
    pub fn provisioning(message: impl Into<String>, source: BoxError) -> Self {
        Self::Provisioning {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn completion(agent: impl Into<String>, source: BoxError) -> Self {
        Self::Completion {
            agent: agent.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }
}
