//! Result types for swarm runs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::items::{Message, Step};
use crate::usage::Usage;

/// The result of a swarm run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    /// Messages added by the run, beyond the initial history
    pub messages: Vec<Message>,
    /// Name of the agent that took the last turn
    pub agent: String,
    /// The run's own copy of the caller's context variables
    pub context_variables: HashMap<String, Value>,
    /// Every step of every turn, in order
    pub steps: Vec<Step>,
    /// Usage of the final completion
    pub usage: Option<Usage>,
    /// Structured output of the final completion
    pub output: Option<Value>,
    /// Usage summed across all turns
    pub total_usage: Usage,
    /// Number of completion turns taken
    pub turns: usize,
}

impl RunResponse {
    /// Text of the last assistant message, if any.
    pub fn last_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::items::Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Decodes the final structured output into `T`.
    pub fn output_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.output
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}
