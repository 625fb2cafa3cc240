//! Completion service abstraction
//!
//! The model invocation itself lives outside this crate. A
//! [`CompletionService`] receives one [`CompletionRequest`] per agent turn,
//! runs the model (dispatching tool calls through the request's
//! [`ToolRouter`]) and returns a [`CompletionResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::BoxError;
use tracing::debug;

use crate::agent::StepCallback;
use crate::items::{Message, Step};
use crate::tool_service::ToolRouter;
use crate::usage::Usage;

/// Everything a completion needs for one agent turn.
#[derive(Clone)]
pub struct CompletionRequest {
    /// Name of the agent taking the turn
    pub agent: String,
    pub model: String,
    pub tools: ToolRouter,
    pub system: String,
    pub prompt: Option<String>,
    /// History the completion continues from
    pub messages: Vec<Message>,
    /// Structured-output schema
    pub schema: Option<Value>,
    pub on_step: Option<StepCallback>,
    /// Display tag of the agent
    pub color: String,
}

impl CompletionRequest {
    /// Reports an intermediate step. Falls back to a debug event when the
    /// agent has no step callback.
    pub fn emit_step(&self, step: &Step) {
        match &self.on_step {
            Some(on_step) => on_step(step),
            None => {
                if let Some(text) = &step.text {
                    debug!(agent = %self.agent, color = %self.color, text = %text, "Assistant step");
                }
                for call in &step.tool_calls {
                    debug!(
                        agent = %self.agent,
                        color = %self.color,
                        tool = %call.name,
                        args = %call.arguments,
                        "Tool call step"
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("agent", &self.agent)
            .field("model", &self.model)
            .field("tools", &self.tools.names())
            .field("prompt", &self.prompt)
            .field("messages", &self.messages.len())
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

/// What one completion produced. Never modified after it is returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub messages: Vec<Message>,
    pub steps: Vec<Step>,
    pub usage: Usage,
    /// Structured output, present when a schema was requested and honoured.
    pub output: Option<Value>,
}

impl CompletionResult {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// The external completion service.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Runs one completion turn. Errors are propagated to the caller of the
    /// run and never retried.
    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResult, BoxError>;
}
