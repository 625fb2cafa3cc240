//! Tools as Tower Services.
//!
//! The completion service sees an agent's tools through a [`ToolRouter`]: a
//! cloneable `tower::Service<ToolCall>` that dispatches each call by tool name
//! to the bound tool and answers with a [`ToolOutput`]. Being a plain service,
//! it composes with any tower layer (timeouts, concurrency limits) a completion
//! implementation wants to put in front of tool execution.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tower::Service;
use tracing::debug;

use crate::error::SwarmError;
use crate::items::{ToolCall, ToolOutput};
use crate::tool::{BoundTool, ToolKind};

/// Name and schema of a tool, as advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    /// Function-calling JSON shape.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

/// Dispatches tool calls to the tools bound for one agent turn.
#[derive(Debug, Clone, Default)]
pub struct ToolRouter {
    tools: Arc<Vec<BoundTool>>,
}

impl ToolRouter {
    pub fn new(tools: Vec<BoundTool>) -> Self {
        Self {
            tools: Arc::new(tools),
        }
    }

    pub fn tools(&self) -> &[BoundTool] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(BoundTool::name).collect()
    }

    pub fn find(&self, name: &str) -> Option<&BoundTool> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn has_kind(&self, kind: ToolKind) -> bool {
        self.tools.iter().any(|tool| tool.kind() == kind)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// Dispatches one call. Convenience over the `Service` impl for callers
    /// that hold the router by reference.
    pub async fn dispatch(&self, call: ToolCall) -> Result<ToolOutput, SwarmError> {
        let tool = self
            .find(&call.name)
            .cloned()
            .ok_or_else(|| SwarmError::UnknownTool {
                name: call.name.clone(),
            })?;

        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        let result = tool.invoke(call.arguments).await?;
        Ok(ToolOutput {
            tool_call_id: call.id,
            tool_name: call.name,
            output: result.output,
            error: result.error,
        })
    }
}

impl Service<ToolCall> for ToolRouter {
    type Response = ToolOutput;
    type Error = SwarmError;
    type Future = BoxFuture<'static, Result<ToolOutput, SwarmError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: ToolCall) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { router.dispatch(call).await })
    }
}
