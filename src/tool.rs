//! Tool system for agents
//!
//! Agents declare their tools as [`ToolSpec`]s. Before each turn the
//! [`ToolAssembler`] binds those specs to the instance the agent resolved to,
//! producing [`BoundTool`]s that the completion service invokes through the
//! [`ToolRouter`](crate::tool_service::ToolRouter). Dispatch goes through the
//! variant tag of each bound tool; caller-defined tools implement [`Tool`].

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

use crate::agent::Agent;
use crate::error::Result;
use crate::handoff::{HandoffQueue, HandoffTool};
use crate::instance::{
    ComputerCommand, EditCommand, InstanceAction, RemoteInstance, ShellCommand,
};

pub const SHELL_TOOL_NAME: &str = "bash";
pub const COMPUTER_TOOL_NAME: &str = "computer";
pub const EDIT_TOOL_NAME: &str = "str_replace_editor";
pub const HANDOFF_TOOL_NAME: &str = "handoff";

/// Result from a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output from the tool
    pub output: Value,
    /// Optional error message if the tool failed
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(output: Value) -> Self {
        Self {
            output,
            error: None,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Trait for caller-defined tools.
#[async_trait]
pub trait Tool: Send + Sync + Debug {
    /// Get the name of the tool
    fn name(&self) -> &str;

    /// Get the description of the tool
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool against the instance the agent is bound to
    async fn invoke(&self, instance: &dyn RemoteInstance, arguments: Value) -> Result<ToolResult>;

    /// Whether this tool lets a worker raise handoff requests. An agent that
    /// carries such a tool gets no built-in handoff tool.
    fn is_handoff(&self) -> bool {
        false
    }
}

/// A tool as declared on an agent, before it is bound to an instance.
#[derive(Debug, Clone)]
pub enum ToolSpec {
    Shell,
    Computer,
    Edit,
    Handoff,
    Custom(Arc<dyn Tool>),
}

impl ToolSpec {
    /// The default set used when an agent declares no tools.
    pub fn defaults() -> Vec<ToolSpec> {
        vec![
            ToolSpec::Shell,
            ToolSpec::Computer,
            ToolSpec::Edit,
            ToolSpec::Handoff,
        ]
    }

    pub fn is_handoff(&self) -> bool {
        match self {
            ToolSpec::Handoff => true,
            ToolSpec::Custom(tool) => tool.is_handoff(),
            _ => false,
        }
    }
}

/// Discriminant of a bound tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Shell,
    Computer,
    Edit,
    Handoff,
    Custom,
}

#[derive(Debug, Clone)]
enum ToolVariant {
    Shell,
    Computer,
    Edit,
    Handoff(HandoffTool),
    Custom(Arc<dyn Tool>),
}

/// A tool bound to the instance of the agent that carries it.
#[derive(Debug, Clone)]
pub struct BoundTool {
    variant: ToolVariant,
    instance: Arc<dyn RemoteInstance>,
}

impl BoundTool {
    pub fn name(&self) -> &str {
        match &self.variant {
            ToolVariant::Shell => SHELL_TOOL_NAME,
            ToolVariant::Computer => COMPUTER_TOOL_NAME,
            ToolVariant::Edit => EDIT_TOOL_NAME,
            ToolVariant::Handoff(_) => HANDOFF_TOOL_NAME,
            ToolVariant::Custom(tool) => tool.name(),
        }
    }

    pub fn description(&self) -> &str {
        match &self.variant {
            ToolVariant::Shell => "Run commands in a bash shell on the instance.",
            ToolVariant::Computer => {
                "Control the mouse and keyboard of the instance and take screenshots."
            }
            ToolVariant::Edit => "View, create and edit files on the instance.",
            ToolVariant::Handoff(tool) => tool.description(),
            ToolVariant::Custom(tool) => tool.description(),
        }
    }

    pub fn parameters_schema(&self) -> Value {
        match &self.variant {
            ToolVariant::Shell => schema_value::<ShellCommand>(),
            ToolVariant::Computer => schema_value::<ComputerCommand>(),
            ToolVariant::Edit => schema_value::<EditCommand>(),
            ToolVariant::Handoff(tool) => tool.parameters_schema(),
            ToolVariant::Custom(tool) => tool.parameters_schema(),
        }
    }

    pub fn kind(&self) -> ToolKind {
        match &self.variant {
            ToolVariant::Shell => ToolKind::Shell,
            ToolVariant::Computer => ToolKind::Computer,
            ToolVariant::Edit => ToolKind::Edit,
            ToolVariant::Handoff(_) => ToolKind::Handoff,
            ToolVariant::Custom(_) => ToolKind::Custom,
        }
    }

    pub fn is_handoff(&self) -> bool {
        match &self.variant {
            ToolVariant::Handoff(_) => true,
            ToolVariant::Custom(tool) => tool.is_handoff(),
            _ => false,
        }
    }

    /// The instance this tool acts on.
    pub fn instance(&self) -> &Arc<dyn RemoteInstance> {
        &self.instance
    }

    /// Invokes the tool. Failures of the instance are reported in the
    /// [`ToolResult`] so the model can react to them.
    pub async fn invoke(&self, arguments: Value) -> Result<ToolResult> {
        debug!(tool = %self.name(), instance_id = %self.instance.id(), "Invoking tool");
        let action = match &self.variant {
            ToolVariant::Shell => decode(SHELL_TOOL_NAME, arguments).map(InstanceAction::Shell),
            ToolVariant::Computer => {
                decode(COMPUTER_TOOL_NAME, arguments).map(InstanceAction::Computer)
            }
            ToolVariant::Edit => decode(EDIT_TOOL_NAME, arguments).map(InstanceAction::Edit),
            ToolVariant::Handoff(tool) => return Ok(tool.invoke(arguments)),
            ToolVariant::Custom(tool) => return tool.invoke(self.instance.as_ref(), arguments).await,
        };

        let action = match action {
            Ok(action) => action,
            Err(result) => return Ok(result),
        };

        match self.instance.execute(action).await {
            Ok(output) => Ok(ToolResult::success(output)),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

fn decode<T: DeserializeOwned>(tool: &str, arguments: Value) -> std::result::Result<T, ToolResult> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolResult::error(format!("Invalid arguments for {tool}: {e}")))
}

/// JSON schema of `T` as a plain value.
pub(crate) fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Builds the per-turn tool list of an agent.
#[derive(Debug, Clone)]
pub struct ToolAssembler {
    queue: HandoffQueue,
}

impl ToolAssembler {
    pub fn new(queue: HandoffQueue) -> Self {
        Self { queue }
    }

    /// Binds the agent's declared tools (or the default set) to `instance`.
    ///
    /// The result always carries exactly one handoff-capable tool: a built-in
    /// one is appended when the agent declares none, and only the first is
    /// kept when it declares several.
    pub fn build(&self, agent: &Agent, instance: Arc<dyn RemoteInstance>) -> Vec<BoundTool> {
        let specs = if agent.tools().is_empty() {
            ToolSpec::defaults()
        } else {
            agent.tools().to_vec()
        };

        let mut tools = Vec::with_capacity(specs.len() + 1);
        let mut has_handoff = false;
        for spec in specs {
            if spec.is_handoff() {
                if has_handoff {
                    continue;
                }
                has_handoff = true;
            }
            tools.push(self.bind(spec, agent, instance.clone()));
        }

        if !has_handoff {
            tools.push(self.bind(ToolSpec::Handoff, agent, instance));
        }
        tools
    }

    fn bind(&self, spec: ToolSpec, agent: &Agent, instance: Arc<dyn RemoteInstance>) -> BoundTool {
        let variant = match spec {
            ToolSpec::Shell => ToolVariant::Shell,
            ToolSpec::Computer => ToolVariant::Computer,
            ToolSpec::Edit => ToolVariant::Edit,
            ToolSpec::Handoff => ToolVariant::Handoff(HandoffTool::new(self.queue.clone(), agent)),
            ToolSpec::Custom(tool) => ToolVariant::Custom(tool),
        };
        BoundTool { variant, instance }
    }
}
