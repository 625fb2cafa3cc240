//! # Agent (orientation)
//!
//! An `Agent` is one member of a swarm roster: a name, a role (the single
//! orchestrator or a worker), the affinity key naming the remote instance it
//! drives, its prompts and the tools it declares. Agents are built with the
//! `with_*` methods below and then handed to a [`Swarm`](crate::Swarm), whose
//! [`AgentRegistry`](crate::AgentRegistry) owns them from then on. The only
//! post-construction mutations (task prompt, affinity rebinding) go through
//! the registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::items::{Message, Step};
use crate::tool::{Tool, ToolSpec};

/// Affinity key naming the instance shared by every agent that asks for it.
pub const SHARED_AFFINITY: &str = "shared";

/// System prompt for agents that do not bring their own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You have access to an Ubuntu virtual machine with \
internet access. You can run shell commands, edit files, and control the mouse and keyboard \
to use graphical applications, including a web browser. Take a screenshot before acting on \
the screen, verify the result of each action, and report what you accomplished when the task \
is complete.";

/// Cosmetic display tags handed out to agents without an explicit one.
pub const AGENT_COLORS: [&str; 6] = ["91", "92", "93", "94", "95", "96"];

/// Presentation callback invoked once per intermediate completion step.
pub type StepCallback = Arc<dyn Fn(&Step) + Send + Sync>;

/// Role of an agent within the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Orchestrator,
    Worker,
}

/// Which remote instance an agent runs against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Affinity {
    /// The swarm-wide shared instance, started lazily.
    #[default]
    Shared,
    /// A specific, already provisioned instance.
    Instance(String),
}

impl Affinity {
    /// The affinity key as used by the instance manager.
    pub fn key(&self) -> &str {
        match self {
            Affinity::Shared => SHARED_AFFINITY,
            Affinity::Instance(id) => id,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, Affinity::Shared)
    }
}

impl From<&str> for Affinity {
    fn from(key: &str) -> Self {
        if key == SHARED_AFFINITY {
            Affinity::Shared
        } else {
            Affinity::Instance(key.to_string())
        }
    }
}

impl From<String> for Affinity {
    fn from(key: String) -> Self {
        Affinity::from(key.as_str())
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Defines the complete configuration for an [`Agent`].
#[derive(Clone)]
pub struct AgentConfig {
    /// Unique name within the roster, used for lookup and in logs.
    pub name: String,

    /// Whether this agent coordinates the swarm or works in it.
    pub role: AgentRole,

    /// The instance this agent drives.
    pub affinity: Affinity,

    /// Model identifier passed to the completion service. `None` means the
    /// swarm's configured default.
    pub model: Option<String>,

    /// Worker system prompt. The orchestrator's system prompt is rendered from
    /// the roster on every turn instead.
    pub system: String,

    /// The current task prompt. Reassigned by orchestration plans.
    pub prompt: Option<String>,

    /// Declared tools. An empty list means the default computer-use set.
    pub tools: Vec<ToolSpec>,

    /// The agent's own conversation history, used to seed a run when the
    /// caller supplies none.
    pub messages: Vec<Message>,

    /// Optional JSON schema constraining the completion's structured output.
    pub schema: Option<Value>,

    /// Presentation callback for intermediate steps.
    pub on_step: Option<StepCallback>,

    /// Cosmetic display tag (an ANSI color code).
    pub color: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Agent".to_string(),
            role: AgentRole::Worker,
            affinity: Affinity::Shared,
            model: None,
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt: None,
            tools: Vec::new(),
            messages: Vec::new(),
            schema: None,
            on_step: None,
            color: None,
        }
    }
}

/// A roster member of a swarm.
///
/// ## Example
///
/// ```rust
/// use agent_swarm::{Agent, AgentRole, ToolSpec};
///
/// let browser = Agent::worker(
///     "Browser Agent",
///     "You are a browser automation expert.",
/// )
/// .with_prompt("Go to news.ycombinator.com and get the top 3 posts")
/// .with_tool(ToolSpec::Shell);
///
/// assert_eq!(browser.role(), AgentRole::Worker);
/// assert_eq!(browser.affinity().key(), "shared");
/// assert_eq!(browser.tools().len(), 1);
/// ```
#[derive(Clone)]
pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    /// Creates a new agent with the given configuration.
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Creates the coordinating agent of a swarm.
    pub fn orchestrator(name: impl Into<String>) -> Self {
        Self::new(AgentConfig {
            name: name.into(),
            role: AgentRole::Orchestrator,
            ..Default::default()
        })
    }

    /// Creates a worker with the given system prompt.
    pub fn worker(name: impl Into<String>, system: impl Into<String>) -> Self {
        Self::new(AgentConfig {
            name: name.into(),
            system: system.into(),
            ..Default::default()
        })
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.config.role = role;
        self
    }

    /// Binds the agent to an affinity key (`"shared"` or an instance id).
    pub fn with_affinity(mut self, affinity: impl Into<Affinity>) -> Self {
        self.config.affinity = affinity.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.config.system = system.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.config.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    /// Adds a caller-defined tool.
    pub fn with_custom_tool(self, tool: Arc<dyn Tool>) -> Self {
        self.with_tool(ToolSpec::Custom(tool))
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.config.messages = messages;
        self
    }

    /// Sets the output schema for the agent to enforce structured output.
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.config.schema = Some(schema);
        self
    }

    pub fn with_on_step(mut self, on_step: impl Fn(&Step) + Send + Sync + 'static) -> Self {
        self.config.on_step = Some(Arc::new(on_step));
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.config.color = Some(color.into());
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn role(&self) -> AgentRole {
        self.config.role
    }

    pub fn is_orchestrator(&self) -> bool {
        self.config.role == AgentRole::Orchestrator
    }

    pub fn affinity(&self) -> &Affinity {
        &self.config.affinity
    }

    pub fn model(&self) -> Option<&str> {
        self.config.model.as_deref()
    }

    pub fn system(&self) -> &str {
        &self.config.system
    }

    pub fn prompt(&self) -> Option<&str> {
        self.config.prompt.as_deref()
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.config.tools
    }

    pub fn messages(&self) -> &[Message] {
        &self.config.messages
    }

    pub fn schema(&self) -> Option<&Value> {
        self.config.schema.as_ref()
    }

    pub fn on_step(&self) -> Option<&StepCallback> {
        self.config.on_step.as_ref()
    }

    /// The display tag, falling back to a color derived from the name.
    pub fn color(&self) -> &str {
        match &self.config.color {
            Some(color) => color,
            None => {
                let idx = self.config.name.bytes().map(usize::from).sum::<usize>();
                AGENT_COLORS[idx % AGENT_COLORS.len()]
            }
        }
    }

    pub(crate) fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.config.prompt = Some(prompt.into());
    }

    pub(crate) fn set_affinity(&mut self, affinity: Affinity) {
        self.config.affinity = affinity;
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("role", &self.config.role)
            .field("affinity", &self.config.affinity)
            .field("model", &self.config.model)
            .field("prompt", &self.config.prompt)
            .field("tools_count", &self.config.tools.len())
            .finish()
    }
}
