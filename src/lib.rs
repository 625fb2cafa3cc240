//! # Agent swarms for computer-use tasks
//!
//! A swarm is a fixed roster of agents: exactly one orchestrator and any number
//! of workers. The agents take turns invoking an external completion service,
//! each bound to a remote compute instance. The orchestrator breaks a task down
//! into per-worker prompt assignments; workers carry them out and can raise
//! handoff requests back to the orchestrator.
//!
//! ## Core Concepts
//!
//! - **Agent**: a roster member with a role, an affinity key naming its
//!   instance, prompts and declared tools
//! - **AgentRegistry**: owns the roster and enforces the single-orchestrator rule
//! - **InstanceManager**: resolves affinity keys to instances, with a fallback
//!   to the shared instance, and owns teardown
//! - **ToolAssembler**: binds each agent's tools to its instance, always with
//!   exactly one handoff tool
//! - **HandoffQueue**: FIFO of worker handoff requests for the orchestrator
//! - **OrchestrationProtocol**: renders the orchestrator prompt and applies its
//!   plans
//! - **RunLoop**: drives the turns
//!
//! The completion service and the provisioning service are traits
//! ([`CompletionService`], [`InstanceProvider`]); [`testing`] has scripted
//! in-memory versions of both.
//!
//! ## Getting Started
//!
//! ```rust
//! use agent_swarm::testing::{InMemoryProvisioner, ScriptedCompletion};
//! use agent_swarm::{Agent, OrchestrationPlan, RunOptions, Swarm, TaskAssignment};
//! use std::sync::Arc;
//!
//! # async fn example() -> agent_swarm::Result<()> {
//! let plan = OrchestrationPlan::new("Summarize Hacker News")
//!     .with_assignment(TaskAssignment::new("Browser Agent", "Get the top 3 posts"));
//! let completion = ScriptedCompletion::new().with_plan(serde_json::to_value(plan)?);
//!
//! let mut swarm = Swarm::new(
//!     vec![
//!         Agent::orchestrator("Orchestrator"),
//!         Agent::worker("Browser Agent", "You are a browser automation expert."),
//!     ],
//!     Arc::new(completion),
//!     Arc::new(InMemoryProvisioner::new()),
//! )?;
//!
//! let response = swarm
//!     .run("Orchestrator", RunOptions::new().with_max_turns(2))
//!     .await?;
//! assert_eq!(response.agent, "Browser Agent");
//! swarm.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod completion;
pub mod config;
pub mod error;
pub mod handoff;
pub mod instance;
pub mod items;
pub mod orchestration;
pub mod registry;
pub mod result;
pub mod runner;
pub mod swarm;
pub mod testing;
pub mod tool;
pub mod tool_service;
pub mod usage;

pub use agent::{Affinity, Agent, AgentConfig, AgentRole, StepCallback, SHARED_AFFINITY};
pub use completion::{CompletionRequest, CompletionResult, CompletionService};
pub use config::{ConfigBuilder, SwarmConfig};
pub use error::{Result, SwarmError};
pub use handoff::{HandoffParameters, HandoffQueue, HandoffRequest, HandoffTool};
pub use instance::{
    BrowserControl, ComputerCommand, EditCommand, InstanceAction, InstanceKind, InstanceManager,
    InstanceProvider, InstanceStatus, ReleaseStage, RemoteInstance, Resolution, ShellCommand,
    TeardownFailure, TeardownReport,
};
pub use items::{Message, Role, Step, ToolCall, ToolOutput};
pub use orchestration::{OrchestrationPlan, OrchestrationProtocol, PlanOutcome, TaskAssignment};
pub use registry::AgentRegistry;
pub use result::RunResponse;
pub use runner::{RunLoop, RunOptions, RunState};
pub use swarm::Swarm;
pub use tool::{BoundTool, Tool, ToolAssembler, ToolKind, ToolResult, ToolSpec};
pub use tool_service::{ToolDescriptor, ToolRouter};
pub use usage::Usage;
