//! # Swarm (orientation)
//!
//! [`Swarm`] is the entry surface: construct it from a roster and the two
//! external services, call [`Swarm::run`] with the orchestrator's name, and
//! release every instance with [`Swarm::teardown`] when done.
//!
//! ```rust
//! use agent_swarm::testing::{InMemoryProvisioner, ScriptedCompletion};
//! use agent_swarm::{Agent, RunOptions, Swarm};
//! use std::sync::Arc;
//!
//! # async fn demo() -> agent_swarm::Result<()> {
//! let mut swarm = Swarm::new(
//!     vec![
//!         Agent::orchestrator("Orchestrator"),
//!         Agent::worker("Browser Agent", "You are a browser automation expert."),
//!     ],
//!     Arc::new(ScriptedCompletion::new()),
//!     Arc::new(InMemoryProvisioner::new()),
//! )?;
//!
//! let response = swarm
//!     .run("Orchestrator", RunOptions::new().with_max_turns(1))
//!     .await?;
//! assert_eq!(response.messages.len(), 1);
//!
//! let report = swarm.teardown().await;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::warn;

use crate::agent::Agent;
use crate::completion::CompletionService;
use crate::config::SwarmConfig;
use crate::error::Result;
use crate::handoff::HandoffQueue;
use crate::instance::{InstanceManager, InstanceProvider, TeardownReport};
use crate::registry::AgentRegistry;
use crate::result::RunResponse;
use crate::runner::{RunLoop, RunOptions};

/// A roster of agents bound to a completion service and a provisioning
/// service.
pub struct Swarm {
    config: SwarmConfig,
    registry: AgentRegistry,
    instances: InstanceManager,
    queue: HandoffQueue,
    completion: Arc<dyn CompletionService>,
}

impl Swarm {
    /// Builds a swarm with the default configuration.
    pub fn new(
        agents: Vec<Agent>,
        completion: Arc<dyn CompletionService>,
        provider: Arc<dyn InstanceProvider>,
    ) -> Result<Self> {
        Self::with_config(agents, completion, provider, SwarmConfig::default())
    }

    /// Builds a swarm. Fails unless the roster has exactly one orchestrator and
    /// unique names.
    pub fn with_config(
        agents: Vec<Agent>,
        completion: Arc<dyn CompletionService>,
        provider: Arc<dyn InstanceProvider>,
        config: SwarmConfig,
    ) -> Result<Self> {
        let registry = AgentRegistry::new(agents)?;
        let instances = InstanceManager::new(
            provider,
            config.instance_kind,
            config.provisioning_timeout,
        );
        Ok(Self {
            config,
            registry,
            instances,
            queue: HandoffQueue::new(),
            completion,
        })
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn instances(&self) -> &InstanceManager {
        &self.instances
    }

    pub fn queue(&self) -> &HandoffQueue {
        &self.queue
    }

    pub fn orchestrator(&self) -> &Agent {
        self.registry.orchestrator()
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.registry.lookup(name)
    }

    /// Runs the swarm starting from the named orchestrator.
    pub async fn run(&mut self, agent: &str, options: RunOptions) -> Result<RunResponse> {
        let max_turns = options.max_turns.unwrap_or(self.config.max_turns);
        let mut run_loop = RunLoop::new(
            &mut self.registry,
            &mut self.instances,
            &self.queue,
            self.completion.as_ref(),
            &self.config.default_model,
        )
        .with_debug(self.config.debug_mode);
        run_loop.drive(agent, options, max_turns).await
    }

    /// Blocking version of [`Swarm::run`].
    pub fn run_sync(&mut self, agent: &str, options: RunOptions) -> Result<RunResponse> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.run(agent, options))
    }

    /// Releases every tracked instance. Failures are logged and reported, never
    /// raised. A second call releases nothing.
    pub async fn teardown(&mut self) -> TeardownReport {
        self.instances.teardown().await
    }
}

impl std::fmt::Debug for Swarm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swarm")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("instances", &self.instances)
            .finish()
    }
}

impl Drop for Swarm {
    fn drop(&mut self) {
        if self.instances.tracked() > 0 {
            warn!(
                instances = ?self.instances.keys(),
                "Swarm dropped without teardown; instances were not released"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::error::SwarmError;
    use crate::testing::{InMemoryProvisioner, ScriptedCompletion};
    use pretty_assertions::assert_eq;

    fn agents() -> Vec<Agent> {
        vec![
            Agent::orchestrator("Orchestrator"),
            Agent::worker("Browser Agent", "b"),
        ]
    }

    #[test]
    fn test_construction_validates_roster() {
        let err = Swarm::new(
            vec![Agent::worker("W", "w")],
            Arc::new(ScriptedCompletion::new()),
            Arc::new(InMemoryProvisioner::new()),
        )
        .unwrap_err();
        assert!(matches!(err, SwarmError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_run_uses_configured_turn_cap_and_model() {
        let completion = Arc::new(ScriptedCompletion::new());
        let config = ConfigBuilder::new().max_turns(2).model("claude-3-5-haiku").build();
        let mut swarm = Swarm::with_config(
            agents(),
            completion.clone(),
            Arc::new(InMemoryProvisioner::new()),
            config,
        )
        .unwrap();

        let response = swarm.run("Orchestrator", RunOptions::new()).await.unwrap();

        assert_eq!(response.turns, 2);
        assert_eq!(completion.requests()[0].model, "claude-3-5-haiku");
        assert_eq!(response.total_usage.request_count, 2);
        assert_eq!(swarm.teardown().await.released.len(), 1);
    }

    #[tokio::test]
    async fn test_caller_state_is_not_mutated() {
        let mut swarm = Swarm::new(
            agents(),
            Arc::new(ScriptedCompletion::new()),
            Arc::new(InMemoryProvisioner::new()),
        )
        .unwrap();

        let history = vec![crate::items::Message::user("hi")];
        let options = RunOptions::new()
            .with_messages(history.clone())
            .with_context_variable("k", serde_json::json!(1))
            .with_max_turns(1);
        let response = swarm.run("Orchestrator", options.clone()).await.unwrap();

        assert_eq!(options.messages, Some(history));
        assert_eq!(response.context_variables.get("k"), Some(&serde_json::json!(1)));
        swarm.teardown().await;
    }

    #[test]
    fn test_run_sync() {
        let mut swarm = Swarm::new(
            agents(),
            Arc::new(ScriptedCompletion::new()),
            Arc::new(InMemoryProvisioner::new()),
        )
        .unwrap();
        let response = swarm
            .run_sync("Orchestrator", RunOptions::new().with_max_turns(1))
            .unwrap();
        assert_eq!(response.agent, "Orchestrator");
    }
}
