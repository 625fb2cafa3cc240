//! # Agent registry
//!
//! The registry is the sole owner of the roster. It enforces that exactly one
//! agent holds the orchestrator role and that names are unique, and it is the
//! only place agent records are mutated after construction.

use std::collections::HashSet;

use tracing::debug;

use crate::agent::{Affinity, Agent};
use crate::error::{Result, SwarmError};

/// The swarm roster.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
    orchestrator: usize,
}

impl AgentRegistry {
    /// Builds a registry, failing unless exactly one agent is the orchestrator.
    pub fn new(agents: Vec<Agent>) -> Result<Self> {
        let mut seen = HashSet::new();
        for agent in &agents {
            if !seen.insert(agent.name()) {
                return Err(SwarmError::configuration(format!(
                    "Duplicate agent name: {}",
                    agent.name()
                )));
            }
        }

        let orchestrators: Vec<usize> = agents
            .iter()
            .enumerate()
            .filter(|(_, agent)| agent.is_orchestrator())
            .map(|(idx, _)| idx)
            .collect();

        let orchestrator = match orchestrators.as_slice() {
            [] => {
                return Err(SwarmError::configuration(
                    "Swarm requires exactly one orchestrator agent",
                ))
            }
            [idx] => *idx,
            _ => {
                return Err(SwarmError::configuration(
                    "Cannot have multiple orchestrator agents",
                ))
            }
        };

        Ok(Self {
            agents,
            orchestrator,
        })
    }

    pub fn orchestrator(&self) -> &Agent {
        &self.agents[self.orchestrator]
    }

    pub fn lookup(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.name() == name)
    }

    /// Overwrites the task prompt of the named agent. Returns `false` when no
    /// such agent exists.
    pub fn assign_prompt(&mut self, name: &str, prompt: impl Into<String>) -> bool {
        match self.agents.iter_mut().find(|agent| agent.name() == name) {
            Some(agent) => {
                agent.set_prompt(prompt);
                debug!(agent = %name, "Assigned prompt");
                true
            }
            None => false,
        }
    }

    /// Rebinds the named agent to a different affinity key.
    pub(crate) fn rebind_affinity(&mut self, name: &str, affinity: Affinity) -> bool {
        match self.agents.iter_mut().find(|agent| agent.name() == name) {
            Some(agent) => {
                agent.set_affinity(affinity);
                true
            }
            None => false,
        }
    }

    /// All non-orchestrator agents, in roster order.
    pub fn workers(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|agent| !agent.is_orchestrator())
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.workers().map(|agent| agent.name().to_string()).collect()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
