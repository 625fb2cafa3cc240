//! # Orchestration protocol
//!
//! The orchestrator never acts on an instance itself. On each of its turns it
//! gets a system prompt rendered from the current roster and answers with an
//! [`OrchestrationPlan`]: one prompt assignment per worker. Applying the plan
//! overwrites the named workers' task prompts in the registry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::registry::AgentRegistry;
use crate::tool::schema_value;

fn default_priority() -> u32 {
    1
}

/// One prompt assignment of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskAssignment {
    /// Name of the agent receiving the prompt
    pub agent_name: String,
    /// The exact instructions for the agent
    pub prompt: String,
    /// Higher number means higher priority. Advisory only.
    #[serde(default = "default_priority")]
    pub priority: u32,
}

impl TaskAssignment {
    pub fn new(agent_name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            prompt: prompt.into(),
            priority: default_priority(),
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }
}

/// The orchestrator's structured plan for task distribution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OrchestrationPlan {
    /// The original task being broken down
    #[serde(default)]
    pub overall_task: String,
    /// Assignments, in the order they should run
    pub task_assignments: Vec<TaskAssignment>,
    /// Additional notes about execution or coordination
    #[serde(default)]
    pub execution_notes: String,
}

impl OrchestrationPlan {
    pub fn new(overall_task: impl Into<String>) -> Self {
        Self {
            overall_task: overall_task.into(),
            ..Default::default()
        }
    }

    pub fn with_assignment(mut self, assignment: TaskAssignment) -> Self {
        self.task_assignments.push(assignment);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.execution_notes = notes.into();
        self
    }

    /// JSON schema handed to the completion service for orchestrator turns.
    pub fn schema() -> Value {
        schema_value::<OrchestrationPlan>()
    }

    /// Decodes a structured output. `None` when it is not a plan.
    pub fn from_output(output: &Value) -> Option<Self> {
        serde_json::from_value(output.clone()).ok()
    }
}

/// What applying a plan did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    /// Agents whose prompt was overwritten, in plan order, without repeats.
    pub assigned: Vec<String>,
    /// Assignments naming no known agent.
    pub skipped: Vec<String>,
}

/// Stateless rendering and application of orchestration plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestrationProtocol;

impl OrchestrationProtocol {
    /// Renders the orchestrator's system prompt from the current roster.
    pub fn build_system_prompt(registry: &AgentRegistry) -> String {
        let agent_info = registry
            .workers()
            .map(|agent| format!("  - {}: {}", agent.name(), agent.prompt().unwrap_or("None")))
            .collect::<Vec<_>>()
            .join("\n");

        format!("{ORCHESTRATOR_PREAMBLE}\n\n<AGENTS>\n{agent_info}\n</AGENTS>\n\n{ORCHESTRATOR_OUTPUT}")
    }

    /// Overwrites the prompt of every agent the plan names. Unknown names are
    /// skipped. Priorities are not acted upon.
    pub fn apply_plan(registry: &mut AgentRegistry, plan: &OrchestrationPlan) -> PlanOutcome {
        let mut outcome = PlanOutcome::default();
        for assignment in &plan.task_assignments {
            if registry.assign_prompt(&assignment.agent_name, assignment.prompt.clone()) {
                if !outcome.assigned.contains(&assignment.agent_name) {
                    outcome.assigned.push(assignment.agent_name.clone());
                }
            } else {
                debug!(agent = %assignment.agent_name, "Skipping assignment for unknown agent");
                outcome.skipped.push(assignment.agent_name.clone());
            }
        }
        info!(
            assigned = outcome.assigned.len(),
            skipped = outcome.skipped.len(),
            "Applied orchestration plan"
        );
        outcome
    }
}

const ORCHESTRATOR_PREAMBLE: &str = "You are the Orchestrator Agent, the central coordinator \
of a swarm of AI agents working together on computer tasks. You will be given a task and a list \
of agents with their capabilities. Your role is to:

1. TASK ANALYSIS & DELEGATION
- Break down complex tasks into smaller, manageable subtasks
- Identify which specialized agent is best suited for each subtask based on their name and prompt
- Maintain awareness of each agent's capabilities and current status

2. COORDINATION & OVERSIGHT
- Monitor task progress through agent communications
- Handle handoff requests between agents
- Ensure tasks are completed efficiently and in the correct order
- Prevent redundant work or conflicts between agents

3. COMMUNICATION PROTOCOL
- When receiving a task, first analyze and break it down
- For each subtask, specify:
  * The exact prompt/instructions for the agent
  * Required tools and resources
  * Expected outcomes and success criteria
  * Dependencies on other subtasks

4. DECISION MAKING
- When handling handoff requests, consider:
  * The requesting agent's reason for handoff
  * The suggested agent's suitability
  * Current workload of all agents
  * Task dependencies and priorities

5. PROBLEM SOLVING
- Identify potential bottlenecks or conflicts
- Suggest alternative approaches when agents face difficulties
- Adapt the task distribution based on agent feedback";

const ORCHESTRATOR_OUTPUT: &str = "For each task, you must output a structured plan using the \
Orchestrator schema, which includes:
- The overall task description
- Specific task assignments for each agent, including:
  * The exact prompt/instructions
  * Priority level
- Any additional execution notes or coordination requirements

Return an empty list of task assignments once the task is complete.

Remember: You are the orchestrator of the swarm. Your decisions should optimize for efficient \
task completion while maintaining clear communication and coordination between all agents.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(vec![
            Agent::orchestrator("Orchestrator").with_prompt("Summarize HN"),
            Agent::worker("Browser Agent", "b").with_prompt("Browse"),
            Agent::worker("Coder", "c"),
        ])
        .unwrap()
    }

    #[test]
    fn test_system_prompt_lists_workers_only() {
        let prompt = OrchestrationProtocol::build_system_prompt(&registry());
        assert!(prompt.contains("1. TASK ANALYSIS & DELEGATION"));
        assert!(prompt.contains("5. PROBLEM SOLVING"));
        assert!(prompt.contains("<AGENTS>\n  - Browser Agent: Browse\n  - Coder: None\n</AGENTS>"));
        assert!(!prompt.contains("Summarize HN"));
        assert!(prompt.contains("structured plan"));
    }

    #[test]
    fn test_apply_plan_reassigns_prompts() {
        let mut registry = registry();
        let plan = OrchestrationPlan::new("Get the top posts")
            .with_assignment(TaskAssignment::new("Browser Agent", "p1"))
            .with_assignment(TaskAssignment::new("Ghost", "p2"))
            .with_assignment(TaskAssignment::new("Browser Agent", "p3").with_priority(2));

        let outcome = OrchestrationProtocol::apply_plan(&mut registry, &plan);

        assert_eq!(outcome.assigned, vec!["Browser Agent".to_string()]);
        assert_eq!(outcome.skipped, vec!["Ghost".to_string()]);
        assert_eq!(registry.lookup("Browser Agent").and_then(|a| a.prompt()), Some("p3"));
        assert!(OrchestrationProtocol::build_system_prompt(&registry).contains("Browser Agent: p3"));
    }

    #[test]
    fn test_plan_decoding_defaults() {
        let plan = OrchestrationPlan::from_output(&json!({
            "task_assignments": [{"agent_name": "Coder", "prompt": "p1"}]
        }))
        .unwrap();
        assert_eq!(plan.task_assignments[0].priority, 1);
        assert_eq!(plan.overall_task, "");

        assert!(OrchestrationPlan::from_output(&json!({"posts": []})).is_none());
        assert!(OrchestrationPlan::from_output(&json!("done")).is_none());
    }

    #[test]
    fn test_plan_schema_names_fields() {
        let schema = OrchestrationPlan::schema();
        assert!(schema["properties"]["task_assignments"].is_object());
        assert!(schema["properties"]["execution_notes"].is_object());
    }
}
