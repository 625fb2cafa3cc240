//! # Run loop (orientation)
//!
//! A run is a sequence of completion turns, one agent at a time, starting with
//! the orchestrator. Each turn resolves the active agent's instance, binds its
//! tools, drains pending handoff requests, renders the system prompt and
//! invokes the completion service. The returned messages and steps are
//! appended to the run's history.
//!
//! Who goes next:
//! - After an orchestrator turn that produced a plan, the workers the plan
//!   assigned are scheduled in plan order and the first one runs next. A plan
//!   that assigns no known worker ends the run.
//! - After an orchestrator turn without a plan, the orchestrator goes again.
//! - After a worker turn, the next scheduled worker runs, or control returns to
//!   the orchestrator once the schedule is empty.
//!
//! The run stops when the number of added messages reaches `max_turns`, when
//! no agent is left to run, or after `max_turns` consecutive turns that added
//! no messages. Handoff requests drained for an orchestrator turn that never
//! came are put back at the front of the queue for the next run.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::agent::{Affinity, Agent};
use crate::completion::{CompletionRequest, CompletionService};
use crate::error::{Result, SwarmError};
use crate::handoff::{HandoffQueue, HandoffRequest};
use crate::instance::InstanceManager;
use crate::items::Message;
use crate::orchestration::{OrchestrationPlan, OrchestrationProtocol};
use crate::registry::AgentRegistry;
use crate::result::RunResponse;
use crate::tool::ToolAssembler;
use crate::tool_service::ToolRouter;
use crate::usage::Usage;

/// Where a run loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    AwaitingCompletion,
    Dispatching,
    Terminated,
}

/// Per-run inputs.
///
/// ## Example
///
/// ```rust
/// use agent_swarm::{Message, RunOptions};
///
/// let options = RunOptions::new()
///     .with_messages(vec![Message::user("Get the top 3 posts from Hacker News")])
///     .with_context_variable("user", serde_json::json!("ada"))
///     .with_max_turns(5);
/// assert_eq!(options.max_turns, Some(5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Initial history. `None` uses the orchestrator's own messages.
    pub messages: Option<Vec<Message>>,
    /// Overwrites the orchestrator's task prompt before the first turn.
    pub prompt: Option<String>,
    pub context_variables: HashMap<String, Value>,
    /// Cap on added messages. `None` uses the swarm's configured cap.
    pub max_turns: Option<usize>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_context_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context_variables.insert(key.into(), value);
        self
    }

    pub fn with_context_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.context_variables = variables;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }
}

/// Drives the turns of one run over the swarm's components.
pub struct RunLoop<'a> {
    registry: &'a mut AgentRegistry,
    instances: &'a mut InstanceManager,
    queue: &'a HandoffQueue,
    assembler: ToolAssembler,
    completion: &'a dyn CompletionService,
    default_model: &'a str,
    debug: bool,
    state: RunState,
    schedule: VecDeque<String>,
    // requests waiting for the orchestrator's next turn
    held: Vec<HandoffRequest>,
}

impl<'a> RunLoop<'a> {
    pub fn new(
        registry: &'a mut AgentRegistry,
        instances: &'a mut InstanceManager,
        queue: &'a HandoffQueue,
        completion: &'a dyn CompletionService,
        default_model: &'a str,
    ) -> Self {
        Self {
            registry,
            instances,
            queue,
            assembler: ToolAssembler::new(queue.clone()),
            completion,
            default_model,
            debug: false,
            state: RunState::Idle,
            schedule: VecDeque::new(),
            held: Vec::new(),
        }
    }

    /// Logs every received completion at `info` instead of `debug`.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Workers still scheduled to run, in order.
    pub fn schedule(&self) -> Vec<&str> {
        self.schedule.iter().map(String::as_str).collect()
    }

    /// Runs turns starting from `orchestrator` until a termination condition
    /// holds. The options are owned by the run, so the caller's history and
    /// context variables are never touched.
    pub async fn drive(
        &mut self,
        orchestrator: &str,
        options: RunOptions,
        max_turns: usize,
    ) -> Result<RunResponse> {
        let agent = self.registry.lookup(orchestrator).ok_or_else(|| {
            SwarmError::configuration(format!("Unknown agent: {orchestrator}"))
        })?;
        if !agent.is_orchestrator() {
            return Err(SwarmError::configuration(
                "Only the orchestrator agent can be used with run(). Other agents should be \
                 coordinated through the orchestrator agent.",
            ));
        }

        let RunOptions {
            messages,
            prompt,
            context_variables,
            ..
        } = options;
        let messages = messages.unwrap_or_else(|| agent.messages().to_vec());

        if let Some(prompt) = prompt {
            self.registry.assign_prompt(orchestrator, prompt);
        }

        info!(agent = %orchestrator, max_turns, "Starting swarm run");

        self.schedule.clear();
        self.held.clear();
        let outcome = self
            .run_turns(orchestrator, messages, context_variables, max_turns)
            .await;

        self.state = RunState::Terminated;
        if !self.held.is_empty() {
            // the next run's orchestrator turn picks these up
            debug!(pending = self.held.len(), "Returning undelivered handoff requests to the queue");
            self.queue.requeue_front(std::mem::take(&mut self.held));
        }
        outcome
    }

    async fn run_turns(
        &mut self,
        orchestrator: &str,
        mut messages: Vec<Message>,
        context_variables: HashMap<String, Value>,
        max_turns: usize,
    ) -> Result<RunResponse> {
        let init_len = messages.len();
        let mut active = Some(orchestrator.to_string());
        let mut last_agent = orchestrator.to_string();
        let mut steps = Vec::new();
        let mut usage = None;
        let mut output = None;
        let mut total_usage = Usage::empty();
        let mut turns = 0;
        // consecutive turns that added no messages
        let mut idle_turns = 0;

        while messages.len() - init_len < max_turns && idle_turns < max_turns {
            let Some(agent_name) = active.take() else {
                break;
            };
            let agent = self
                .registry
                .lookup(&agent_name)
                .cloned()
                .ok_or_else(|| SwarmError::configuration(format!("Unknown agent: {agent_name}")))?;
            debug!(turn = turns + 1, agent = %agent_name, "Starting turn");

            let request = self.prepare_turn(&agent, &messages).await?;

            self.state = RunState::AwaitingCompletion;
            let result = self
                .completion
                .invoke(request)
                .await
                .map_err(|e| SwarmError::completion(&agent_name, e))?;
            self.state = RunState::Dispatching;
            turns += 1;

            if self.debug {
                info!(agent = %agent_name, messages = result.messages.len(), steps = result.steps.len(), output = ?result.output, "Received completion");
            } else {
                debug!(agent = %agent_name, messages = result.messages.len(), steps = result.steps.len(), "Received completion");
            }

            active = if agent.is_orchestrator() {
                self.after_orchestrator_turn(&agent_name, result.output.as_ref())
            } else {
                Some(
                    self.schedule
                        .pop_front()
                        .unwrap_or_else(|| orchestrator.to_string()),
                )
            };

            if result.messages.is_empty() {
                idle_turns += 1;
                if idle_turns >= max_turns {
                    warn!(agent = %agent_name, idle_turns, "Stopping run after turns that added no messages");
                }
            } else {
                idle_turns = 0;
            }

            total_usage.add_usage(&result.usage);
            messages.extend(result.messages);
            steps.extend(result.steps);
            usage = Some(result.usage);
            output = result.output;
            last_agent = agent_name;
        }

        info!(agent = %last_agent, turns, added = messages.len() - init_len, "Swarm run finished");

        Ok(RunResponse {
            messages: messages.split_off(init_len),
            agent: last_agent,
            context_variables,
            steps,
            usage,
            output,
            total_usage,
            turns,
        })
    }

    async fn prepare_turn(&mut self, agent: &Agent, messages: &[Message]) -> Result<CompletionRequest> {
        let resolution = self.instances.get_or_create(agent.affinity()).await?;
        if resolution.fell_back {
            self.registry.rebind_affinity(agent.name(), Affinity::Shared);
        }

        let tools = ToolRouter::new(self.assembler.build(agent, resolution.instance));

        self.held.extend(self.queue.drain());

        let mut history = messages.to_vec();
        let (system, schema) = if agent.is_orchestrator() {
            let held = std::mem::take(&mut self.held);
            history.extend(HandoffQueue::dispatch(held, self.registry));
            (
                OrchestrationProtocol::build_system_prompt(self.registry),
                Some(agent.schema().cloned().unwrap_or_else(OrchestrationPlan::schema)),
            )
        } else {
            (agent.system().to_string(), agent.schema().cloned())
        };

        Ok(CompletionRequest {
            agent: agent.name().to_string(),
            model: agent.model().unwrap_or(self.default_model).to_string(),
            tools,
            system,
            prompt: agent.prompt().map(str::to_string),
            messages: history,
            schema,
            on_step: agent.on_step().cloned(),
            color: agent.color().to_string(),
        })
    }

    fn after_orchestrator_turn(&mut self, orchestrator: &str, output: Option<&Value>) -> Option<String> {
        let plan = match output.map(OrchestrationPlan::from_output) {
            Some(Some(plan)) => plan,
            Some(None) => {
                warn!(agent = %orchestrator, "Orchestrator output is not a plan");
                return Some(orchestrator.to_string());
            }
            None => return Some(orchestrator.to_string()),
        };

        let outcome = OrchestrationProtocol::apply_plan(self.registry, &plan);
        self.schedule = outcome
            .assigned
            .into_iter()
            .filter(|name| name != orchestrator)
            .collect();

        let next = self.schedule.pop_front();
        match &next {
            Some(worker) => info!(agent = %worker, queued = self.schedule.len(), "Handing control to worker"),
            None => info!(agent = %orchestrator, "Plan assigns no workers, ending run"),
        }
        next
    }
}
