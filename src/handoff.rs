//! # Worker handoffs
//!
//! Workers cannot transfer control directly. Instead a worker calls its
//! handoff tool, which appends a [`HandoffRequest`] to the swarm's
//! [`HandoffQueue`]. The run loop drains the queue before every turn and turns
//! each request into a notification message for the orchestrator, which then
//! decides what happens next (reassign, tell the worker to continue, or put the
//! task on hold) by emitting a new plan.
//!
//! ```rust
//! use agent_swarm::{HandoffQueue, HandoffRequest};
//!
//! let queue = HandoffQueue::new();
//! queue.enqueue(HandoffRequest::new(
//!     "Browser Agent",
//!     "Page requires a login",
//!     "Sign in to the admin console",
//! ));
//! assert_eq!(queue.len(), 1);
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::items::Message;
use crate::registry::AgentRegistry;
use crate::tool::{schema_value, ToolResult, HANDOFF_TOOL_NAME};

/// Kind tag every processable queue entry carries.
pub const HANDOFF_REQUEST_KIND: &str = "handoff_request";

const HANDOFF_DESCRIPTION: &str = "Hand off a task to another agent or notify the \
orchestrator agent about task status. Use this when you think another agent would be better \
suited for the current task, or when you need to coordinate with other agents.";

/// A request raised by a worker for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub from_agent: String,
    pub reason: String,
    pub task_description: String,
    pub suggested_agent: Option<String>,
    pub requires_response: bool,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl HandoffRequest {
    pub fn new(
        from_agent: impl Into<String>,
        reason: impl Into<String>,
        task_description: impl Into<String>,
    ) -> Self {
        Self {
            kind: HANDOFF_REQUEST_KIND.to_string(),
            from_agent: from_agent.into(),
            reason: reason.into(),
            task_description: task_description.into(),
            suggested_agent: None,
            requires_response: false,
            context: BTreeMap::new(),
        }
    }

    pub fn with_suggested_agent(mut self, agent: impl Into<String>) -> Self {
        self.suggested_agent = Some(agent.into());
        self
    }

    pub fn with_requires_response(mut self, requires_response: bool) -> Self {
        self.requires_response = requires_response;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn is_processable(&self) -> bool {
        self.kind == HANDOFF_REQUEST_KIND
    }

    /// Renders the request as a notification for the orchestrator.
    pub fn notification(&self, available_agents: &[String]) -> Message {
        let context = serde_json::to_string(&self.context).unwrap_or_else(|_| "{}".to_string());
        Message::user(format!(
            "Handoff request from {from}:\n\
             Reason: {reason}\n\
             Task: {task}\n\
             Suggested Agent: {suggested}\n\
             Requires Response: {requires}\n\
             Additional Context: {context}\n\
             \n\
             Available Agents: {available:?}\n\
             \n\
             Please decide how to handle this request. You can:\n\
             1. Assign it to the suggested agent\n\
             2. Assign it to a different agent\n\
             3. Tell the original agent to continue\n\
             4. Put the task on hold pending other work",
            from = self.from_agent,
            reason = self.reason,
            task = self.task_description,
            suggested = self.suggested_agent.as_deref().unwrap_or("None"),
            requires = self.requires_response,
            available = available_agents,
        ))
    }
}

/// Arguments of the handoff tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HandoffParameters {
    /// Why the agent wants to hand off the task
    pub reason: String,
    /// Description of the task to be handed off
    pub task_description: String,
    /// Name of the agent suggested to handle the task
    #[serde(default)]
    pub suggested_agent: Option<String>,
    /// Whether the agent needs a response about the task
    #[serde(default)]
    pub requires_response: bool,
    /// Any additional context needed for the task
    #[serde(default)]
    pub context: Option<BTreeMap<String, Value>>,
}

/// FIFO of pending handoff requests, shared between the run loop and the
/// handoff tools of the current turn.
#[derive(Debug, Clone, Default)]
pub struct HandoffQueue {
    inner: Arc<Mutex<VecDeque<HandoffRequest>>>,
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HandoffRequest>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, request: HandoffRequest) {
        debug!(from_agent = %request.from_agent, "Queued handoff request");
        self.lock().push_back(request);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the pending requests, oldest first.
    pub fn pending(&self) -> Vec<HandoffRequest> {
        self.lock().iter().cloned().collect()
    }

    /// Empties the queue in FIFO order, keeping the processable requests.
    /// Other entries are dropped.
    pub fn drain(&self) -> Vec<HandoffRequest> {
        let drained: Vec<HandoffRequest> = self.lock().drain(..).collect();
        drained
            .into_iter()
            .filter(|request| {
                let processable = request.is_processable();
                if !processable {
                    warn!(kind = %request.kind, from_agent = %request.from_agent, "Discarding queue entry");
                }
                processable
            })
            .collect()
    }

    /// Puts undelivered requests back ahead of anything queued since, keeping
    /// their order.
    pub fn requeue_front(&self, requests: Vec<HandoffRequest>) {
        if requests.is_empty() {
            return;
        }
        debug!(count = requests.len(), "Requeued undelivered handoff requests");
        let mut queue = self.lock();
        for request in requests.into_iter().rev() {
            queue.push_front(request);
        }
    }

    /// Renders requests as notifications for the orchestrator.
    pub fn dispatch(requests: Vec<HandoffRequest>, registry: &AgentRegistry) -> Vec<Message> {
        if requests.is_empty() {
            return Vec::new();
        }
        let available = registry.worker_names();
        requests
            .iter()
            .map(|request| request.notification(&available))
            .collect()
    }

    /// Empties the queue in FIFO order, rendering each processable request as a
    /// notification for the orchestrator. Other entries are dropped.
    pub fn drain_and_dispatch(&self, registry: &AgentRegistry) -> Vec<Message> {
        Self::dispatch(self.drain(), registry)
    }
}

/// The handoff tool bound to one agent.
#[derive(Debug, Clone)]
pub struct HandoffTool {
    queue: HandoffQueue,
    agent_name: String,
    from_orchestrator: bool,
}

impl HandoffTool {
    pub fn new(queue: HandoffQueue, agent: &Agent) -> Self {
        Self {
            queue,
            agent_name: agent.name().to_string(),
            from_orchestrator: agent.is_orchestrator(),
        }
    }

    pub fn name(&self) -> &str {
        HANDOFF_TOOL_NAME
    }

    pub fn description(&self) -> &str {
        HANDOFF_DESCRIPTION
    }

    pub fn parameters_schema(&self) -> Value {
        schema_value::<HandoffParameters>()
    }

    /// Enqueues a request on behalf of the bound worker. The orchestrator is
    /// refused.
    pub fn invoke(&self, arguments: Value) -> ToolResult {
        let params: HandoffParameters = match serde_json::from_value(arguments) {
            Ok(params) => params,
            Err(e) => return ToolResult::error(format!("Invalid arguments for handoff: {e}")),
        };

        if self.from_orchestrator {
            let message = "Orchestrator agent cannot hand off tasks";
            return ToolResult {
                output: json!({"status": "error", "message": message}),
                error: Some(message.to_string()),
            };
        }

        let request = HandoffRequest {
            kind: HANDOFF_REQUEST_KIND.to_string(),
            from_agent: self.agent_name.clone(),
            reason: params.reason,
            task_description: params.task_description,
            suggested_agent: params.suggested_agent,
            requires_response: params.requires_response,
            context: params.context.unwrap_or_default(),
        };
        let payload = serde_json::to_value(&request).unwrap_or(Value::Null);
        self.queue.enqueue(request);

        ToolResult::success(json!({
            "status": "success",
            "message": "Task handoff request sent to orchestrator agent",
            "request": payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(vec![
            Agent::orchestrator("Orchestrator"),
            Agent::worker("Browser Agent", "b"),
            Agent::worker("Coder", "c"),
        ])
        .unwrap()
    }

    #[test]
    fn test_request_serializes_kind_as_type() {
        let request = HandoffRequest::new("Coder", "stuck", "install deps")
            .with_context("attempts", json!(3));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "handoff_request");
        assert_eq!(value["context"], json!({"attempts": 3}));
        assert_eq!(value["suggested_agent"], Value::Null);
    }

    #[test]
    fn test_notification_text() {
        let request = HandoffRequest::new("Coder", "needs a browser", "read the docs page")
            .with_suggested_agent("Browser Agent")
            .with_requires_response(true);
        let message = request.notification(&["Browser Agent".to_string(), "Coder".to_string()]);

        assert_eq!(message.role, crate::items::Role::User);
        assert!(message.content.starts_with("Handoff request from Coder:"));
        assert!(message.content.contains("Suggested Agent: Browser Agent"));
        assert!(message.content.contains("Requires Response: true"));
        assert!(message.content.contains(r#"Available Agents: ["Browser Agent", "Coder"]"#));
        assert!(message.content.contains("4. Put the task on hold pending other work"));

        let message = HandoffRequest::new("Coder", "r", "t").notification(&[]);
        assert!(message.content.contains("Suggested Agent: None"));
    }

    #[test]
    fn test_drain_is_fifo_and_discards_foreign_entries() {
        let queue = HandoffQueue::new();
        queue.enqueue(HandoffRequest::new("Coder", "first", "t1"));
        let mut foreign = HandoffRequest::new("Coder", "ignored", "t2");
        foreign.kind = "status_update".to_string();
        queue.enqueue(foreign);
        queue.enqueue(HandoffRequest::new("Browser Agent", "second", "t3"));

        let messages = queue.drain_and_dispatch(&registry());
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Reason: first"));
        assert!(messages[1].content.contains("Reason: second"));
        assert!(queue.is_empty());
        assert!(queue.drain_and_dispatch(&registry()).is_empty());
    }

    #[test]
    fn test_requeue_front_keeps_order_ahead_of_new_entries() {
        let queue = HandoffQueue::new();
        queue.enqueue(HandoffRequest::new("Coder", "first", "t1"));
        queue.enqueue(HandoffRequest::new("Coder", "second", "t2"));
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);

        queue.enqueue(HandoffRequest::new("Browser Agent", "third", "t3"));
        queue.requeue_front(drained);

        let reasons: Vec<String> = queue.pending().into_iter().map(|r| r.reason).collect();
        assert_eq!(reasons, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_worker_handoff_enqueues_request() {
        let queue = HandoffQueue::new();
        let tool = HandoffTool::new(queue.clone(), &Agent::worker("Coder", "c"));

        let result = tool.invoke(json!({
            "reason": "needs a browser",
            "task_description": "read the docs",
            "suggested_agent": "Browser Agent",
        }));
        assert!(!result.is_error());
        assert_eq!(result.output["status"], "success");
        assert_eq!(result.output["request"]["from_agent"], "Coder");

        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].suggested_agent.as_deref(), Some("Browser Agent"));
        assert!(!pending[0].requires_response);
        assert!(pending[0].context.is_empty());
    }

    #[test]
    fn test_orchestrator_cannot_hand_off() {
        let queue = HandoffQueue::new();
        let tool = HandoffTool::new(queue.clone(), &Agent::orchestrator("Orchestrator"));

        let result = tool.invoke(json!({"reason": "r", "task_description": "t"}));
        assert_eq!(result.error.as_deref(), Some("Orchestrator agent cannot hand off tasks"));
        assert_eq!(result.output["status"], "error");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        let queue = HandoffQueue::new();
        let tool = HandoffTool::new(queue.clone(), &Agent::worker("Coder", "c"));
        let result = tool.invoke(json!({"reason": "missing task"}));
        assert!(result.is_error());
        assert!(queue.is_empty());
    }
}
