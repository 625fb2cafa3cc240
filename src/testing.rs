//! Scripted doubles for the external services.
//!
//! [`ScriptedCompletion`] stands in for the completion service and
//! [`InMemoryProvisioner`] for the provisioning service. Both record what they
//! were asked to do, so tests (and offline demos) can assert on the exact
//! sequence of turns and releases.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tower::BoxError;

use crate::completion::{CompletionRequest, CompletionResult, CompletionService};
use crate::instance::{
    BrowserControl, InstanceAction, InstanceKind, InstanceProvider, InstanceStatus,
    RemoteInstance,
};
use crate::items::{Message, Step, ToolCall};
use crate::usage::Usage;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A completion service that replays queued results.
///
/// Once the queue is empty every call returns the default result: a single
/// assistant message.
pub struct ScriptedCompletion {
    results: Mutex<VecDeque<CompletionResult>>,
    default_result: CompletionResult,
    execute_tools: bool,
    failure: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            default_result: CompletionResult::new(vec![Message::assistant("Default response")])
                .with_usage(Usage::new(10, 5)),
            execute_tools: false,
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(self, result: CompletionResult) -> Self {
        lock(&self.results).push_back(result);
        self
    }

    pub fn with_message(self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.with_result(
            CompletionResult::new(vec![Message::assistant(content.clone())])
                .with_step(Step::text(content))
                .with_usage(Usage::new(10, 5)),
        )
    }

    /// Queues a result carrying `plan` as structured output.
    pub fn with_plan(self, plan: Value) -> Self {
        self.with_result(
            CompletionResult::new(vec![Message::assistant(plan.to_string())])
                .with_usage(Usage::new(10, 5))
                .with_output(plan),
        )
    }

    /// Queues a result whose single step calls `tool_name`.
    pub fn with_tool_call(self, tool_name: impl Into<String>, args: Value) -> Self {
        let call = ToolCall::new(tool_name, args);
        self.with_result(
            CompletionResult::new(vec![Message::assistant_with_tool_calls(
                "",
                vec![call.clone()],
            )])
            .with_step(Step::tool_calls(vec![call]))
            .with_usage(Usage::new(10, 5)),
        )
    }

    /// Replaces the result returned once the queue is exhausted.
    pub fn with_default_result(mut self, result: CompletionResult) -> Self {
        self.default_result = result;
        self
    }

    /// Dispatches every scripted tool call through the request's router.
    pub fn executing_tools(mut self) -> Self {
        self.execute_tools = true;
        self
    }

    /// Makes every invocation fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.results).len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn invoke(&self, request: CompletionRequest) -> Result<CompletionResult, BoxError> {
        lock(&self.requests).push(request.clone());
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }

        let mut result = lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| self.default_result.clone());

        for step in &mut result.steps {
            if self.execute_tools {
                for call in step.tool_calls.clone() {
                    step.tool_results.push(request.tools.dispatch(call).await?);
                }
            }
            request.emit_step(step);
        }
        Ok(result)
    }
}

#[derive(Debug, Default)]
struct InMemoryBrowser {
    stopped: AtomicBool,
    failure: Option<String>,
}

#[async_trait]
impl BrowserControl for InMemoryBrowser {
    async fn stop(&self) -> Result<(), BoxError> {
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// An instance that records actions instead of running them.
#[derive(Debug)]
pub struct InMemoryInstance {
    id: String,
    browser: Option<Arc<InMemoryBrowser>>,
    stop_failure: Option<String>,
    stops: AtomicUsize,
    actions: Mutex<Vec<InstanceAction>>,
}

impl InMemoryInstance {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            browser: Some(Arc::new(InMemoryBrowser::default())),
            stop_failure: None,
            stops: AtomicUsize::new(0),
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn without_browser(mut self) -> Self {
        self.browser = None;
        self
    }

    pub fn failing_stop(mut self, message: impl Into<String>) -> Self {
        self.stop_failure = Some(message.into());
        self
    }

    pub fn failing_browser_stop(mut self, message: impl Into<String>) -> Self {
        self.browser = Some(Arc::new(InMemoryBrowser {
            stopped: AtomicBool::new(false),
            failure: Some(message.into()),
        }));
        self
    }

    /// Successful stop calls.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn browser_stopped(&self) -> bool {
        self.browser
            .as_ref()
            .is_some_and(|browser| browser.stopped.load(Ordering::SeqCst))
    }

    pub fn actions(&self) -> Vec<InstanceAction> {
        lock(&self.actions).clone()
    }
}

#[async_trait]
impl RemoteInstance for InMemoryInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> InstanceStatus {
        if self.stop_count() > 0 {
            InstanceStatus::Terminated
        } else {
            InstanceStatus::Running
        }
    }

    async fn execute(&self, action: InstanceAction) -> Result<Value, BoxError> {
        if !self.is_active() {
            return Err(format!("instance {} is not running", self.id).into());
        }
        lock(&self.actions).push(action);
        Ok(json!({"status": "ok"}))
    }

    fn browser(&self) -> Option<Arc<dyn BrowserControl>> {
        self.browser
            .clone()
            .map(|browser| browser as Arc<dyn BrowserControl>)
    }

    async fn stop(&self) -> Result<(), BoxError> {
        if let Some(message) = &self.stop_failure {
            return Err(message.clone().into());
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A provisioning service backed by memory.
#[derive(Default)]
pub struct InMemoryProvisioner {
    existing: Mutex<Vec<Arc<dyn RemoteInstance>>>,
    next_shared: Mutex<VecDeque<Arc<dyn RemoteInstance>>>,
    create_failure: Option<String>,
    creates: AtomicUsize,
    last_timeout: Mutex<Option<Duration>>,
    last_kind: Mutex<Option<InstanceKind>>,
}

impl InMemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an already provisioned instance, visible through `list`.
    pub fn with_instance(self, instance: InMemoryInstance) -> Self {
        self.with_instance_arc(Arc::new(instance))
    }

    pub fn with_instance_arc(self, instance: Arc<InMemoryInstance>) -> Self {
        lock(&self.existing).push(instance);
        self
    }

    /// Queues the instance the next `create` call returns.
    pub fn with_shared_instance(self, instance: Arc<InMemoryInstance>) -> Self {
        lock(&self.next_shared).push_back(instance);
        self
    }

    pub fn failing_create(mut self, message: impl Into<String>) -> Self {
        self.create_failure = Some(message.into());
        self
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        *lock(&self.last_timeout)
    }

    pub fn last_kind(&self) -> Option<InstanceKind> {
        *lock(&self.last_kind)
    }
}

#[async_trait]
impl InstanceProvider for InMemoryProvisioner {
    async fn create(
        &self,
        kind: InstanceKind,
        timeout: Duration,
    ) -> Result<Arc<dyn RemoteInstance>, BoxError> {
        if let Some(message) = &self.create_failure {
            return Err(message.clone().into());
        }
        let count = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.last_timeout) = Some(timeout);
        *lock(&self.last_kind) = Some(kind);

        let instance = lock(&self.next_shared).pop_front().unwrap_or_else(|| {
            Arc::new(InMemoryInstance::new(format!("instance-{count}"))) as Arc<dyn RemoteInstance>
        });
        lock(&self.existing).push(instance.clone());
        Ok(instance)
    }

    async fn list(&self) -> Result<Vec<Arc<dyn RemoteInstance>>, BoxError> {
        Ok(lock(&self.existing).clone())
    }
}
