//! End-to-end tests of swarm runs over the scripted services.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};

use agent_swarm::testing::{InMemoryInstance, InMemoryProvisioner, ScriptedCompletion};
use agent_swarm::{
    Affinity, Agent, AgentRegistry, CompletionResult, Message, OrchestrationPlan,
    OrchestrationProtocol, ReleaseStage, RunOptions, Step, Swarm, SwarmError, TaskAssignment, ToolKind,
    ToolSpec, Usage,
};

fn plan(assignments: &[(&str, &str)]) -> serde_json::Value {
    let mut plan = OrchestrationPlan::new("task");
    for (agent, prompt) in assignments {
        plan = plan.with_assignment(TaskAssignment::new(*agent, *prompt));
    }
    serde_json::to_value(plan).unwrap()
}

fn swarm_with(
    agents: Vec<Agent>,
    completion: Arc<ScriptedCompletion>,
    provider: Arc<InMemoryProvisioner>,
) -> Swarm {
    Swarm::new(agents, completion, provider).unwrap()
}

#[tokio::test]
async fn single_turn_run_returns_orchestrator() {
    let completion = Arc::new(ScriptedCompletion::new());
    let provider = Arc::new(InMemoryProvisioner::new());
    let mut swarm = swarm_with(
        vec![
            Agent::orchestrator("O"),
            Agent::worker("W", "w").with_affinity("shared"),
        ],
        completion.clone(),
        provider.clone(),
    );

    let response = swarm
        .run("O", RunOptions::new().with_max_turns(1))
        .await
        .unwrap();

    assert_eq!(response.messages.len(), 1);
    assert_eq!(response.agent, "O");
    assert_eq!(provider.create_count(), 1);
    swarm.teardown().await;
}

#[tokio::test]
async fn three_turn_cap_gives_three_messages() {
    let completion = Arc::new(ScriptedCompletion::new());
    let mut swarm = swarm_with(
        vec![Agent::orchestrator("O"), Agent::worker("W", "w")],
        completion.clone(),
        Arc::new(InMemoryProvisioner::new()),
    );

    let response = swarm
        .run("O", RunOptions::new().with_max_turns(3))
        .await
        .unwrap();

    assert_eq!(response.messages.len(), 3);
    assert_eq!(response.turns, 3);
    assert_eq!(completion.requests().len(), 3);
    assert_eq!(response.usage, Some(Usage::new(10, 5)));
    assert_eq!(response.total_usage.total_tokens, 45);
    swarm.teardown().await;
}

#[tokio::test]
async fn run_on_worker_is_a_configuration_error() {
    let completion = Arc::new(ScriptedCompletion::new());
    let mut swarm = swarm_with(
        vec![Agent::orchestrator("O"), Agent::worker("W", "w")],
        completion.clone(),
        Arc::new(InMemoryProvisioner::new()),
    );

    let err = swarm.run("W", RunOptions::new()).await.unwrap_err();
    assert!(matches!(err, SwarmError::Configuration { .. }));
    assert!(completion.requests().is_empty());
    assert_eq!(swarm.instances().tracked(), 0);
}

#[tokio::test]
async fn provisioning_failure_aborts_run() {
    let mut swarm = swarm_with(
        vec![Agent::orchestrator("O")],
        Arc::new(ScriptedCompletion::new()),
        Arc::new(InMemoryProvisioner::new().failing_create("quota exceeded")),
    );

    let err = swarm.run("O", RunOptions::new()).await.unwrap_err();
    assert!(matches!(err, SwarmError::Provisioning { .. }));
}

#[tokio::test]
async fn plan_drives_workers_and_control_returns_to_orchestrator() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .with_plan(plan(&[("Browser Agent", "p1"), ("Coder", "p2")]))
            .with_message("three posts found")
            .with_message("summary written")
            .with_plan(plan(&[])),
    );
    let mut swarm = swarm_with(
        vec![
            Agent::orchestrator("Orchestrator"),
            Agent::worker("Browser Agent", "browse"),
            Agent::worker("Coder", "code").with_tool(ToolSpec::Shell),
        ],
        completion.clone(),
        Arc::new(InMemoryProvisioner::new()),
    );

    let response = swarm
        .run(
            "Orchestrator",
            RunOptions::new()
                .with_prompt("Summarize HN")
                .with_max_turns(10),
        )
        .await
        .unwrap();

    let requests = completion.requests();
    let agents: Vec<&str> = requests.iter().map(|r| r.agent.as_str()).collect();
    assert_eq!(agents, vec!["Orchestrator", "Browser Agent", "Coder", "Orchestrator"]);
    assert_eq!(response.turns, 4);
    assert_eq!(response.messages.len(), 4);
    assert_eq!(response.agent, "Orchestrator");
    assert_eq!(response.steps.len(), 2);

    assert_eq!(requests[0].prompt.as_deref(), Some("Summarize HN"));
    assert_eq!(requests[1].prompt.as_deref(), Some("p1"));
    assert_eq!(requests[2].tools.names(), vec!["bash", "handoff"]);
    assert!(requests[3].system.contains("  - Browser Agent: p1"));
    // history accumulates across agents
    assert_eq!(requests[3].messages.len(), 3);

    assert_eq!(swarm.agent("Coder").and_then(|a| a.prompt()), Some("p2"));
    swarm.teardown().await;
}

#[tokio::test]
async fn worker_handoff_is_delivered_once_to_orchestrator() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .with_plan(plan(&[("Coder", "build it")]))
            .with_tool_call(
                "handoff",
                json!({
                    "reason": "needs a browser",
                    "task_description": "read the release notes",
                    "suggested_agent": "Browser Agent",
                    "context": {"url": "https://example.com"}
                }),
            )
            .executing_tools(),
    );
    let mut swarm = swarm_with(
        vec![
            Agent::orchestrator("Orchestrator"),
            Agent::worker("Browser Agent", "browse"),
            Agent::worker("Coder", "code"),
        ],
        completion.clone(),
        Arc::new(InMemoryProvisioner::new()),
    );

    swarm
        .run("Orchestrator", RunOptions::new().with_max_turns(4))
        .await
        .unwrap();

    let requests = completion.requests();
    let notifications: Vec<usize> = requests
        .iter()
        .map(|r| {
            r.messages
                .iter()
                .filter(|m| m.content.starts_with("Handoff request from Coder"))
                .count()
        })
        .collect();
    assert_eq!(notifications, vec![0, 0, 1, 0]);
    let notice = &requests[2].messages.last().unwrap().content;
    assert!(notice.contains("Suggested Agent: Browser Agent"));
    assert!(notice.contains(r#"Additional Context: {"url":"https://example.com"}"#));
    assert!(swarm.queue().is_empty());
    swarm.teardown().await;
}

#[tokio::test]
async fn handoff_left_undelivered_reaches_next_run() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .with_plan(plan(&[("W1", "step one"), ("W2", "step two")]))
            .with_tool_call(
                "handoff",
                json!({"reason": "blocked", "task_description": "needs review"}),
            )
            .executing_tools(),
    );
    let mut swarm = swarm_with(
        vec![
            Agent::orchestrator("O"),
            Agent::worker("W1", "one"),
            Agent::worker("W2", "two"),
        ],
        completion.clone(),
        Arc::new(InMemoryProvisioner::new()),
    );

    // ends after W2, before the orchestrator runs again
    swarm.run("O", RunOptions::new().with_max_turns(3)).await.unwrap();
    assert_eq!(swarm.queue().len(), 1);

    swarm.run("O", RunOptions::new().with_max_turns(1)).await.unwrap();

    let delivered: Vec<(String, usize)> = completion
        .requests()
        .iter()
        .map(|r| {
            let count = r
                .messages
                .iter()
                .filter(|m| m.content.starts_with("Handoff request from W1"))
                .count();
            (r.agent.clone(), count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();
    assert_eq!(delivered, vec![("O".to_string(), 1)]);
    assert!(swarm.queue().is_empty());
    swarm.teardown().await;
}

#[tokio::test]
async fn plan_without_messages_still_reaches_turn_cap() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .with_result(CompletionResult::default().with_output(plan(&[("W", "go")]))),
    );
    let mut swarm = swarm_with(
        vec![Agent::orchestrator("O"), Agent::worker("W", "w")],
        completion.clone(),
        Arc::new(InMemoryProvisioner::new()),
    );

    let response = swarm
        .run("O", RunOptions::new().with_max_turns(2))
        .await
        .unwrap();

    assert_eq!(response.messages.len(), 2);
    let agents: Vec<String> = completion.requests().into_iter().map(|r| r.agent).collect();
    assert_eq!(agents, vec!["O", "W", "O"]);
    swarm.teardown().await;
}

#[tokio::test]
async fn unknown_instance_falls_back_to_shared_without_error() {
    let provider = Arc::new(InMemoryProvisioner::new());
    let mut swarm = swarm_with(
        vec![
            Agent::orchestrator("O").with_affinity("i-does-not-exist"),
            Agent::worker("W", "w"),
        ],
        Arc::new(ScriptedCompletion::new()),
        provider.clone(),
    );

    let response = swarm.run("O", RunOptions::new().with_max_turns(2)).await;

    assert!(response.is_ok());
    assert_eq!(swarm.orchestrator().affinity(), &Affinity::Shared);
    assert_eq!(swarm.instances().keys(), vec!["shared"]);
    assert_eq!(provider.create_count(), 1);
    swarm.teardown().await;
}

#[tokio::test]
async fn agents_with_explicit_instance_use_it() {
    let dedicated = Arc::new(InMemoryInstance::new("inst-dedicated"));
    let completion = Arc::new(
        ScriptedCompletion::new()
            .with_plan(plan(&[("W", "list files")]))
            .with_tool_call("bash", json!({"command": "ls"}))
            .executing_tools(),
    );
    let mut swarm = swarm_with(
        vec![
            Agent::orchestrator("O"),
            Agent::worker("W", "w").with_affinity("inst-dedicated"),
        ],
        completion.clone(),
        Arc::new(InMemoryProvisioner::new().with_instance_arc(dedicated.clone())),
    );

    swarm.run("O", RunOptions::new().with_max_turns(2)).await.unwrap();

    assert_eq!(dedicated.actions().len(), 1);
    let worker_tools = &completion.requests()[1].tools;
    assert!(worker_tools.has_kind(ToolKind::Computer));
    assert_eq!(worker_tools.tools()[0].instance().id(), "inst-dedicated");

    let report = swarm.teardown().await;
    assert_eq!(report.released.len(), 2);
    assert_eq!(dedicated.stop_count(), 1);
}

#[tokio::test]
async fn teardown_twice_is_safe() {
    let mut swarm = swarm_with(
        vec![Agent::orchestrator("O")],
        Arc::new(ScriptedCompletion::new()),
        Arc::new(InMemoryProvisioner::new()),
    );
    swarm.run("O", RunOptions::new().with_max_turns(1)).await.unwrap();

    let first = swarm.teardown().await;
    assert_eq!(first.released.len(), 1);
    let second = swarm.teardown().await;
    assert!(second.released.is_empty());
    assert!(second.failures.is_empty());
}

#[tokio::test]
async fn teardown_failures_are_reported_not_raised() {
    let broken = Arc::new(InMemoryInstance::new("broken").failing_browser_stop("browser gone"));
    let provider = Arc::new(InMemoryProvisioner::new().with_shared_instance(broken.clone()));
    let mut swarm = swarm_with(
        vec![Agent::orchestrator("O")],
        Arc::new(ScriptedCompletion::new()),
        provider,
    );
    swarm.run("O", RunOptions::new().with_max_turns(1)).await.unwrap();

    let report = swarm.teardown().await;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, ReleaseStage::Browser);
    // browser failure does not keep the instance alive
    assert_eq!(report.released, vec!["broken".to_string()]);
    assert_eq!(broken.stop_count(), 1);
}

#[tokio::test]
async fn step_callback_sees_every_step() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let completion = Arc::new(
        ScriptedCompletion::new().with_result(
            CompletionResult::new(vec![Message::assistant("done")])
                .with_step(Step::text("thinking"))
                .with_step(Step::text("done")),
        ),
    );
    let mut swarm = swarm_with(
        vec![Agent::orchestrator("O").with_on_step(move |step| {
            sink.lock().unwrap().push(step.text.clone().unwrap_or_default());
        })],
        completion,
        Arc::new(InMemoryProvisioner::new()),
    );

    let response = swarm.run("O", RunOptions::new().with_max_turns(1)).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["thinking", "done"]);
    assert_eq!(response.steps.len(), 2);
    swarm.teardown().await;
}

#[test]
fn apply_plan_skips_unknown_agents() {
    let mut registry = AgentRegistry::new(vec![
        Agent::orchestrator("Orchestrator"),
        Agent::worker("Browser Agent", "b"),
    ])
    .unwrap();
    let plan: OrchestrationPlan = serde_json::from_value(json!({
        "task_assignments": [
            {"agent_name": "Browser Agent", "prompt": "p1"},
            {"agent_name": "Nobody", "prompt": "p2"}
        ]
    }))
    .unwrap();

    OrchestrationProtocol::apply_plan(&mut registry, &plan);

    assert_eq!(registry.lookup("Browser Agent").and_then(|a| a.prompt()), Some("p1"));
    assert!(registry.lookup("Nobody").is_none());
}
