//! Offline demonstration of a swarm run.
//!
//! The orchestrator plans a Hacker News summary for two workers. Completions
//! and instances are scripted, so the demo needs no network access. Set
//! `RUST_LOG=agent_swarm=debug` to see every turn and tool call.

use std::sync::Arc;

use agent_swarm::testing::{InMemoryProvisioner, ScriptedCompletion};
use agent_swarm::{
    config, Agent, CompletionResult, Message, OrchestrationPlan, RunOptions, Step, Swarm,
    TaskAssignment, ToolSpec, Usage,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agent_swarm=info")),
        )
        .with_target(false)
        .init();

    println!("=== Swarm Demo ===\n");

    let plan = OrchestrationPlan::new("Summarize the top 3 Hacker News posts")
        .with_assignment(TaskAssignment::new(
            "Browser Agent",
            "Go to news.ycombinator.com and get the top 3 posts",
        ))
        .with_assignment(
            TaskAssignment::new("Writer", "Write a two sentence summary of each post")
                .with_priority(2),
        )
        .with_notes("The writer needs the browser agent's results");

    let completion = ScriptedCompletion::new()
        .with_plan(serde_json::to_value(&plan)?)
        .with_tool_call("bash", json!({"command": "curl -s https://news.ycombinator.com"}))
        .with_result(
            CompletionResult::new(vec![Message::assistant(
                "1. Show HN: a tiny database\n2. Rust 2024 retrospective\n3. Why swarms work",
            )])
            .with_step(Step::text("Summaries written"))
            .with_usage(Usage::new(120, 40)),
        )
        .with_plan(serde_json::to_value(OrchestrationPlan::new("done"))?)
        .executing_tools();

    let agents = vec![
        Agent::orchestrator("Orchestrator").with_color("95"),
        Agent::worker(
            "Browser Agent",
            "You are a browser automation expert. Help navigate and interact with web pages.",
        )
        .with_on_step(|step| {
            for call in &step.tool_calls {
                println!("  [Browser Agent] {}({})", call.name, call.arguments);
            }
        }),
        Agent::worker("Writer", "You are a concise technical writer.")
            .with_tools(vec![ToolSpec::Edit]),
    ];

    let mut swarm = Swarm::with_config(
        agents,
        Arc::new(completion),
        Arc::new(InMemoryProvisioner::new()),
        config::from_env(),
    )?;

    let result = swarm
        .run(
            "Orchestrator",
            RunOptions::new()
                .with_prompt("Summarize the top 3 posts on Hacker News")
                .with_max_turns(8),
        )
        .await;

    let report = swarm.teardown().await;
    let response = result?;

    println!("\nTurns: {}", response.turns);
    println!("Final agent: {}", response.agent);
    println!("Messages added: {}", response.messages.len());
    if let Some(text) = response.messages.iter().rev().find_map(|m| {
        (m.role == agent_swarm::Role::Assistant && !m.content.starts_with('{')).then_some(&m.content)
    }) {
        println!("Last answer:\n{text}");
    }
    println!("Total tokens: {}", response.total_usage.total_tokens);
    println!(
        "Released {} instance(s), {} failure(s)",
        report.released.len(),
        report.failures.len()
    );

    Ok(())
}
