//! Agent loop behavior against scripted in-process providers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use steward_agent::{Agent, AgentConfig, Role, StewardResult, TaskStatus};
use steward_core::{ToolArgs, ToolCall, ToolSchema};
use steward_llm::types::{CompletionRequest, LlmResponse};
use steward_llm::{LlmRouter, ProviderAdapter};

fn args_of(value: serde_json::Value) -> ToolArgs {
    value.as_object().cloned().unwrap_or_default()
}

fn tool_response(calls: Vec<ToolCall>) -> LlmResponse {
    LlmResponse {
        content: String::new(),
        tool_calls: Some(calls),
        raw: None,
    }
}

fn router_with(adapter: Arc<dyn ProviderAdapter>) -> Arc<LlmRouter> {
    let mut router = LlmRouter::new("mock");
    router.register_provider("mock", adapter);
    Arc::new(router)
}

/// Replays a fixed sequence of responses, then repeats the last one.
struct ScriptedAdapter {
    responses: Vec<LlmResponse>,
    completions: AtomicU32,
}

impl ScriptedAdapter {
    fn new(responses: Vec<LlmResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            completions: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn complete(&self, _request: &CompletionRequest) -> StewardResult<LlmResponse> {
        let n = self.completions.fetch_add(1, Ordering::SeqCst) as usize;
        let idx = n.min(self.responses.len() - 1);
        Ok(self.responses[idx].clone())
    }
}

#[tokio::test]
async fn executes_a_tool_then_delivers_the_final_answer() {
    let adapter = ScriptedAdapter::new(vec![
        tool_response(vec![ToolCall::new(
            "add",
            args_of(serde_json::json!({"a": 2, "b": 3})),
        )]),
        tool_response(vec![ToolCall::new(
            "give_result",
            args_of(serde_json::json!({"result": "5"})),
        )]),
    ]);
    let mut agent = Agent::new("solver", AgentConfig::default(), router_with(adapter)).unwrap();
    agent
        .add_tool(
            "add",
            ToolSchema::new("add", "Adds two numbers")
                .param("a", "number", "left operand", true)
                .param("b", "number", "right operand", true),
            |args| {
                let a = args.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
                let b = args.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok((a + b).to_string())
            },
        )
        .unwrap();

    let result = agent.execute("add 2 and 3").await.unwrap();
    assert!(result.success);
    assert_eq!(result.output, "5");
}

#[tokio::test]
async fn text_only_response_ends_the_run() {
    let adapter = ScriptedAdapter::new(vec![LlmResponse::text("just the answer")]);
    let mut agent = Agent::new("plain", AgentConfig::default(), router_with(adapter)).unwrap();

    let result = agent.execute("say something").await.unwrap();
    assert!(result.success);
    assert_eq!(result.output, "just the answer");
}

#[tokio::test]
async fn repeated_identical_calls_short_circuit_with_the_last_result() {
    // The model insists on the same call every round.
    let adapter = ScriptedAdapter::new(vec![tool_response(vec![ToolCall::new(
        "add",
        args_of(serde_json::json!({"a": 1, "b": 1})),
    )])]);
    let invocations = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&invocations);

    let mut agent = Agent::new("loopy", AgentConfig::default(), router_with(adapter)).unwrap();
    agent
        .add_tool(
            "add",
            ToolSchema::new("add", "Adds two numbers"),
            move |_args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("2".to_string())
            },
        )
        .unwrap();

    let result = agent.execute("add 1 and 1").await.unwrap();
    assert!(result.success);
    assert_eq!(result.output, "2");
    // Only the first request reaches the handler; repeats are suppressed.
    assert!(invocations.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn iteration_budget_exhaustion_is_a_soft_failure() {
    /// Requests a fresh tool call every round so duplicate suppression
    /// never triggers.
    struct RestlessAdapter {
        completions: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for RestlessAdapter {
        async fn complete(&self, _request: &CompletionRequest) -> StewardResult<LlmResponse> {
            let n = self.completions.fetch_add(1, Ordering::SeqCst);
            Ok(tool_response(vec![ToolCall::new(
                "probe",
                args_of(serde_json::json!({"round": n})),
            )]))
        }
    }

    let adapter = Arc::new(RestlessAdapter {
        completions: AtomicU32::new(0),
    });
    let mut agent = Agent::new(
        "bounded",
        AgentConfig::default().with_max_iterations(3),
        router_with(Arc::clone(&adapter) as Arc<dyn ProviderAdapter>),
    )
    .unwrap();
    agent
        .add_tool("probe", ToolSchema::new("probe", "probes"), |_| {
            Ok("probed".to_string())
        })
        .unwrap();

    let result = agent.execute("never finish").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.output, "");
    assert_eq!(adapter.completions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unknown_tool_is_reported_back_not_fatal() {
    let adapter = ScriptedAdapter::new(vec![
        tool_response(vec![ToolCall::new("missing", ToolArgs::new())]),
        tool_response(vec![ToolCall::new(
            "give_result",
            args_of(serde_json::json!({"result": "recovered"})),
        )]),
    ]);
    let mut agent = Agent::new("tolerant", AgentConfig::default(), router_with(adapter)).unwrap();

    let result = agent.execute("call something missing").await.unwrap();
    assert!(result.success);
    assert_eq!(result.output, "recovered");
}

#[tokio::test]
async fn task_store_records_terminal_transitions() {
    let adapter = ScriptedAdapter::new(vec![tool_response(vec![ToolCall::new(
        "give_result",
        args_of(serde_json::json!({"result": "done"})),
    )])]);
    let mut agent = Agent::new(
        "tracked",
        AgentConfig::default().with_task_store(),
        router_with(adapter),
    )
    .unwrap();

    let result = agent.execute("do it").await.unwrap();
    let task_id = result.task_id.unwrap();
    let task = agent.tasks().unwrap().get(task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output.as_deref(), Some("done"));
    assert!(task.completed_at.is_some());

    // Exhaust the budget on a second agent and expect a failed task.
    struct AlwaysTools;
    #[async_trait]
    impl ProviderAdapter for AlwaysTools {
        async fn complete(&self, request: &CompletionRequest) -> StewardResult<LlmResponse> {
            Ok(tool_response(vec![ToolCall::new(
                "probe",
                args_of(serde_json::json!({"len": request.messages.len()})),
            )]))
        }
    }
    let mut agent = Agent::new(
        "tracked2",
        AgentConfig::default().with_task_store().with_max_iterations(2),
        router_with(Arc::new(AlwaysTools)),
    )
    .unwrap();
    agent
        .add_tool("probe", ToolSchema::new("probe", "probes"), |_| {
            Ok("probed".to_string())
        })
        .unwrap();

    let result = agent.execute("never done").await.unwrap();
    let task = agent.tasks().unwrap().get(result.task_id.unwrap()).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("Max iterations reached"));
}

#[tokio::test]
async fn trace_records_calls_and_results() {
    let adapter = ScriptedAdapter::new(vec![
        tool_response(vec![ToolCall::new(
            "add",
            args_of(serde_json::json!({"a": 2, "b": 3})),
        )]),
        tool_response(vec![ToolCall::new(
            "give_result",
            args_of(serde_json::json!({"result": "5"})),
        )]),
    ]);
    let mut agent = Agent::new("traced", AgentConfig::default(), router_with(adapter)).unwrap();
    agent.set_trace_enabled(true);
    agent
        .add_tool("add", ToolSchema::new("add", "Adds"), |_| Ok("5".to_string()))
        .unwrap();

    let result = agent.execute("add 2 and 3").await.unwrap();
    assert!(result.trace.is_some());
    let trace = agent.last_trace().unwrap();
    assert_eq!(trace.iterations.len(), 2);
    assert_eq!(trace.iterations[0].tool_calls[0].name, "add");
    assert_eq!(trace.iterations[0].tool_results[0].output, "5");
    assert_eq!(trace.iterations[1].tool_calls[0].name, "give_result");
}

// --- Delegation ---

/// Drives parents and workers from one shared adapter.
///
/// Worker instructions look like `TASK:<n> sleep=<ms>`; the adapter sleeps
/// for the given duration before answering, so completion order differs
/// from spawn order.
struct DelegationAdapter;

#[async_trait]
impl ProviderAdapter for DelegationAdapter {
    async fn complete(&self, request: &CompletionRequest) -> StewardResult<LlmResponse> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        if let Some(rest) = last_user.strip_prefix("TASK:") {
            let mut parts = rest.split_whitespace();
            let n = parts.next().unwrap_or("0").to_string();
            let ms: u64 = parts
                .next()
                .and_then(|p| p.strip_prefix("sleep="))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return Ok(tool_response(vec![ToolCall::new(
                "give_result",
                args_of(serde_json::json!({"result": format!("done-{n}")})),
            )]));
        }

        if last_user.starts_with("[tool:spawn_workers]") {
            return Ok(LlmResponse::text("all workers finished"));
        }

        let tasks = serde_json::json!([
            {"instruction": "TASK:1 sleep=40"},
            {"instruction": "TASK:2 sleep=5"},
            {"instruction": "TASK:3 sleep=20"},
        ]);
        Ok(tool_response(vec![ToolCall::new(
            "spawn_workers",
            args_of(serde_json::json!({"tasks": tasks.to_string()})),
        )]))
    }
}

#[tokio::test]
async fn parallel_workers_aggregate_in_spawn_order() {
    let mut agent = Agent::new(
        "parent",
        AgentConfig::default().with_delegation(),
        router_with(Arc::new(DelegationAdapter)),
    )
    .unwrap();

    let reply = agent.chat("fan out three tasks").await.unwrap();
    assert_eq!(reply, "all workers finished");

    let aggregate = agent
        .chat_history()
        .iter()
        .find(|m| m.content.starts_with("[tool:spawn_workers]"))
        .map(|m| m.content.clone())
        .unwrap();

    // Worker 1 sleeps longest but still leads the aggregate.
    let p1 = aggregate.find("[worker 1] TASK:1").unwrap();
    let p2 = aggregate.find("[worker 2] TASK:2").unwrap();
    let p3 = aggregate.find("[worker 3] TASK:3").unwrap();
    assert!(p1 < p2 && p2 < p3);
    assert!(aggregate.contains("done-1"));
    assert!(aggregate.contains("done-2"));
    assert!(aggregate.contains("done-3"));

    // All three workers ran and were recorded.
    assert_eq!(agent.worker_results().len(), 3);
}

#[tokio::test]
async fn chat_retains_history_until_reset() {
    let adapter = ScriptedAdapter::new(vec![LlmResponse::text("hello there")]);
    let mut agent = Agent::new("chatty", AgentConfig::default(), router_with(adapter)).unwrap();

    let first = agent.chat("hi").await.unwrap();
    assert_eq!(first, "hello there");
    agent.chat("and again").await.unwrap();

    // system + (user, assistant) x2
    assert_eq!(agent.chat_history().len(), 5);
    assert_eq!(agent.chat_history()[0].role, Role::System);

    agent.reset_chat();
    assert!(agent.chat_history().is_empty());
}
