//! The agent execution loop: completion rounds, tool dispatch, duplicate
//! suppression, worker delegation, and multi-turn chat.

use crate::config::{AgentConfig, CallOptions};
use crate::task::{TaskStatus, TaskStore};
use crate::tools::{Tool, ToolOutcome, ToolRegistry};
use crate::trace::{Trace, TraceIteration};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use steward_core::{
    AgentResult, Message, StewardResult, ToolArgs, ToolCall, ToolResult, ToolSchema,
};
use steward_llm::router::LlmRouter;
use steward_llm::types::CompletionRequest;
use tracing::{debug, info, warn};

/// System prompt for task execution runs.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a task execution soldier. Execute orders precisely. No chatter.

PROTOCOL:
1. Execute the task using the tools provided
2. Call give_result with CLEAN output only
3. Never repeat the same tool call

OUTPUT RULES:
- NO explanations, NO fluff, NO \"here is...\", NO markdown unless data requires it
- List requested -> return list (one item per line)
- File requested -> return file content directly
- Number requested -> return just the number
- Data requested -> return just the data

Example: \"list files\" -> give_result(\"src\\nbin\\nREADME.md\")
Example: \"count entries\" -> give_result(\"26\")";

/// System prompt for multi-turn chat sessions.
pub const CHAT_SYSTEM_PROMPT: &str = "\
You are a helpful assistant with access to tools.

Use tools when you need them. Respond naturally in conversation. Use markdown
when helpful.

When you have a specific task that can be delegated, use spawn_worker to create
a worker agent. Workers run independently with their own context - give them
clear, self-contained instructions. For multiple independent tasks, use
spawn_workers to run them in parallel.";

/// An autonomous agent driving an LLM through a tool-use loop.
pub struct Agent {
    name: String,
    config: AgentConfig,
    system_prompt: String,
    router: Arc<LlmRouter>,
    tools: ToolRegistry,
    tasks: Option<TaskStore>,
    spawner: Option<Arc<WorkerSpawner>>,
    trace_enabled: bool,
    last_trace: Option<Trace>,
    chat_messages: Vec<Message>,
}

impl Agent {
    /// Creates an agent.
    ///
    /// The final-answer tool is always registered; the delegation tools and
    /// the task store follow the config flags.
    pub fn new(
        name: impl Into<String>,
        config: AgentConfig,
        router: Arc<LlmRouter>,
    ) -> StewardResult<Self> {
        let name = name.into();
        let mut tools = ToolRegistry::with_final_answer();

        let spawner = if config.enable_delegation {
            let spawner = Arc::new(WorkerSpawner {
                router: Arc::clone(&router),
                parent_name: name.clone(),
                config: config.clone(),
                counter: AtomicUsize::new(0),
                results: Mutex::new(Vec::new()),
            });
            register_delegation_tools(&mut tools, &spawner)?;
            Some(spawner)
        } else {
            None
        };

        let tasks = config.enable_task_store.then(TaskStore::new);

        Ok(Self {
            name,
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            router,
            tools,
            tasks,
            spawner,
            trace_enabled: false,
            last_trace: None,
            chat_messages: Vec::new(),
        })
    }

    /// The agent's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the system prompt used by `execute`.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    /// Registers a closure-backed tool.
    pub fn add_tool<F>(
        &mut self,
        name: impl Into<String>,
        schema: ToolSchema,
        handler: F,
    ) -> StewardResult<()>
    where
        F: Fn(ToolArgs) -> StewardResult<String> + Send + Sync + 'static,
    {
        self.tools.register_fn(name, schema, handler)
    }

    /// Registers a [`Tool`] instance.
    pub fn register_tool(
        &mut self,
        name: impl Into<String>,
        schema: ToolSchema,
        tool: Arc<dyn Tool>,
    ) -> StewardResult<()> {
        self.tools.register(name, schema, tool)
    }

    /// Turns trace recording on or off.
    pub fn set_trace_enabled(&mut self, enabled: bool) {
        self.trace_enabled = enabled;
    }

    /// The trace of the most recent `execute` run, when recording is on.
    pub fn last_trace(&self) -> Option<&Trace> {
        self.last_trace.as_ref()
    }

    /// The task store, when enabled.
    pub fn tasks(&self) -> Option<&TaskStore> {
        self.tasks.as_ref()
    }

    /// Results of every worker spawned so far, in spawn order.
    pub fn worker_results(&self) -> Vec<(String, AgentResult)> {
        self.spawner
            .as_ref()
            .map(|s| s.results.lock().clone())
            .unwrap_or_default()
    }

    /// Runs one instruction to completion.
    pub async fn execute(&mut self, instruction: &str) -> StewardResult<AgentResult> {
        self.execute_with(instruction, CallOptions::default()).await
    }

    /// Runs one instruction with per-call overrides.
    ///
    /// Returns `Ok` with `success: false` and an empty output when the
    /// iteration budget runs out; `Err` is reserved for unrecoverable
    /// routing and configuration failures.
    pub async fn execute_with(
        &mut self,
        instruction: &str,
        opts: CallOptions,
    ) -> StewardResult<AgentResult> {
        let task = self.tasks.as_ref().map(|t| t.create(instruction));
        let task_id = task.as_ref().map(|t| t.id);

        let provider = opts.provider.clone().or_else(|| self.config.provider.clone());
        let model = opts.model.clone().or_else(|| self.config.model.clone());
        let temperature = opts.temperature.unwrap_or(self.config.temperature);

        let mut messages = vec![
            Message::system(&self.system_prompt),
            Message::user(instruction),
        ];
        let schemas = (!self.tools.is_empty()).then(|| self.tools.schemas());

        let mut trace = self
            .trace_enabled
            .then(|| Trace::new(provider.clone(), model.clone()));

        // Duplicate suppression state: canonical call key -> last output.
        let mut previous_calls: HashMap<String, String> = HashMap::new();
        let mut duplicate_count = 0usize;
        let mut last_tool_result: Option<String> = None;

        info!(agent = %self.name, "starting run");

        for iteration in 0..self.config.max_iterations {
            let request = CompletionRequest {
                messages: messages.clone(),
                tools: schemas.clone(),
                temperature: Some(temperature),
                model: model.clone(),
                provider: provider.clone(),
            };

            let response = match self.router.complete(&request).await {
                Ok(response) => response,
                Err(err) => {
                    if let (Some(tasks), Some(id)) = (&self.tasks, task_id) {
                        tasks.update(id, TaskStatus::Failed, None, Some(err.to_string()));
                    }
                    self.last_trace = trace;
                    return Err(err);
                }
            };

            let mut record = TraceIteration {
                raw: response.raw.clone(),
                content: response.content.clone(),
                tool_calls: response.tool_calls.clone().unwrap_or_default(),
                tool_results: Vec::new(),
            };

            let Some(tool_calls) = response.tool_calls.filter(|c| !c.is_empty()) else {
                // No tool calls: the text is the answer.
                if let Some(trace) = trace.as_mut() {
                    trace.iterations.push(record);
                }
                return Ok(self.finish(task_id, trace, true, response.content));
            };

            debug!(agent = %self.name, iteration, calls = tool_calls.len(), "tool round");
            messages.push(Message::assistant(response.content));

            for call in tool_calls {
                let key = call_key(&call);

                if let Some(prior) = previous_calls.get(&key) {
                    duplicate_count += 1;
                    if duplicate_count >= 2 {
                        if let Some(last) = last_tool_result.clone() {
                            warn!(agent = %self.name, tool = %call.name, "repeated call, short-circuiting");
                            if let Some(trace) = trace.as_mut() {
                                trace.iterations.push(record);
                            }
                            return Ok(self.finish(task_id, trace, true, last));
                        }
                    }
                    messages.push(Message::user(format!(
                        "ERROR: You already called {} with these exact arguments. \
                         Result was: {prior}\n\nYou MUST call give_result now with \
                         your answer. Do not repeat tool calls.",
                        call.name
                    )));
                    continue;
                }

                match self.tools.execute(&call.name, call.args.clone()).await {
                    ToolOutcome::Finished(output) => {
                        if let Some(trace) = trace.as_mut() {
                            record.tool_results.push(ToolResult::success(&output));
                            trace.iterations.push(record);
                        }
                        return Ok(self.finish(task_id, trace, true, output));
                    }
                    ToolOutcome::Continue(result) => {
                        previous_calls.insert(key, result.output.clone());
                        last_tool_result = Some(result.output.clone());
                        messages.push(Message::user(format!(
                            "Tool {} returned: {}\n\nIf this answers the question, \
                             call give_result now.",
                            call.name, result.output
                        )));
                        record.tool_results.push(result);
                    }
                }
            }

            if let Some(trace) = trace.as_mut() {
                trace.iterations.push(record);
            }
        }

        warn!(agent = %self.name, "iteration budget exhausted");
        if let (Some(tasks), Some(id)) = (&self.tasks, task_id) {
            tasks.update(
                id,
                TaskStatus::Failed,
                None,
                Some("Max iterations reached".to_string()),
            );
        }
        let trace_value = trace.as_ref().map(Trace::to_value);
        self.last_trace = trace;
        Ok(AgentResult {
            success: false,
            output: String::new(),
            task_id,
            trace: trace_value,
        })
    }

    fn finish(
        &mut self,
        task_id: Option<uuid::Uuid>,
        trace: Option<Trace>,
        success: bool,
        output: String,
    ) -> AgentResult {
        if let (Some(tasks), Some(id)) = (&self.tasks, task_id) {
            tasks.update(id, TaskStatus::Completed, Some(output.clone()), None);
        }
        let trace_value = trace.as_ref().map(Trace::to_value);
        self.last_trace = trace;
        AgentResult {
            success,
            output,
            task_id,
            trace: trace_value,
        }
    }

    /// Sends one chat turn, retaining history across calls.
    pub async fn chat(&mut self, message: &str) -> StewardResult<String> {
        self.chat_with(message, CallOptions::default()).await
    }

    /// Sends one chat turn with per-call overrides.
    ///
    /// A turn ends on the first response without tool calls; tool output is
    /// fed back inline. Hitting the iteration cap yields a placeholder, not
    /// an error. There is no duplicate suppression in chat.
    pub async fn chat_with(&mut self, message: &str, opts: CallOptions) -> StewardResult<String> {
        if self.chat_messages.is_empty() {
            self.chat_messages.push(Message::system(CHAT_SYSTEM_PROMPT));
        }
        self.chat_messages.push(Message::user(message));

        let provider = opts.provider.clone().or_else(|| self.config.provider.clone());
        let model = opts.model.clone().or_else(|| self.config.model.clone());
        let temperature = opts.temperature.unwrap_or(self.config.temperature);
        let schemas = (!self.tools.is_empty()).then(|| self.tools.schemas());

        for _ in 0..self.config.max_iterations {
            let request = CompletionRequest {
                messages: self.chat_messages.clone(),
                tools: schemas.clone(),
                temperature: Some(temperature),
                model: model.clone(),
                provider: provider.clone(),
            };
            let response = self.router.complete(&request).await?;

            let Some(tool_calls) = response.tool_calls.filter(|c| !c.is_empty()) else {
                self.chat_messages.push(Message::assistant(&response.content));
                return Ok(response.content);
            };

            self.chat_messages.push(Message::assistant(response.content));

            for call in tool_calls {
                match self.tools.execute(&call.name, call.args).await {
                    ToolOutcome::Finished(output) => {
                        self.chat_messages
                            .push(Message::user(format!("[tool:{}] {output}", call.name)));
                        self.chat_messages.push(Message::assistant(&output));
                        return Ok(output);
                    }
                    ToolOutcome::Continue(result) => {
                        self.chat_messages.push(Message::user(format!(
                            "[tool:{}] {}",
                            call.name, result.output
                        )));
                    }
                }
            }
        }

        Ok("(max iterations reached)".to_string())
    }

    /// Clears chat history.
    pub fn reset_chat(&mut self) {
        self.chat_messages.clear();
    }

    /// A read-only view of the chat history.
    pub fn chat_history(&self) -> &[Message] {
        &self.chat_messages
    }
}

/// Canonical duplicate-detection key: tool name plus the arguments encoded
/// with sorted keys.
fn call_key(call: &ToolCall) -> String {
    let sorted: std::collections::BTreeMap<&String, &serde_json::Value> =
        call.args.iter().collect();
    let args = serde_json::to_string(&sorted).unwrap_or_default();
    format!("{}:{args}", call.name)
}

// --- Worker delegation ---

/// Shared factory and result sink for worker agents.
///
/// Workers are disposable non-delegating agents with isolated conversations
/// and registries; the parent's router (and with it the credential rotation
/// state) is shared.
struct WorkerSpawner {
    router: Arc<LlmRouter>,
    parent_name: String,
    config: AgentConfig,
    counter: AtomicUsize,
    results: Mutex<Vec<(String, AgentResult)>>,
}

impl WorkerSpawner {
    fn worker_config(&self) -> AgentConfig {
        AgentConfig {
            provider: self
                .config
                .worker_provider
                .clone()
                .or_else(|| self.config.provider.clone()),
            model: self
                .config
                .worker_model
                .clone()
                .or_else(|| self.config.model.clone()),
            reasoning_effort: self.config.reasoning_effort.clone(),
            max_iterations: self
                .config
                .worker_max_iterations
                .unwrap_or(self.config.max_iterations),
            temperature: self.config.temperature,
            enable_task_store: false,
            enable_delegation: false,
            worker_provider: None,
            worker_model: None,
            worker_max_iterations: None,
        }
    }

    async fn run_one(&self, instruction: &str, context: &str, system_prompt: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let worker_name = format!("{}/worker-{n}", self.parent_name);

        let mut worker = match Agent::new(
            worker_name.clone(),
            self.worker_config(),
            Arc::clone(&self.router),
        ) {
            Ok(worker) => worker,
            Err(err) => return format!("[worker failed] {err}"),
        };
        if !system_prompt.is_empty() {
            worker.set_system_prompt(system_prompt);
        }

        let full_instruction = if context.is_empty() {
            instruction.to_string()
        } else {
            format!("Context: {context}\n\nTask: {instruction}")
        };

        info!(worker = %worker_name, "spawning worker");
        match worker.execute(&full_instruction).await {
            Ok(result) => {
                let output = if result.success {
                    result.output.clone()
                } else {
                    format!("[worker failed] {}", result.output)
                };
                self.results.lock().push((worker_name, result));
                output
            }
            Err(err) => {
                warn!(worker = %worker_name, error = %err, "worker errored");
                format!("[worker failed] {err}")
            }
        }
    }
}

struct SpawnWorkerTool(Arc<WorkerSpawner>);

#[async_trait]
impl Tool for SpawnWorkerTool {
    async fn invoke(&self, args: ToolArgs) -> StewardResult<ToolOutcome> {
        let instruction = str_arg(&args, "instruction");
        if instruction.is_empty() {
            return Ok(ToolOutcome::Continue(ToolResult::failure(
                "spawn_worker requires an instruction",
            )));
        }
        let context = str_arg(&args, "context");
        let system_prompt = str_arg(&args, "system_prompt");
        let output = self.0.run_one(&instruction, &context, &system_prompt).await;
        Ok(ToolOutcome::Continue(ToolResult::success(output)))
    }
}

struct SpawnWorkersTool(Arc<WorkerSpawner>);

#[async_trait]
impl Tool for SpawnWorkersTool {
    async fn invoke(&self, args: ToolArgs) -> StewardResult<ToolOutcome> {
        // `tasks` arrives either as a JSON array or as a string encoding one.
        let tasks = match args.get("tasks") {
            Some(serde_json::Value::Array(arr)) => arr.clone(),
            Some(serde_json::Value::String(s)) => match serde_json::from_str(s) {
                Ok(serde_json::Value::Array(arr)) => arr,
                Ok(_) => {
                    return Ok(ToolOutcome::Continue(ToolResult::failure(
                        "Expected JSON array",
                    )))
                }
                Err(err) => {
                    return Ok(ToolOutcome::Continue(ToolResult::failure(format!(
                        "Invalid JSON: {err}"
                    ))))
                }
            },
            _ => {
                return Ok(ToolOutcome::Continue(ToolResult::failure(
                    "spawn_workers requires a tasks array",
                )))
            }
        };

        let mut labels = Vec::with_capacity(tasks.len());
        let mut handles = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let (instruction, context, system_prompt) = match task {
                serde_json::Value::Object(obj) => (
                    obj.get("instruction")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    obj.get("context")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    obj.get("system_prompt")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                ),
                other => (other.to_string(), String::new(), String::new()),
            };
            labels.push(instruction.clone());
            let spawner = Arc::clone(&self.0);
            handles.push(tokio::spawn(async move {
                spawner.run_one(&instruction, &context, &system_prompt).await
            }));
        }

        // join_all keeps input order regardless of completion order.
        let outputs = futures_util::future::join_all(handles).await;
        let mut lines = Vec::new();
        for (i, (label, joined)) in labels.into_iter().zip(outputs).enumerate() {
            let output = match joined {
                Ok(output) => output,
                Err(err) => format!("[error] {err}"),
            };
            lines.push(format!("[worker {}] {label}", i + 1));
            lines.push(output);
            lines.push(String::new());
        }
        Ok(ToolOutcome::Continue(ToolResult::success(
            lines.join("\n").trim().to_string(),
        )))
    }
}

fn str_arg(args: &ToolArgs, name: &str) -> String {
    args.get(name)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn register_delegation_tools(
    tools: &mut ToolRegistry,
    spawner: &Arc<WorkerSpawner>,
) -> StewardResult<()> {
    tools.register(
        "spawn_worker",
        ToolSchema::new(
            "spawn_worker",
            "Spawn a worker agent to execute a specific task. The worker has \
             its own isolated context, runs the task, and returns the result. \
             Use this for tasks that can be delegated.",
        )
        .param(
            "instruction",
            "string",
            "Clear, specific instruction for the worker",
            true,
        )
        .param(
            "context",
            "string",
            "Relevant context from your conversation to pass to the worker",
            false,
        )
        .param(
            "system_prompt",
            "string",
            "Custom system prompt for the worker (optional)",
            false,
        ),
        Arc::new(SpawnWorkerTool(Arc::clone(spawner))),
    )?;
    tools.register(
        "spawn_workers",
        ToolSchema::new(
            "spawn_workers",
            "Spawn multiple workers in parallel. Each task runs independently. \
             Pass a JSON array of objects with 'instruction' and optional \
             'context' fields.",
        )
        .param(
            "tasks",
            "string",
            "JSON array: [{\"instruction\": \"...\", \"context\": \"...\"}, ...]",
            true,
        ),
        Arc::new(SpawnWorkersTool(Arc::clone(spawner))),
    )?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn call_key_is_order_insensitive() {
        let mut a = ToolArgs::new();
        a.insert("x".into(), serde_json::json!(1));
        a.insert("y".into(), serde_json::json!(2));
        let mut b = ToolArgs::new();
        b.insert("y".into(), serde_json::json!(2));
        b.insert("x".into(), serde_json::json!(1));

        assert_eq!(
            call_key(&ToolCall::new("add", a)),
            call_key(&ToolCall::new("add", b))
        );
    }

    #[test]
    fn call_key_distinguishes_args() {
        let mut a = ToolArgs::new();
        a.insert("x".into(), serde_json::json!(1));
        let mut b = ToolArgs::new();
        b.insert("x".into(), serde_json::json!(2));

        assert_ne!(
            call_key(&ToolCall::new("add", a)),
            call_key(&ToolCall::new("add", b))
        );
    }
}
