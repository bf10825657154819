//! Tool registry: maps tool names to handlers and schemas, executes
//! invocations, and isolates handler failures from the agent loop.

use async_trait::async_trait;
use std::sync::Arc;
use steward_core::{StewardError, StewardResult, ToolArgs, ToolResult, ToolSchema};
use tracing::{info, warn};

/// The name of the built-in final-answer tool.
pub const FINAL_ANSWER_TOOL: &str = "give_result";

/// Outcome of one tool execution.
///
/// `Finished` is the final-answer signal: it terminates the agent loop
/// successfully and is never absorbed into an error result.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// The loop continues; the result is fed back to the model.
    Continue(ToolResult),
    /// The agent's task output is ready.
    Finished(String),
}

/// Trait all tool handlers implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Executes the tool. Errors are absorbed into a failure [`ToolResult`]
    /// by the registry; return [`ToolOutcome::Finished`] to end the run.
    async fn invoke(&self, args: ToolArgs) -> StewardResult<ToolOutcome>;
}

/// Adapter turning a plain closure into a [`Tool`].
struct FnTool<F>(F);

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(ToolArgs) -> StewardResult<String> + Send + Sync,
{
    async fn invoke(&self, args: ToolArgs) -> StewardResult<ToolOutcome> {
        let output = (self.0)(args)?;
        Ok(ToolOutcome::Continue(ToolResult::success(output)))
    }
}

/// The built-in final-answer tool. Calling it ends the run with the given
/// result text.
struct FinalAnswerTool;

#[async_trait]
impl Tool for FinalAnswerTool {
    async fn invoke(&self, args: ToolArgs) -> StewardResult<ToolOutcome> {
        let result = match args.get("result") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Ok(ToolOutcome::Finished(result))
    }
}

/// The schema of the built-in final-answer tool.
pub fn final_answer_schema() -> ToolSchema {
    ToolSchema::new(
        FINAL_ANSWER_TOOL,
        "REQUIRED: Call this tool to deliver your final answer to the user. \
         The task is NOT complete until you call this tool.",
    )
    .param(
        "result",
        "string",
        "The final result/answer to show the user",
        true,
    )
}

struct ToolEntry {
    name: String,
    schema: ToolSchema,
    handler: Arc<dyn Tool>,
}

/// Central registry for an agent's tools. Entries keep registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolEntry>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-loaded with the final-answer tool.
    pub fn with_final_answer() -> Self {
        let mut registry = Self::new();
        // Infallible: the registry is empty and the schema name matches.
        let _ = registry.register(FINAL_ANSWER_TOOL, final_answer_schema(), Arc::new(FinalAnswerTool));
        registry
    }

    /// Registers a tool under a name.
    ///
    /// A name collision is a fatal construction error. An empty schema name
    /// is filled in from `name`; a mismatched one is rejected.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        mut schema: ToolSchema,
        handler: Arc<dyn Tool>,
    ) -> StewardResult<()> {
        let name = name.into();
        if self.has(&name) {
            return Err(StewardError::Config(format!(
                "tool {name} already registered"
            )));
        }
        if schema.name.is_empty() {
            schema.name = name.clone();
        } else if schema.name != name {
            return Err(StewardError::Config(format!(
                "tool schema name mismatch: {} != {name}",
                schema.name
            )));
        }

        info!(tool = %name, "registered tool");
        self.tools.push(ToolEntry {
            name,
            schema,
            handler,
        });
        Ok(())
    }

    /// Registers a plain closure as a tool.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        schema: ToolSchema,
        handler: F,
    ) -> StewardResult<()>
    where
        F: Fn(ToolArgs) -> StewardResult<String> + Send + Sync + 'static,
    {
        self.register(name, schema, Arc::new(FnTool(handler)))
    }

    /// Executes a tool invocation.
    ///
    /// An unknown tool yields a failure result, never an error. Handler
    /// failures are caught and converted to failure results carrying the
    /// error text; the final-answer signal passes through untouched.
    pub async fn execute(&self, name: &str, args: ToolArgs) -> ToolOutcome {
        let Some(entry) = self.tools.iter().find(|t| t.name == name) else {
            return ToolOutcome::Continue(ToolResult::failure(format!("Tool {name} not found")));
        };

        match entry.handler.invoke(args).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(tool = %name, error = %err, "tool handler failed");
                ToolOutcome::Continue(ToolResult::failure(err.to_string()))
            }
        }
    }

    /// Schemas in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    /// Whether a tool of this name is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}
