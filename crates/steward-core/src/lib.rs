//! Core types and error definitions for the Steward agent framework.
//!
//! This crate provides the foundational types shared across all Steward
//! crates: the unified error enum, conversation messages, and the tool-call
//! abstractions exchanged between the LLM dispatch layer and the agent loop.
//!
//! # Main types
//!
//! - [`StewardError`] — Unified error enum covering provider, routing,
//!   configuration, and agent failures.
//! - [`StewardResult`] — Convenience alias for `Result<T, StewardError>`.
//! - [`Role`] / [`Message`] — A single message within a conversation.
//! - [`ToolCall`] / [`ToolSchema`] / [`ToolResult`] — The tool contract.
//! - [`AgentResult`] — Outcome of one agent `execute` run.

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the Steward framework.
///
/// Provider-level variants carry the raw response body (or transport error
/// text). [`StewardError::is_retryable`] encodes which of them are worth
/// retrying on a different credential slot.
#[derive(Debug, thiserror::Error)]
pub enum StewardError {
    /// The requested model is not in the provider's allow-list.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// The provider rejected the credential (401/403). The failing slot is
    /// disabled permanently, but the call may retry on a fresh slot.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Rate limit or quota exhaustion (429, or quota markers in a 2xx body).
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// A 5xx response from the provider.
    #[error("provider server error: {0}")]
    Server(String),

    /// A transport-level failure (connect, timeout, TLS, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// Any other 4xx response. Not retryable.
    #[error("provider API error: {0}")]
    Api(String),

    /// Every rotation slot is in cooldown or disabled.
    #[error("no available credential slot")]
    NoAvailableSlot,

    /// The retry budget ran out while rotating slots.
    #[error("all credential slots exhausted after {attempts} attempts: {last_error}")]
    SlotsExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The last provider error observed.
        last_error: String,
    },

    /// A completion named a provider the router does not know.
    #[error("provider not registered: {0}")]
    ProviderNotRegistered(String),

    /// An error in configuration or construction (missing credentials,
    /// duplicate tool registration, schema mismatch).
    #[error("config error: {0}")]
    Config(String),

    /// An error originating from the agent execution loop.
    #[error("agent error: {0}")]
    Agent(String),

    /// An error raised by a tool handler.
    #[error("tool error: {0}")]
    Tool(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StewardError {
    /// Whether the error is transient and worth retrying on another slot.
    ///
    /// Auth errors are retryable at the call level (the failing slot is
    /// disabled, a fresh one is drawn); rate limits, server errors, and
    /// network failures are retryable with backoff. `InvalidModel` and other
    /// API errors are not expected to succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StewardError::Auth(_)
                | StewardError::RateLimit(_)
                | StewardError::Server(_)
                | StewardError::Network(_)
        )
    }
}

/// A convenience `Result` alias using [`StewardError`].
pub type StewardResult<T> = Result<T, StewardError>;

// --- Message types ---

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A system-level instruction or prompt.
    System,
    /// A human end-user (also carries tool output back to the model).
    User,
    /// The AI assistant.
    Assistant,
}

impl Role {
    /// The lowercase wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
}

impl Message {
    /// Creates a new message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// --- Tool types ---

/// Arguments to a tool invocation, always a JSON object.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// A request from the LLM to invoke a specific tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to invoke.
    pub name: String,
    /// Arguments to pass to the tool.
    pub args: ToolArgs,
}

impl ToolCall {
    /// Creates a tool call with the given name and arguments.
    pub fn new(name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Metadata describing a tool's interface to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name, must match the name it is registered under.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON-schema parameter spec (`{"type": "object", ...}`).
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    /// Creates a schema with an empty object parameter spec.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Adds a parameter to the spec.
    pub fn param(
        mut self,
        name: &str,
        ty: &str,
        description: &str,
        required: bool,
    ) -> Self {
        if let Some(props) = self
            .parameters
            .get_mut("properties")
            .and_then(|p| p.as_object_mut())
        {
            props.insert(
                name.to_string(),
                serde_json::json!({"type": ty, "description": description}),
            );
        }
        if required {
            let list = self
                .parameters
                .as_object_mut()
                .and_then(|o| {
                    o.entry("required")
                        .or_insert_with(|| serde_json::json!([]))
                        .as_array_mut()
                });
            if let Some(list) = list {
                list.push(serde_json::json!(name));
            }
        }
        self
    }
}

/// The result returned after executing a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution succeeded.
    pub success: bool,
    /// The textual output produced by the tool.
    pub output: String,
    /// The error text, when execution failed.
    pub error: Option<String>,
}

impl ToolResult {
    /// Creates a successful tool result.
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Creates a failed tool result carrying the error text.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            output: format!("[error] {error}"),
            error: Some(error),
        }
    }
}

// --- Agent result ---

/// Outcome of one agent `execute` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the run produced a final answer within budget.
    pub success: bool,
    /// The final answer text (empty on budget exhaustion).
    pub output: String,
    /// The task-store id, when a task store is configured.
    pub task_id: Option<uuid::Uuid>,
    /// Optional diagnostic trace of the run.
    pub trace: Option<serde_json::Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert_eq!(Message::system("x").role, Role::System);
        assert_eq!(Message::assistant("x").role, Role::Assistant);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn schema_params_collect_required_flags() {
        let schema = ToolSchema::new("add", "Add two numbers")
            .param("a", "number", "left operand", true)
            .param("b", "number", "right operand", true)
            .param("note", "string", "optional note", false);

        let props = schema.parameters["properties"].as_object().unwrap();
        assert_eq!(props.len(), 3);
        assert_eq!(props["a"]["type"], "number");
        let required = schema.parameters["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert_eq!(required[0], "a");
    }

    #[test]
    fn tool_result_failure_carries_error() {
        let result = ToolResult::failure("boom");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.output.contains("boom"));
    }

    #[test]
    fn retryable_classification() {
        assert!(StewardError::Auth("401".into()).is_retryable());
        assert!(StewardError::RateLimit("429".into()).is_retryable());
        assert!(StewardError::Server("500".into()).is_retryable());
        assert!(StewardError::Network("timeout".into()).is_retryable());

        assert!(!StewardError::Api("400".into()).is_retryable());
        assert!(!StewardError::InvalidModel("nope".into()).is_retryable());
        assert!(!StewardError::ProviderNotRegistered("x".into()).is_retryable());
    }
}
