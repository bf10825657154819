//! Provider-agnostic request, response, and stream types.

use serde::{Deserialize, Serialize};
use steward_core::{Message, ToolArgs, ToolCall, ToolSchema};

/// A provider-agnostic completion request.
///
/// `model`, `provider`, and `temperature` are per-call overrides; when absent
/// the router's default provider and the adapter's configured model apply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The ordered conversation so far.
    pub messages: Vec<Message>,
    /// Tool schemas offered to the model, if any.
    pub tools: Option<Vec<ToolSchema>>,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Model override.
    pub model: Option<String>,
    /// Provider override (router key).
    pub provider: Option<String>,
}

impl CompletionRequest {
    /// Creates a request carrying only a message sequence.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// A normalized completion response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Assistant text content (may be empty when only tools are called).
    pub content: String,
    /// Tool invocations requested by the model, `None` when there are none.
    pub tool_calls: Option<Vec<ToolCall>>,
    /// The raw provider payload, for tracing.
    pub raw: Option<serde_json::Value>,
}

impl LlmResponse {
    /// Creates a text-only response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: None,
            raw: None,
        }
    }
}

/// An incremental tool-call fragment within a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Which tool call this fragment belongs to.
    pub index: usize,
    /// Tool name; the first non-empty name seen for an index wins.
    pub name: Option<String>,
    /// A fragment of the JSON-encoded arguments.
    pub args_delta: String,
}

/// One incremental fragment of a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta, appended in arrival order.
    pub delta: String,
    /// Tool-call fragment, if this chunk carries one.
    pub tool_call_delta: Option<ToolCallDelta>,
    /// Terminal reason; carries no payload.
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    /// A chunk carrying only a text delta.
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Self::default()
        }
    }

    /// A terminal chunk carrying a finish reason.
    pub fn finish(reason: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Normalizes tool-call arguments from heterogeneous provider shapes.
///
/// Providers deliver arguments either as a native JSON object or as a
/// JSON-encoded string. Both normalize to a map; a parse failure degrades to
/// an empty map rather than an error.
pub fn parse_tool_args(value: &serde_json::Value) -> ToolArgs {
    match value {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::String(s) => match serde_json::from_str(s) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => ToolArgs::new(),
        },
        _ => ToolArgs::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn args_from_native_object() {
        let value = serde_json::json!({"command": "ls"});
        let args = parse_tool_args(&value);
        assert_eq!(args["command"], "ls");
    }

    #[test]
    fn args_from_json_string() {
        let value = serde_json::json!(r#"{"command":"ls"}"#);
        let args = parse_tool_args(&value);
        assert_eq!(args["command"], "ls");
    }

    #[test]
    fn malformed_args_degrade_to_empty_map() {
        assert!(parse_tool_args(&serde_json::json!("{not json")).is_empty());
        assert!(parse_tool_args(&serde_json::json!(42)).is_empty());
        assert!(parse_tool_args(&serde_json::json!(["a"])).is_empty());
        assert!(parse_tool_args(&serde_json::Value::Null).is_empty());
    }
}
