//! Execution trace for the most recent run. Purely observational.

use serde::Serialize;
use steward_core::{ToolCall, ToolResult};

/// One completion round as recorded in a [`Trace`].
#[derive(Debug, Clone, Serialize, Default)]
pub struct TraceIteration {
    /// Raw provider payload for this round, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    /// Assistant text returned this round.
    pub content: String,
    /// Tool calls requested this round.
    pub tool_calls: Vec<ToolCall>,
    /// Results produced for those calls, in execution order.
    pub tool_results: Vec<ToolResult>,
}

/// Recorded trace of one `execute` run.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Trace {
    /// Provider the run resolved to, if pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model the run resolved to, if pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Per-round records, in order.
    pub iterations: Vec<TraceIteration>,
}

impl Trace {
    /// Empty trace tagged with the run's provider/model pins.
    pub fn new(provider: Option<String>, model: Option<String>) -> Self {
        Self {
            provider,
            model,
            iterations: Vec::new(),
        }
    }

    /// Serializes the trace to a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use steward_core::ToolArgs;

    #[test]
    fn serializes_iterations_in_order() {
        let mut trace = Trace::new(Some("gemini".into()), None);
        trace.iterations.push(TraceIteration {
            raw: None,
            content: "thinking".into(),
            tool_calls: vec![ToolCall {
                name: "add".into(),
                args: ToolArgs::new(),
            }],
            tool_results: vec![ToolResult::success("5")],
        });

        let value = trace.to_value();
        assert_eq!(value["provider"], "gemini");
        assert!(value.get("model").is_none());
        assert_eq!(value["iterations"][0]["tool_calls"][0]["name"], "add");
    }
}
