//! Reduction of an ordered stream of [`StreamChunk`]s into one finalized
//! [`LlmResponse`].

use crate::types::{LlmResponse, StreamChunk};
use std::collections::BTreeMap;
use steward_core::{ToolArgs, ToolCall};
use tokio::sync::mpsc;

/// Collects a finite, single-pass chunk stream into a complete response.
///
/// Text deltas concatenate in arrival order. Tool-call fragments group by
/// index: the first non-empty name for an index wins; argument deltas
/// concatenate and are JSON-parsed once at the end (unparsable arguments
/// degrade to an empty map, never an error). Finish-reason chunks carry no
/// payload.
pub async fn accumulate_stream(mut rx: mpsc::Receiver<StreamChunk>) -> LlmResponse {
    let mut content = String::new();
    // index -> (name, concatenated args json)
    let mut calls: BTreeMap<usize, (String, String)> = BTreeMap::new();

    while let Some(chunk) = rx.recv().await {
        if !chunk.delta.is_empty() {
            content.push_str(&chunk.delta);
        }
        if let Some(delta) = chunk.tool_call_delta {
            let entry = calls.entry(delta.index).or_default();
            if entry.0.is_empty() {
                if let Some(name) = delta.name.filter(|n| !n.is_empty()) {
                    entry.0 = name;
                }
            }
            entry.1.push_str(&delta.args_delta);
        }
    }

    let tool_calls: Vec<ToolCall> = calls
        .into_values()
        .map(|(name, args_json)| {
            let args = if args_json.is_empty() {
                ToolArgs::new()
            } else {
                serde_json::from_str(&args_json).unwrap_or_default()
            };
            ToolCall::new(name, args)
        })
        .collect();

    LlmResponse {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        raw: None,
    }
}
