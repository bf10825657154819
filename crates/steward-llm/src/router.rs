//! Dispatch of completion requests to named provider adapters.

use crate::adapters::ProviderAdapter;
use crate::types::{CompletionRequest, LlmResponse, StreamChunk, ToolCallDelta};
use std::collections::HashMap;
use std::sync::Arc;
use steward_core::{StewardError, StewardResult};
use tokio::sync::mpsc;
use tracing::debug;

/// Holds named adapters plus a default and dispatches blocking or streaming
/// completion requests.
///
/// A router is constructed once and shared (`Arc`) across an agent and any
/// workers it spawns, so rotation and cooldown state is shared too.
pub struct LlmRouter {
    default_provider: String,
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl std::fmt::Debug for LlmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRouter")
            .field("default_provider", &self.default_provider)
            .field("providers", &self.providers.keys())
            .finish()
    }
}

impl LlmRouter {
    /// Creates an empty router with the given default provider name.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            default_provider: default_provider.into(),
            providers: HashMap::new(),
        }
    }

    /// Registers an adapter under a provider name, replacing any previous
    /// adapter of that name.
    pub fn register_provider(&mut self, name: impl Into<String>, adapter: Arc<dyn ProviderAdapter>) {
        self.providers.insert(name.into(), adapter);
    }

    /// The default provider name.
    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Whether a provider of this name is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    fn resolve(&self, request: &CompletionRequest) -> StewardResult<&Arc<dyn ProviderAdapter>> {
        let provider = request
            .provider
            .as_deref()
            .unwrap_or(&self.default_provider);
        self.providers
            .get(provider)
            .ok_or_else(|| StewardError::ProviderNotRegistered(provider.to_string()))
    }

    /// Dispatches a blocking completion to the resolved provider.
    ///
    /// An unregistered provider is a fatal routing error, never retried.
    pub async fn complete(&self, request: &CompletionRequest) -> StewardResult<LlmResponse> {
        self.resolve(request)?.complete(request).await
    }

    /// Dispatches a streaming completion.
    ///
    /// Delegates to the adapter's native streaming when the capability probe
    /// returns one; otherwise synthesizes a chunk stream over a blocking
    /// `complete`: one text chunk, one chunk per tool call with the full
    /// serialized arguments, then a finish chunk.
    pub async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> StewardResult<mpsc::Receiver<StreamChunk>> {
        let adapter = self.resolve(request)?;

        if let Some(native) = adapter.complete_stream(request).await {
            return native;
        }

        debug!("provider lacks native streaming, synthesizing single-shot stream");
        let response = adapter.complete(request).await?;

        let (tx, rx) = mpsc::channel::<StreamChunk>(16);
        tokio::spawn(async move {
            if !response.content.is_empty() {
                if tx.send(StreamChunk::text(response.content)).await.is_err() {
                    return;
                }
            }
            if let Some(calls) = response.tool_calls {
                for (index, call) in calls.into_iter().enumerate() {
                    let args_delta = serde_json::Value::Object(call.args).to_string();
                    let chunk = StreamChunk {
                        tool_call_delta: Some(ToolCallDelta {
                            index,
                            name: Some(call.name),
                            args_delta,
                        }),
                        ..StreamChunk::default()
                    };
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(StreamChunk::finish("stop")).await;
        });

        Ok(rx)
    }
}
