//! OpenAI Responses backend family: `instructions`/`input` wire format,
//! typed content-part responses, bearer keys or file-based auth bundles,
//! native SSE streaming.

use super::{classify_status, complete_with_rotation, ProviderAdapter};
use crate::rotation::{RotationManager, RotationSlot};
use crate::types::{parse_tool_args, CompletionRequest, LlmResponse, StreamChunk, ToolCallDelta};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use steward_core::{Role, StewardError, StewardResult, ToolCall};
use tokio::sync::mpsc;
use tracing::warn;

/// Models the OpenAI Responses family accepts.
pub const OPENAI_ALLOWED_MODELS: &[&str] = &[
    "gpt-5.2-codex",
    "gpt-5.1-codex-mini",
    "gpt-5.1-codex-max",
    "gpt-5.1-codex",
    "gpt-5-codex",
    "gpt-5-codex-mini",
    "gpt-5.2",
    "gpt-5.1",
    "gpt-5",
];

/// A file-based credential bundle (`tokens` object in an auth JSON file).
#[derive(Debug, Clone)]
pub struct AuthBundle {
    /// Bearer token used for requests.
    pub access_token: String,
    /// Refresh token, kept for completeness.
    pub refresh_token: String,
    /// Account identifier.
    pub account_id: String,
    /// Optional identity token.
    pub id_token: Option<String>,
}

impl AuthBundle {
    /// Loads a bundle from an auth JSON file.
    pub fn load(path: &Path) -> StewardResult<Self> {
        let data: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let tokens = &data["tokens"];
        let access_token = tokens["access_token"]
            .as_str()
            .ok_or_else(|| {
                StewardError::Config(format!("auth file {} missing access_token", path.display()))
            })?
            .to_string();
        Ok(Self {
            access_token,
            refresh_token: tokens["refresh_token"].as_str().unwrap_or_default().into(),
            account_id: tokens["account_id"].as_str().unwrap_or_default().into(),
            id_token: tokens["id_token"].as_str().map(str::to_string),
        })
    }
}

#[derive(Debug)]
enum Credential {
    ApiKey(String),
    Bundle(AuthBundle),
}

impl Credential {
    fn bearer(&self) -> &str {
        match self {
            Credential::ApiKey(key) => key,
            Credential::Bundle(bundle) => &bundle.access_token,
        }
    }
}

/// Configuration for an [`OpenAiAdapter`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Plain bearer keys; one slot each.
    pub api_keys: Vec<String>,
    /// Auth-bundle file paths; one slot each.
    pub auth_files: Vec<PathBuf>,
    /// Default model when a request carries no override.
    pub model: String,
    /// Reasoning effort forwarded with every request.
    pub reasoning_effort: String,
    /// API base URL.
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            auth_files: Vec::new(),
            model: "gpt-5.2-codex".to_string(),
            reasoning_effort: "medium".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Adapter for the OpenAI Responses backend family.
#[derive(Debug)]
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    rotation: Arc<RotationManager>,
    creds: HashMap<String, Credential>,
    http: reqwest::Client,
}

impl OpenAiAdapter {
    /// Creates an adapter with a fresh rotation manager.
    pub fn new(config: OpenAiConfig) -> StewardResult<Self> {
        Self::with_rotation(config, Arc::new(RotationManager::default()))
    }

    /// Creates an adapter sharing an existing rotation manager.
    ///
    /// Builds one slot per key and one per auth bundle; fails fast when both
    /// pools are empty or the configured model is unknown.
    pub fn with_rotation(
        config: OpenAiConfig,
        rotation: Arc<RotationManager>,
    ) -> StewardResult<Self> {
        validate_model(&config.model)?;

        let mut creds = HashMap::new();
        for (idx, key) in config.api_keys.iter().enumerate() {
            let slot_id = format!("api:{idx}");
            rotation.add_slot(RotationSlot::new(slot_id.clone()));
            creds.insert(slot_id, Credential::ApiKey(key.clone()));
        }
        for (idx, path) in config.auth_files.iter().enumerate() {
            let bundle = AuthBundle::load(path)?;
            let slot_id = format!("auth:{idx}");
            rotation.add_slot(RotationSlot::new(slot_id.clone()));
            creds.insert(slot_id, Credential::Bundle(bundle));
        }

        if creds.is_empty() {
            return Err(StewardError::Config(
                "openai requires api_keys or auth_files".into(),
            ));
        }

        Ok(Self {
            config,
            rotation,
            creds,
            http: reqwest::Client::new(),
        })
    }

    /// The rotation manager backing this adapter.
    pub fn rotation(&self) -> &Arc<RotationManager> {
        &self.rotation
    }

    fn build_payload(
        &self,
        request: &CompletionRequest,
        model: &str,
        stream: bool,
    ) -> serde_json::Value {
        let mut instructions = None;
        let mut input_items = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => instructions = Some(msg.content.clone()),
                _ => input_items.push(serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.content,
                })),
            }
        }

        let mut payload = serde_json::json!({
            "model": model,
            "input": input_items,
            "stream": stream,
            "store": false,
            "reasoning": {"effort": self.config.reasoning_effort},
        });
        if let Some(instructions) = instructions {
            payload["instructions"] = serde_json::json!(instructions);
        }
        if let Some(temperature) = request.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            let tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            payload["tools"] = serde_json::json!(tools);
        }
        payload
    }

    async fn send(
        &self,
        payload: &serde_json::Value,
        bearer: &str,
    ) -> StewardResult<serde_json::Value> {
        let resp = self
            .http
            .post(format!("{}/responses", self.config.base_url))
            .header("Authorization", format!("Bearer {bearer}"))
            .json(payload)
            .send()
            .await
            .map_err(|e| StewardError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| StewardError::Network(e.to_string()))?;

        if status >= 400 {
            return Err(classify_status(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| StewardError::Api(e.to_string()))
    }
}

/// Parses an `output_text` / typed content-part response body.
pub(crate) fn parse_response(raw: serde_json::Value) -> LlmResponse {
    let mut content = raw["output_text"].as_str().unwrap_or_default().to_string();
    let mut tool_calls = Vec::new();

    if content.is_empty() {
        if let Some(items) = raw["output"].as_array() {
            for item in items {
                let Some(parts) = item["content"].as_array() else {
                    continue;
                };
                for part in parts {
                    match part["type"].as_str() {
                        Some("output_text") | Some("text") => {
                            content.push_str(part["text"].as_str().unwrap_or_default());
                        }
                        Some("tool_call") | Some("function_call") => {
                            tool_calls.push(ToolCall::new(
                                part["name"].as_str().unwrap_or_default(),
                                parse_tool_args(&part["arguments"]),
                            ));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    LlmResponse {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        raw: Some(raw),
    }
}

/// Maps one SSE event payload to a stream chunk, if it carries one.
pub(crate) fn chunk_from_event(event: &serde_json::Value) -> Option<StreamChunk> {
    match event["type"].as_str()? {
        "response.output_text.delta" => Some(StreamChunk::text(
            event["delta"].as_str().unwrap_or_default(),
        )),
        "response.output_item.added" => {
            let item = &event["item"];
            if item["type"].as_str() == Some("function_call") {
                Some(StreamChunk {
                    tool_call_delta: Some(ToolCallDelta {
                        index: event["output_index"].as_u64().unwrap_or(0) as usize,
                        name: item["name"].as_str().map(str::to_string),
                        args_delta: String::new(),
                    }),
                    ..StreamChunk::default()
                })
            } else {
                None
            }
        }
        "response.function_call_arguments.delta" => Some(StreamChunk {
            tool_call_delta: Some(ToolCallDelta {
                index: event["output_index"].as_u64().unwrap_or(0) as usize,
                name: None,
                args_delta: event["delta"].as_str().unwrap_or_default().to_string(),
            }),
            ..StreamChunk::default()
        }),
        "response.completed" => Some(StreamChunk::finish("stop")),
        _ => None,
    }
}

fn validate_model(model: &str) -> StewardResult<()> {
    if OPENAI_ALLOWED_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(StewardError::InvalidModel(model.to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(&self, request: &CompletionRequest) -> StewardResult<LlmResponse> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        validate_model(model)?;
        let payload = self.build_payload(request, model, false);

        complete_with_rotation(&self.rotation, |slot| {
            let payload = &payload;
            async move {
                let cred = self
                    .creds
                    .get(&slot.id)
                    .ok_or_else(|| StewardError::Config(format!("unknown slot {}", slot.id)))?;
                let raw = self.send(payload, cred.bearer()).await?;
                Ok(parse_response(raw))
            }
        })
        .await
    }

    async fn complete_stream(
        &self,
        request: &CompletionRequest,
    ) -> Option<StewardResult<mpsc::Receiver<StreamChunk>>> {
        Some(self.stream_inner(request).await)
    }
}

impl OpenAiAdapter {
    async fn stream_inner(
        &self,
        request: &CompletionRequest,
    ) -> StewardResult<mpsc::Receiver<StreamChunk>> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        validate_model(model)?;
        let payload = self.build_payload(request, model, true);

        // Streaming setup retries slot selection but not mid-stream errors;
        // an interrupted stream surfaces as a truncated chunk sequence.
        let slot = self.rotation.select_slot()?;
        let cred = self
            .creds
            .get(&slot.id)
            .ok_or_else(|| StewardError::Config(format!("unknown slot {}", slot.id)))?;

        let resp = self
            .http
            .post(format!("{}/responses", self.config.base_url))
            .header("Authorization", format!("Bearer {}", cred.bearer()))
            .json(&payload)
            .send()
            .await
            .map_err(|e| StewardError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            let err = classify_status(status, &body);
            match &err {
                StewardError::RateLimit(msg) => self.rotation.report_rate_limit(&slot.id, Some(msg)),
                StewardError::Auth(_) => self.rotation.report_auth_error(&slot.id),
                _ => {}
            }
            return Err(err);
        }
        self.rotation.report_success(&slot.id);

        let (tx, rx) = mpsc::channel::<StreamChunk>(256);
        let mut byte_stream = resp.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();
            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "stream read error, ending stream");
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    let event: serde_json::Value = match serde_json::from_str(data) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if let Some(chunk) = chunk_from_event(&event) {
                        let done = chunk.finish_reason.is_some();
                        if tx.send(chunk).await.is_err() {
                            return;
                        }
                        if done {
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
