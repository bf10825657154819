//! Gemini backend family: `generateContent` wire format, candidate/part
//! response shape, `x-goog-api-key` credential header.

use super::{classify_status, complete_with_rotation, has_quota_markers, ProviderAdapter};
use crate::rotation::{RotationManager, RotationSlot};
use crate::types::{parse_tool_args, CompletionRequest, LlmResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use steward_core::{Role, StewardError, StewardResult, ToolCall};

/// Models the Gemini family accepts.
pub const GEMINI_ALLOWED_MODELS: &[&str] = &["gemini-3-flash-preview", "gemini-3-pro-preview"];

/// Configuration for a [`GeminiAdapter`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Credential pool; one rotation slot is built per key.
    pub api_keys: Vec<String>,
    /// Default model when a request carries no override.
    pub model: String,
    /// Default sampling temperature.
    pub temperature: f32,
    /// API base URL.
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: "gemini-3-flash-preview".to_string(),
            temperature: 0.3,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }
}

/// Adapter for the Gemini backend family.
#[derive(Debug)]
pub struct GeminiAdapter {
    config: GeminiConfig,
    rotation: Arc<RotationManager>,
    keys: HashMap<String, String>,
    http: reqwest::Client,
}

impl GeminiAdapter {
    /// Creates an adapter with a fresh rotation manager.
    pub fn new(config: GeminiConfig) -> StewardResult<Self> {
        Self::with_rotation(config, Arc::new(RotationManager::default()))
    }

    /// Creates an adapter sharing an existing rotation manager.
    ///
    /// Fails fast when the key pool is empty or the configured model is not
    /// in the allow-list.
    pub fn with_rotation(
        config: GeminiConfig,
        rotation: Arc<RotationManager>,
    ) -> StewardResult<Self> {
        if config.api_keys.is_empty() {
            return Err(StewardError::Config("gemini api_keys required".into()));
        }
        validate_model(&config.model)?;

        let mut keys = HashMap::new();
        for (idx, key) in config.api_keys.iter().enumerate() {
            let slot_id = format!("g{idx}");
            rotation.add_slot(RotationSlot::new(slot_id.clone()));
            keys.insert(slot_id, key.clone());
        }

        Ok(Self {
            config,
            rotation,
            keys,
            http: reqwest::Client::new(),
        })
    }

    /// The rotation manager backing this adapter.
    pub fn rotation(&self) -> &Arc<RotationManager> {
        &self.rotation
    }

    fn build_payload(&self, request: &CompletionRequest, temperature: f32) -> serde_json::Value {
        let mut contents = Vec::new();
        let mut system_instruction = None;

        for msg in &request.messages {
            match msg.role {
                Role::System => system_instruction = Some(msg.content.clone()),
                Role::User => contents.push(serde_json::json!({
                    "role": "user",
                    "parts": [{"text": msg.content}],
                })),
                Role::Assistant => contents.push(serde_json::json!({
                    "role": "model",
                    "parts": [{"text": msg.content}],
                })),
            }
        }

        let mut payload = serde_json::json!({
            "contents": contents,
            "generationConfig": {"temperature": temperature},
        });

        if let Some(system) = system_instruction {
            payload["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
        }

        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            let declarations: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            payload["tools"] = serde_json::json!([{"functionDeclarations": declarations}]);
        }

        payload
    }

    async fn send(
        &self,
        payload: &serde_json::Value,
        model: &str,
        api_key: &str,
    ) -> StewardResult<serde_json::Value> {
        let base = self.config.base_url.trim_end_matches('/');
        let url = format!("{base}/v1beta/models/{model}:generateContent");

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", api_key)
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
        // Quota exhaustion occasionally rides inside a 2xx body.
        if has_quota_markers(&body) {
            return Err(StewardError::RateLimit(body));
        }

        serde_json::from_str(&body).map_err(|e| StewardError::Api(e.to_string()))
    }
}

/// Parses a candidate/part response body into a normalized response.
pub(crate) fn parse_response(raw: serde_json::Value) -> LlmResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    let parts = raw["candidates"][0]["content"]["parts"].as_array();
    if let Some(parts) = parts {
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                content.push_str(text);
            }
            if let Some(fc) = part.get("functionCall") {
                tool_calls.push(ToolCall::new(
                    fc["name"].as_str().unwrap_or_default(),
                    parse_tool_args(&fc["args"]),
                ));
            }
        }
    }

    LlmResponse {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        raw: Some(raw),
    }
}

fn validate_model(model: &str) -> StewardResult<()> {
    if GEMINI_ALLOWED_MODELS.contains(&model) {
        Ok(())
    } else {
        Err(StewardError::InvalidModel(model.to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn complete(&self, request: &CompletionRequest) -> StewardResult<LlmResponse> {
        let model = request.model.as_deref().unwrap_or(&self.config.model);
        validate_model(model)?;
        let temperature = request.temperature.unwrap_or(self.config.temperature);
        let payload = self.build_payload(request, temperature);

        complete_with_rotation(&self.rotation, |slot| {
            let payload = &payload;
            async move {
                let key = self
                    .keys
                    .get(&slot.id)
                    .ok_or_else(|| StewardError::Config(format!("unknown slot {}", slot.id)))?;
                let raw = self.send(payload, model, key).await?;
                Ok(parse_response(raw))
            }
        })
        .await
    }
}
