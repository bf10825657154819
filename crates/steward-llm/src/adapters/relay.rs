//! Relay backend family: a generic bearer-key backend with an explicit base
//! URL, flat message payload, and a plain text response field. Used for
//! self-hosted gateways and OpenAI-compatible relays.

use super::{classify_status, complete_with_rotation, ProviderAdapter};
use crate::rotation::{RotationManager, RotationSlot};
use crate::types::{CompletionRequest, LlmResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use steward_core::{StewardError, StewardResult};

/// Configuration for a [`RelayAdapter`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bearer keys; one rotation slot each.
    pub api_keys: Vec<String>,
    /// Base URL of the relay (required; there is no public default).
    pub base_url: String,
    /// Endpoint path appended to the base URL.
    pub endpoint: String,
    /// Default model forwarded with requests, if any; relays accept any
    /// model name, so there is no allow-list.
    pub model: Option<String>,
    /// Default sampling temperature.
    pub temperature: f32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: String::new(),
            endpoint: "/responses".to_string(),
            model: None,
            temperature: 0.3,
        }
    }
}

/// Adapter for generic relay backends.
pub struct RelayAdapter {
    config: RelayConfig,
    rotation: Arc<RotationManager>,
    keys: HashMap<String, String>,
    http: reqwest::Client,
}

impl RelayAdapter {
    /// Creates an adapter with a fresh rotation manager.
    pub fn new(config: RelayConfig) -> StewardResult<Self> {
        Self::with_rotation(config, Arc::new(RotationManager::default()))
    }

    /// Creates an adapter sharing an existing rotation manager.
    pub fn with_rotation(
        config: RelayConfig,
        rotation: Arc<RotationManager>,
    ) -> StewardResult<Self> {
        if config.api_keys.is_empty() {
            return Err(StewardError::Config("relay api_keys required".into()));
        }
        if config.base_url.is_empty() {
            return Err(StewardError::Config("relay base_url required".into()));
        }

        let mut keys = HashMap::new();
        for (idx, key) in config.api_keys.iter().enumerate() {
            let slot_id = format!("k{idx}");
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

    fn build_payload(&self, request: &CompletionRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect();

        let mut payload = serde_json::json!({
            "model": request.model.as_deref().or(self.config.model.as_deref()),
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
        });
        if let Some(tools) = request.tools.as_ref().filter(|t| !t.is_empty()) {
            let tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
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
        api_key: &str,
    ) -> StewardResult<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url, self.config.endpoint);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
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

/// Extracts the plain text field a relay responds with.
pub(crate) fn extract_text(raw: &serde_json::Value) -> String {
    raw["output_text"]
        .as_str()
        .or_else(|| raw["text"].as_str())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ProviderAdapter for RelayAdapter {
    async fn complete(&self, request: &CompletionRequest) -> StewardResult<LlmResponse> {
        let payload = self.build_payload(request);

        complete_with_rotation(&self.rotation, |slot| {
            let payload = &payload;
            async move {
                let key = self
                    .keys
                    .get(&slot.id)
                    .ok_or_else(|| StewardError::Config(format!("unknown slot {}", slot.id)))?;
                let raw = self.send(payload, key).await?;
                Ok(LlmResponse {
                    content: extract_text(&raw),
                    tool_calls: None,
                    raw: Some(raw),
                })
            }
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use steward_core::Message;

    #[test]
    fn requires_keys_and_base_url() {
        assert!(matches!(
            RelayAdapter::new(RelayConfig::default()),
            Err(StewardError::Config(_))
        ));
        assert!(matches!(
            RelayAdapter::new(RelayConfig {
                api_keys: vec!["k".into()],
                ..RelayConfig::default()
            }),
            Err(StewardError::Config(_))
        ));
    }

    #[test]
    fn payload_is_flat_messages() {
        let adapter = RelayAdapter::new(RelayConfig {
            api_keys: vec!["k".into()],
            base_url: "http://relay.local".into(),
            model: Some("any-model".into()),
            ..RelayConfig::default()
        })
        .unwrap();

        let payload = adapter.build_payload(&CompletionRequest::new(vec![
            Message::system("s"),
            Message::user("u"),
        ]));

        assert_eq!(payload["model"], "any-model");
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
    }

    #[test]
    fn extracts_plain_text_fields() {
        assert_eq!(extract_text(&serde_json::json!({"output_text": "a"})), "a");
        assert_eq!(extract_text(&serde_json::json!({"text": "b"})), "b");
        assert_eq!(extract_text(&serde_json::json!({"other": "c"})), "");
    }
}
