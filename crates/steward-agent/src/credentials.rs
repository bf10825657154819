//! Credential configuration and router assembly.
//!
//! [`CredentialStore`] is an explicit object built once at startup;
//! [`CredentialStore::from_env`] is the single place the process
//! environment is read.

use crate::config::AgentConfig;
use std::path::PathBuf;
use std::sync::Arc;
use steward_core::{StewardError, StewardResult};
use steward_llm::{
    GeminiAdapter, GeminiConfig, LlmRouter, OpenAiAdapter, OpenAiConfig, RelayAdapter, RelayConfig,
};

/// Provider name for the Gemini family.
pub const PROVIDER_GEMINI: &str = "gemini";
/// Provider name for the OpenAI Responses family.
pub const PROVIDER_OPENAI: &str = "openai";
/// Provider name for generic relays.
pub const PROVIDER_RELAY: &str = "relay";

/// Credentials for every provider family, gathered in one place.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    /// Gemini API keys.
    pub gemini_keys: Vec<String>,
    /// OpenAI bearer keys.
    pub openai_keys: Vec<String>,
    /// OpenAI auth-bundle file paths.
    pub openai_auth_files: Vec<PathBuf>,
    /// Relay bearer keys.
    pub relay_keys: Vec<String>,
    /// Relay base URL; required to register the relay family.
    pub relay_base_url: Option<String>,
    /// Relay endpoint path; defaults to `/responses` when unset.
    pub relay_endpoint: Option<String>,
}

impl CredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads credentials from the process environment.
    ///
    /// Each family accepts a primary variable (`GEMINI_API_KEY`), a
    /// comma-separated list (`GEMINI_API_KEYS`), and numbered variants
    /// (`GEMINI_API_KEY_2` through `GEMINI_API_KEY_9`); duplicates are
    /// dropped while preserving first-seen order.
    pub fn from_env() -> Self {
        let lookup = |name: &str| std::env::var(name).ok();
        Self::from_lookup(&lookup)
    }

    /// Builds a store from an arbitrary variable lookup. Exists so tests can
    /// supply a map instead of mutating the process environment.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            gemini_keys: keys_from(lookup, "GEMINI_API_KEY"),
            openai_keys: keys_from(lookup, "OPENAI_API_KEY"),
            openai_auth_files: lookup("OPENAI_AUTH_FILE")
                .map(|p| vec![PathBuf::from(p)])
                .unwrap_or_default(),
            relay_keys: keys_from(lookup, "RELAY_API_KEY"),
            relay_base_url: lookup("RELAY_BASE_URL"),
            relay_endpoint: lookup("RELAY_ENDPOINT"),
        }
    }

    /// Whether any family has at least one credential.
    pub fn is_empty(&self) -> bool {
        self.gemini_keys.is_empty()
            && self.openai_keys.is_empty()
            && self.openai_auth_files.is_empty()
            && self.relay_keys.is_empty()
    }

    fn has_family(&self, provider: &str) -> bool {
        match provider {
            PROVIDER_GEMINI => !self.gemini_keys.is_empty(),
            PROVIDER_OPENAI => !self.openai_keys.is_empty() || !self.openai_auth_files.is_empty(),
            PROVIDER_RELAY => !self.relay_keys.is_empty() && self.relay_base_url.is_some(),
            _ => false,
        }
    }
}

/// Collects credential values for `{base}`, `{base}S` (comma list) and
/// `{base}_2` through `{base}_9`, dropping duplicates.
fn keys_from(lookup: &dyn Fn(&str) -> Option<String>, base: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut push = |value: String| {
        let trimmed = value.trim();
        if !trimmed.is_empty() && !keys.iter().any(|k| k == trimmed) {
            keys.push(trimmed.to_string());
        }
    };

    if let Some(value) = lookup(base) {
        push(value);
    }
    if let Some(value) = lookup(&format!("{base}S")) {
        for part in value.split(',') {
            push(part.to_string());
        }
    }
    for n in 2..=9 {
        if let Some(value) = lookup(&format!("{base}_{n}")) {
            push(value);
        }
    }
    keys
}

/// Builds a router registering every provider family the store has
/// credentials for.
///
/// The default provider comes from `config.provider` (falling back to the
/// Gemini family); a default provider with no credentials is a fatal
/// `Config` error, other families are skipped silently.
pub fn build_router(store: &CredentialStore, config: &AgentConfig) -> StewardResult<LlmRouter> {
    let default_provider = config.provider.as_deref().unwrap_or(PROVIDER_GEMINI);
    if !store.has_family(default_provider) {
        return Err(StewardError::Config(format!(
            "no credentials for default provider '{default_provider}'"
        )));
    }

    let mut router = LlmRouter::new(default_provider);

    if !store.gemini_keys.is_empty() {
        let mut gemini = GeminiConfig {
            api_keys: store.gemini_keys.clone(),
            temperature: config.temperature,
            ..GeminiConfig::default()
        };
        if default_provider == PROVIDER_GEMINI {
            if let Some(model) = &config.model {
                gemini.model = model.clone();
            }
        }
        router.register_provider(PROVIDER_GEMINI, Arc::new(GeminiAdapter::new(gemini)?));
    }

    if !store.openai_keys.is_empty() || !store.openai_auth_files.is_empty() {
        let mut openai = OpenAiConfig {
            api_keys: store.openai_keys.clone(),
            auth_files: store.openai_auth_files.clone(),
            ..OpenAiConfig::default()
        };
        if let Some(effort) = &config.reasoning_effort {
            openai.reasoning_effort = effort.clone();
        }
        if default_provider == PROVIDER_OPENAI {
            if let Some(model) = &config.model {
                openai.model = model.clone();
            }
        }
        router.register_provider(PROVIDER_OPENAI, Arc::new(OpenAiAdapter::new(openai)?));
    }

    if let (false, Some(base_url)) = (store.relay_keys.is_empty(), &store.relay_base_url) {
        let mut relay = RelayConfig {
            api_keys: store.relay_keys.clone(),
            base_url: base_url.clone(),
            temperature: config.temperature,
            ..RelayConfig::default()
        };
        if let Some(endpoint) = &store.relay_endpoint {
            relay.endpoint = endpoint.clone();
        }
        if default_provider == PROVIDER_RELAY {
            relay.model = config.model.clone();
        }
        router.register_provider(PROVIDER_RELAY, Arc::new(RelayAdapter::new(relay)?));
    }

    Ok(router)
}
