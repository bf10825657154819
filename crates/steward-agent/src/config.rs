//! Agent configuration and per-call overrides.

/// Static configuration for an [`crate::Agent`].
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Provider name override; `None` keeps the router default.
    pub provider: Option<String>,
    /// Model override; `None` keeps each adapter's configured default.
    pub model: Option<String>,
    /// Reasoning effort hint forwarded to adapters that honor it.
    pub reasoning_effort: Option<String>,
    /// Hard cap on completion rounds per `execute` run.
    pub max_iterations: usize,
    /// Sampling temperature forwarded to the provider.
    pub temperature: f32,
    /// Whether `execute` runs are recorded in the task store.
    pub enable_task_store: bool,
    /// Whether the delegation tools (`spawn_worker`, `spawn_workers`) are
    /// registered.
    pub enable_delegation: bool,
    /// Provider for spawned workers; `None` inherits the agent's.
    pub worker_provider: Option<String>,
    /// Model for spawned workers; `None` inherits the agent's.
    pub worker_model: Option<String>,
    /// Iteration cap for spawned workers; `None` inherits the agent's.
    pub worker_max_iterations: Option<usize>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            reasoning_effort: None,
            max_iterations: 10,
            temperature: 0.3,
            enable_task_store: false,
            enable_delegation: false,
            worker_provider: None,
            worker_model: None,
            worker_max_iterations: None,
        }
    }
}

impl AgentConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins a provider for every completion made by the agent.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Pins a model for every completion made by the agent.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enables the task store.
    pub fn with_task_store(mut self) -> Self {
        self.enable_task_store = true;
        self
    }

    /// Enables the delegation tools.
    pub fn with_delegation(mut self) -> Self {
        self.enable_delegation = true;
        self
    }
}

/// Per-call overrides applied on top of [`AgentConfig`] for a single
/// `execute_with` or `chat_with` invocation. Never mutates agent state.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Provider override for this call only.
    pub provider: Option<String>,
    /// Model override for this call only.
    pub model: Option<String>,
    /// Temperature override for this call only.
    pub temperature: Option<f32>,
}

impl CallOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the provider.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Overrides the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Overrides the temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}
