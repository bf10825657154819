//! Multi-provider LLM dispatch: credential rotation, provider adapters,
//! streaming accumulation, and the provider router.
//!
//! The layering is leaf-to-root: a [`RotationManager`] tracks the health of
//! one provider's credential pool; a [`ProviderAdapter`] translates
//! provider-agnostic [`CompletionRequest`]s into its backend's wire format
//! and drives a rotation manager through the retry loop; the [`LlmRouter`]
//! holds named adapters plus a default and dispatches blocking or streaming
//! requests.

pub mod adapters;
pub mod rotation;
pub mod router;
pub mod stream;
pub mod types;

pub use adapters::gemini::{GeminiAdapter, GeminiConfig, GEMINI_ALLOWED_MODELS};
pub use adapters::openai::{AuthBundle, OpenAiAdapter, OpenAiConfig, OPENAI_ALLOWED_MODELS};
pub use adapters::relay::{RelayAdapter, RelayConfig};
pub use adapters::ProviderAdapter;
pub use rotation::{RotationManager, RotationPolicy, RotationSlot, SlotState};
pub use router::LlmRouter;
pub use stream::accumulate_stream;
pub use types::{parse_tool_args, CompletionRequest, LlmResponse, StreamChunk, ToolCallDelta};
