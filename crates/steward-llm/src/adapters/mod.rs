//! Provider adapters: one module per backend family.
//!
//! Each adapter translates a provider-agnostic [`CompletionRequest`] into its
//! backend's wire format, executes the call through a shared
//! [`RotationManager`], classifies failures, and normalizes the response.
//!
//! To add a new backend family:
//! 1. Create a module here implementing [`ProviderAdapter`].
//! 2. Register an instance with the router under a provider name.

pub mod gemini;
pub mod openai;
pub mod relay;

use crate::rotation::{RotationManager, RotationSlot};
use crate::types::{CompletionRequest, LlmResponse, StreamChunk};
use async_trait::async_trait;
use steward_core::{StewardError, StewardResult};
use tokio::sync::mpsc;
use tracing::warn;

/// Interface every backend family implements.
///
/// `complete` is the sole required operation. `complete_stream` is an
/// optional capability: the default returns `None` and the router falls back
/// to synthesizing a stream from a blocking `complete`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Blocking (awaited) chat completion.
    async fn complete(&self, request: &CompletionRequest) -> StewardResult<LlmResponse>;

    /// Native streaming completion, when the backend supports it.
    async fn complete_stream(
        &self,
        _request: &CompletionRequest,
    ) -> Option<StewardResult<mpsc::Receiver<StreamChunk>>> {
        None
    }
}

/// Classifies an HTTP failure status into the provider error taxonomy.
///
/// 401/403 → auth (retryable across slots); 429 or quota markers →
/// rate limit; 5xx → server error; any other 4xx → non-retryable API error.
pub(crate) fn classify_status(status: u16, body: &str) -> StewardError {
    let fallback = |label: &str| {
        if body.is_empty() {
            label.to_string()
        } else {
            body.to_string()
        }
    };
    match status {
        401 | 403 => StewardError::Auth(fallback("auth error")),
        429 => StewardError::RateLimit(fallback("rate limit")),
        s if s >= 500 => StewardError::Server(fallback("server error")),
        _ if has_quota_markers(body) => StewardError::RateLimit(fallback("rate limit")),
        _ => StewardError::Api(fallback("api error")),
    }
}

/// Whether a response body carries quota-exhaustion markers. Some backends
/// report quota exhaustion inside an otherwise successful body.
pub(crate) fn has_quota_markers(body: &str) -> bool {
    let lowered = body.to_lowercase();
    lowered.contains("quota") || lowered.contains("resource_exhausted")
}

/// The shared select → call → classify → report → backoff loop.
///
/// Selects a slot, runs `call` against it, and reports the outcome to the
/// rotation manager. Retryable failures rotate to a fresh slot after a
/// backoff; once attempts exceed `policy.max_retries` the loop fails with
/// [`StewardError::SlotsExhausted`]. Non-retryable failures abort
/// immediately.
pub(crate) async fn complete_with_rotation<F, Fut>(
    rotation: &RotationManager,
    call: F,
) -> StewardResult<LlmResponse>
where
    F: Fn(RotationSlot) -> Fut,
    Fut: std::future::Future<Output = StewardResult<LlmResponse>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let slot = rotation.select_slot()?;
        let slot_id = slot.id.clone();

        match call(slot).await {
            Ok(response) => {
                rotation.report_success(&slot_id);
                return Ok(response);
            }
            Err(err) => {
                match &err {
                    StewardError::RateLimit(msg) => {
                        rotation.report_rate_limit(&slot_id, Some(msg));
                    }
                    StewardError::Auth(_) => rotation.report_auth_error(&slot_id),
                    // Server/network errors leave the slot untouched.
                    _ => {}
                }

                if !err.is_retryable() {
                    return Err(err);
                }
                if attempt > rotation.policy().max_retries {
                    return Err(StewardError::SlotsExhausted {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                warn!(attempt, slot = %slot_id, error = %err, "retryable provider error, rotating");
                rotation.backoff(attempt).await;
            }
        }
    }
}
