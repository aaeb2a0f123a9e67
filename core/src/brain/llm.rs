//! LLM Gateway: a single-shot text completion dependency.
//!
//! The concrete provider adapters are out of core scope; this module defines
//! the trait boundary plus the retry/backoff wrapper the rest of the
//! pipeline calls through, including a jittered exponential backoff wrapper.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use super::error::{CoreError, LlmErrorKind, Result};

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}

/// Retry policy applied uniformly around every [`LlmGateway::complete`] call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Calls `gateway.complete` with exponential backoff + jitter, retrying only
/// on transient conditions (rate-limit, timeout, connection). Validation/parse
/// failures are never retried here.
pub async fn complete_with_retry(
    gateway: &dyn LlmGateway,
    request: &CompletionRequest,
    policy: RetryPolicy,
) -> Result<CompletionResponse> {
    let mut attempt = 0u32;
    loop {
        match gateway.complete(request).await {
            Ok(resp) => return Ok(resp),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.base_delay * 2u32.pow(attempt);
                let jitter_ms: i64 = rand::thread_rng().gen_range(-50..=50);
                let delay_ms = (delay.as_millis() as i64 + jitter_ms).max(0) as u64;
                warn!(attempt, delay_ms, "llm call failed, retrying");
                sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Offline mock gateway (`LLM_PROVIDER=mock`). Produces a deterministic,
/// structurally plausible completion so the pipeline can be exercised
/// end-to-end without network access or a real model (implementing
/// any specific language model).
pub struct MockLlmGateway;

#[async_trait]
impl LlmGateway for MockLlmGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        if request.prompt.trim().is_empty() {
            return Err(CoreError::llm(LlmErrorKind::Validation, "empty prompt"));
        }
        let text = format!(
            "1. Based on the request, here is a considered response.\n\
             2. The key points have been weighed against the available context.\n\
             3. This conclusion follows from the evidence at hand.",
        );
        Ok(CompletionResponse { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyGateway {
        failures: AtomicU32,
    }

    #[async_trait]
    impl LlmGateway for FlakyGateway {
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(CoreError::llm(LlmErrorKind::Timeout, "simulated timeout"))
            } else {
                Ok(CompletionResponse { text: "ok".to_string() })
            }
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let gateway = FlakyGateway { failures: AtomicU32::new(2) };
        let req = CompletionRequest { prompt: "hi".into(), temperature: 0.5, max_tokens: 100 };
        let policy = RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(1) };
        let resp = complete_with_retry(&gateway, &req, policy).await.unwrap();
        assert_eq!(resp.text, "ok");
    }

    #[tokio::test]
    async fn mock_gateway_rejects_empty_prompt() {
        let gateway = MockLlmGateway;
        let req = CompletionRequest { prompt: "".into(), temperature: 0.5, max_tokens: 10 };
        let result = gateway.complete(&req).await;
        assert!(result.is_err());
    }
}
