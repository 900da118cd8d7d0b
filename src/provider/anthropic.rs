//! Anthropic provider adapter (messages API).
//!
//! The messages API requires an explicit `max_tokens` and authenticates
//! via `x-api-key` plus an `anthropic-version` header. Structured output
//! requests add the structured-outputs beta flag.

use crate::models::LlmError;
use crate::provider::{
    BackoffPolicy, GenerationRequest, GenerationResult, LlmProvider, PricingTable, acquire_gate,
    retry_on, round_latency, transport_error, validate_content,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const STRUCTURED_OUTPUTS_BETA: &str = "structured-outputs-2025-11-13";
const MAX_TOKENS: u32 = 2048;

/// Messages API request payload.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

/// Messages API response.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: MessagesUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// API error response envelope.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Anthropic provider with gated concurrency, timeout, rate-limit retry,
/// and cost tracking.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    backoff: BackoffPolicy,
    pricing: PricingTable,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            timeout,
            backoff: BackoffPolicy::default(),
            pricing: PricingTable::anthropic(),
        }
    }

    /// Override the API base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replace the pricing table.
    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Replace the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    async fn call_api(
        &self,
        request: &GenerationRequest,
    ) -> Result<(crate::provider::GeneratedContent, u32, f64), LlmError> {
        let url = format!("{}/messages", self.base_url);
        let payload = MessagesRequest {
            model: &request.model,
            max_tokens: MAX_TOKENS,
            messages: vec![MessageParam {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
        };

        let mut http_request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload);

        if request.response_schema.is_some() {
            http_request = http_request.header("anthropic-beta", STRUCTURED_OUTPUTS_BETA);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| transport_error(&request.model, &e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|api| api.error.message)
                .unwrap_or(body);
            return Err(LlmError::classify(
                &request.model,
                Some(status.as_u16()),
                message,
            ));
        }

        let body: MessagesResponse = response.json().await.map_err(|e| LlmError::Provider {
            model: request.model.clone(),
            message: format!("invalid response body: {e}"),
        })?;

        let text = body
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| LlmError::Provider {
                model: request.model.clone(),
                message: "empty content in response".to_string(),
            })?;

        let usage = body.usage;
        let tokens_used = usage.input_tokens + usage.output_tokens;
        let cost = self
            .pricing
            .cost(&request.model, usage.input_tokens, usage.output_tokens);

        let content = validate_content(request, text)?;
        Ok((content, tokens_used, cost))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn semaphore(&self) -> &Arc<Semaphore> {
        &self.semaphore
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, LlmError> {
        let _permit = acquire_gate(&self.semaphore, &request.model).await?;
        let started = Instant::now();

        let (content, tokens_used, cost) =
            retry_on(self.backoff, LlmError::is_rate_limited, || async {
                match tokio::time::timeout(self.timeout, self.call_api(&request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LlmError::TimedOut {
                        model: request.model.clone(),
                        timeout: self.timeout,
                    }),
                }
            })
            .await?;

        let latency_secs = round_latency(started.elapsed());
        debug!(
            provider = self.name(),
            model = %request.model,
            tokens = tokens_used,
            cost,
            latency_secs,
            "Generation complete"
        );

        Ok(GenerationResult {
            content,
            tokens_used,
            cost,
            latency_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Serialize, Deserialize)]
    struct Widget {
        name: String,
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            jitter: false,
        }
    }

    fn provider_for(server: &MockServer) -> AnthropicProvider {
        AnthropicProvider::new("sk-ant-test", 2, Duration::from_secs(5))
            .with_base_url(server.uri())
            .with_backoff(fast_backoff())
    }

    fn success_body(text: &str, input_tokens: u32, output_tokens: u32) -> serde_json::Value {
        serde_json::json!({
            "content": [{"type": "text", "text": text}],
            "usage": {"input_tokens": input_tokens, "output_tokens": output_tokens},
        })
    }

    #[tokio::test]
    async fn success_returns_content_tokens_and_exact_cost() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("hello", 1000, 2000)))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider
            .generate(GenerationRequest::text("hi", "claude-sonnet-4-5", 0.7))
            .await
            .unwrap();

        assert_eq!(result.content.as_text(), Some("hello"));
        assert_eq!(result.tokens_used, 3000);
        assert_eq!(result.cost, 0.033);
    }

    #[tokio::test]
    async fn structured_request_sends_beta_header_and_validates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("anthropic-beta", STRUCTURED_OUTPUTS_BETA))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(success_body(r#"{"name": "scalpel"}"#, 10, 10)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider
            .generate(GenerationRequest::structured::<Widget>(
                "hi",
                "claude-sonnet-4-5",
                0.7,
            ))
            .await
            .unwrap();

        let widget: Widget = result.decode().unwrap();
        assert_eq!(widget.name, "scalpel");
    }

    #[tokio::test]
    async fn rate_limit_marker_in_message_text_is_retried() {
        // 500 status, but the message text names a rate limit; the
        // classification order maps it to RateLimited and retries apply.
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_json(
                serde_json::json!({"error": {"type": "api_error", "message": "rate_limit_error: account throttled"}}),
            ))
            .expect(3)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .generate(GenerationRequest::text("hi", "claude-sonnet-4-5", 0.7))
            .await
            .unwrap_err();

        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn auth_failure_is_a_provider_error_with_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                serde_json::json!({"error": {"type": "authentication_error", "message": "invalid x-api-key"}}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .generate(GenerationRequest::text("hi", "claude-sonnet-4-5", 0.7))
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Provider { .. }));
    }

    #[tokio::test]
    async fn malformed_structured_output_raises_parsing_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(success_body("I cannot answer", 5, 5)),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .generate(GenerationRequest::structured::<Widget>(
                "hi",
                "claude-sonnet-4-5",
                0.7,
            ))
            .await
            .unwrap_err();

        match err {
            LlmError::ParsingFailed {
                schema,
                excerpt,
                model,
                ..
            } => {
                assert_eq!(schema, "Widget");
                assert_eq!(model, "claude-sonnet-4-5");
                assert!(excerpt.contains("I cannot answer"));
            }
            other => panic!("expected ParsingFailed, got {other:?}"),
        }
    }
}
