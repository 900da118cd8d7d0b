//! OpenAI provider adapter (chat completions API).

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
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

/// OpenAI provider with gated concurrency, timeout, rate-limit retry, and
/// cost tracking.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    backoff: BackoffPolicy,
    pricing: PricingTable,
}

impl OpenAiProvider {
    /// Create a provider.
    ///
    /// `concurrency` bounds in-flight API calls through this instance;
    /// `timeout` bounds each attempt wall-clock, response parsing included.
    pub fn new(api_key: impl Into<String>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            timeout,
            backoff: BackoffPolicy::default(),
            pricing: PricingTable::openai(),
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

    /// One API attempt: HTTP exchange, failure classification, content
    /// validation, and cost computation.
    async fn call_api(
        &self,
        request: &GenerationRequest,
    ) -> Result<(crate::provider::GeneratedContent, u32, f64), LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatCompletionRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            response_format: request
                .response_schema
                .as_ref()
                .map(|_| ResponseFormat {
                    format_type: "json_object",
                }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
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

        let body: ChatCompletionResponse = response.json().await.map_err(|e| LlmError::Provider {
            model: request.model.clone(),
            message: format!("invalid response body: {e}"),
        })?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Provider {
                model: request.model.clone(),
                message: "no choices in response".to_string(),
            })?;

        let usage = body.usage.unwrap_or_default();
        let tokens_used = usage.prompt_tokens + usage.completion_tokens;
        let cost = self
            .pricing
            .cost(&request.model, usage.prompt_tokens, usage.completion_tokens);

        let content = validate_content(request, text)?;
        Ok((content, tokens_used, cost))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
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
