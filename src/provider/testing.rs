//! Scripted provider double for agent and pipeline tests.

use crate::models::LlmError;
use crate::provider::{
    GeneratedContent, GenerationRequest, GenerationResult, LlmProvider, acquire_gate,
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// What an agent sent to the provider, for assertions.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    pub schema: Option<&'static str>,
}

/// Provider double that replays a queue of scripted results and records
/// every request it receives.
pub(crate) struct ScriptedProvider {
    semaphore: Arc<Semaphore>,
    script: Mutex<VecDeque<Result<GenerationResult, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(8)),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Enqueue a structured success carrying `value` as validated content.
    pub fn push_structured<T: Serialize>(&self, value: &T) {
        let result = GenerationResult {
            content: GeneratedContent::Structured(serde_json::to_value(value).unwrap()),
            tokens_used: 1500,
            cost: 0.015,
            latency_secs: 2.3,
        };
        self.script.lock().unwrap().push_back(Ok(result));
    }

    /// Enqueue a raw-text success.
    #[allow(dead_code)]
    pub fn push_text(&self, text: &str) {
        let result = GenerationResult {
            content: GeneratedContent::Text(text.to_string()),
            tokens_used: 100,
            cost: 0.001,
            latency_secs: 0.5,
        };
        self.script.lock().unwrap().push_back(Ok(result));
    }

    /// Enqueue a failure.
    pub fn push_error(&self, error: LlmError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn semaphore(&self) -> &Arc<Semaphore> {
        &self.semaphore
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, LlmError> {
        let _permit = acquire_gate(&self.semaphore, &request.model).await?;

        self.requests.lock().unwrap().push(RecordedRequest {
            prompt: request.prompt.clone(),
            model: request.model.clone(),
            temperature: request.temperature,
            schema: request.schema_name(),
        });

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Provider {
                    model: request.model,
                    message: "scripted provider: script exhausted".to_string(),
                })
            })
    }
}
