//! Provider-agnostic generation contract.
//!
//! Any vendor adapter (and any test double) implements [`LlmProvider`]:
//! one `generate` operation plus an accessor for the concurrency gate.
//! Admission control, timeout, rate-limit retry, typed-output validation,
//! and cost accounting all happen behind this boundary; callers only see a
//! [`GenerationResult`] or one of the four [`LlmError`] kinds.

use crate::models::{CallUsage, LlmError, QuaestioError};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

/// A single generation call.
///
/// Temperature is validated upstream at config load; adapters do no range
/// check of their own.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,

    /// When present, the raw response must parse and validate into this
    /// schema; otherwise raw text is returned as-is.
    pub response_schema: Option<ResponseSchema>,
}

impl GenerationRequest {
    /// Plain text generation.
    pub fn text(prompt: impl Into<String>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature,
            response_schema: None,
        }
    }

    /// Generation validated into the JSON shape of `T`.
    pub fn structured<T>(
        prompt: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
    ) -> Self
    where
        T: DeserializeOwned + Serialize,
    {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature,
            response_schema: Some(ResponseSchema::of::<T>()),
        }
    }

    /// Name of the requested schema, if any.
    pub fn schema_name(&self) -> Option<&'static str> {
        self.response_schema.as_ref().map(ResponseSchema::name)
    }
}

/// Type descriptor for a structured response.
///
/// Carries the schema's short name for diagnostics and a validation
/// function that parses raw text through the concrete type. Copyable so
/// requests stay cheap to clone across retry attempts.
#[derive(Clone, Copy)]
pub struct ResponseSchema {
    name: &'static str,
    validate: fn(&str) -> Result<serde_json::Value, String>,
}

impl ResponseSchema {
    /// Descriptor for any serde-typed contract.
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize,
    {
        Self {
            name: short_type_name::<T>(),
            validate: validate_as::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parse and validate raw text; returns the coerced JSON value.
    pub fn validate(&self, raw: &str) -> Result<serde_json::Value, String> {
        (self.validate)(raw)
    }
}

impl std::fmt::Debug for ResponseSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSchema")
            .field("name", &self.name)
            .finish()
    }
}

fn validate_as<T>(raw: &str) -> Result<serde_json::Value, String>
where
    T: DeserializeOwned + Serialize,
{
    let value: T = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    serde_json::to_value(&value).map_err(|e| e.to_string())
}

fn short_type_name<T>() -> &'static str {
    std::any::type_name::<T>()
        .rsplit("::")
        .next()
        .unwrap_or("unknown")
}

/// Content of a completed generation.
#[derive(Debug, Clone)]
pub enum GeneratedContent {
    /// Raw text, returned when no schema was requested
    Text(String),
    /// JSON validated against the requested schema
    Structured(serde_json::Value),
}

impl GeneratedContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }
}

/// Result of one `generate` call. Constructed once, never mutated.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub content: GeneratedContent,

    /// Input + output tokens as reported by the vendor
    pub tokens_used: u32,

    /// USD cost, 6-decimal rounding
    pub cost: f64,

    /// Wall-clock seconds, 3-decimal rounding
    pub latency_secs: f64,
}

impl GenerationResult {
    /// Decode structured content into its concrete type.
    ///
    /// The value was already validated through the schema inside the
    /// adapter, so a mismatch here is an internal bug, not a provider
    /// failure.
    pub fn decode<T: DeserializeOwned>(&self) -> crate::models::Result<T> {
        match &self.content {
            GeneratedContent::Structured(value) => {
                serde_json::from_value(value.clone()).map_err(|e| {
                    QuaestioError::Internal(format!(
                        "validated content no longer matches its schema: {e}"
                    ))
                })
            }
            GeneratedContent::Text(_) => Err(QuaestioError::Internal(
                "expected structured content, got raw text".to_string(),
            )),
        }
    }

    /// Token/cost/latency accounting for this call.
    pub fn usage(&self) -> CallUsage {
        CallUsage {
            tokens_used: self.tokens_used,
            cost: self.cost,
            latency_secs: self.latency_secs,
        }
    }
}

/// Contract every provider adapter implements.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short vendor name for logging ("openai", "anthropic").
    fn name(&self) -> &'static str;

    /// Concurrency gate shared by every call through this provider
    /// instance. In-flight network calls never exceed its permit count.
    fn semaphore(&self) -> &Arc<Semaphore>;

    /// Turn a request into a result while enforcing the concurrency
    /// ceiling, the wall-clock timeout, the rate-limit retry budget, and
    /// deterministic cost accounting.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult, LlmError>;
}

/// Acquire one unit from the gate before any network attempt.
///
/// The returned RAII permit releases on every exit path, success or error.
pub(crate) async fn acquire_gate<'a>(
    semaphore: &'a Semaphore,
    model: &str,
) -> Result<SemaphorePermit<'a>, LlmError> {
    semaphore.acquire().await.map_err(|_| LlmError::Provider {
        model: model.to_string(),
        message: "concurrency gate closed".to_string(),
    })
}

/// Validate raw response text against the request's schema, if any.
pub(crate) fn validate_content(
    request: &GenerationRequest,
    text: String,
) -> Result<GeneratedContent, LlmError> {
    match &request.response_schema {
        Some(schema) => match schema.validate(&text) {
            Ok(value) => Ok(GeneratedContent::Structured(value)),
            Err(detail) => Err(LlmError::ParsingFailed {
                model: request.model.clone(),
                schema: schema.name(),
                detail,
                excerpt: LlmError::excerpt(&text),
            }),
        },
        None => Ok(GeneratedContent::Text(text)),
    }
}

/// Map a reqwest transport failure onto the taxonomy.
pub(crate) fn transport_error(model: &str, err: &reqwest::Error, timeout: Duration) -> LlmError {
    if err.is_timeout() {
        LlmError::TimedOut {
            model: model.to_string(),
            timeout,
        }
    } else {
        LlmError::classify(model, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Round elapsed time to the 3-decimal latency contract.
pub(crate) fn round_latency(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1e3).round() / 1e3
}
