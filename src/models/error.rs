//! Error types for quaestio.
//!
//! Two layers:
//! - `LlmError`: the failure surface of the provider adapters, exactly four
//!   kinds so callers dispatch on the variant rather than on message text.
//! - `QuaestioError`: the top-level pipeline error.

use std::time::Duration;
use thiserror::Error;

/// Maximum length of a raw-response excerpt carried in parse failures.
const EXCERPT_LEN: usize = 200;

/// Failure raised by an LLM provider adapter.
///
/// Every variant carries the model id; `ParsingFailed` additionally carries
/// the expected schema name and a truncated excerpt of the offending text,
/// enough to reconstruct the cause at the call site.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Vendor signalled "too many requests". Retried internally with
    /// backoff; surfaces only once the retry budget is exhausted.
    #[error("rate limited by provider: {message} (model: {model})")]
    RateLimited { model: String, message: String },

    /// The whole network call, response parsing included, exceeded the
    /// configured wall-clock limit. Never retried at this layer.
    #[error("request timeout: {model} exceeded {}s limit", .timeout.as_secs_f64())]
    TimedOut { model: String, timeout: Duration },

    /// Response body failed JSON parse or schema validation.
    #[error("failed to parse {model} response as {schema}: {detail} (excerpt: {excerpt:?})")]
    ParsingFailed {
        model: String,
        schema: &'static str,
        detail: String,
        excerpt: String,
    },

    /// Any other vendor or network failure (auth, malformed request, ...).
    #[error("provider error: {message} (model: {model})")]
    Provider { model: String, message: String },
}

impl LlmError {
    /// Model id the failing call targeted.
    pub fn model(&self) -> &str {
        match self {
            Self::RateLimited { model, .. }
            | Self::TimedOut { model, .. }
            | Self::ParsingFailed { model, .. }
            | Self::Provider { model, .. } => model,
        }
    }

    /// The only retry predicate the adapters use.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Map a failed HTTP exchange onto the taxonomy.
    ///
    /// The rate-limit check runs first: vendors surface 429s both as typed
    /// statuses and as plain message text, and both must land on the same
    /// variant. The substring scan is a best-effort heuristic, not a
    /// contract.
    pub(crate) fn classify(model: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_ascii_lowercase();
        if status == Some(429)
            || lowered.contains("rate limit")
            || lowered.contains("rate_limit")
            || lowered.contains("429")
        {
            Self::RateLimited {
                model: model.to_string(),
                message,
            }
        } else {
            Self::Provider {
                model: model.to_string(),
                message,
            }
        }
    }

    /// Truncate raw response text for error context.
    pub(crate) fn excerpt(text: &str) -> String {
        text.chars().take(EXCERPT_LEN).collect()
    }
}

/// Top-level error type for quaestio.
#[derive(Debug, Error)]
pub enum QuaestioError {
    #[error("configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A successful provider call whose content failed domain validation
    /// (wrong key position, short batch, ...). Distinct from
    /// `LlmError::ParsingFailed`, which is a transport-level schema failure.
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl QuaestioError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for quaestio.
pub type Result<T> = std::result::Result<T, QuaestioError>;
