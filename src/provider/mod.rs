//! LLM provider adapters.
//!
//! Everything network-facing lives here: the provider contract, the two
//! vendor adapters, the retry combinator, and the pricing tables.

mod anthropic;
mod interface;
mod openai;
mod pricing;
mod retry;

pub use anthropic::*;
pub use interface::*;
pub use openai::*;
pub use pricing::*;
pub use retry::*;

#[cfg(test)]
pub(crate) mod testing;

use crate::models::{Config, ConfigError, ProviderKind};
use std::sync::Arc;
use std::time::Duration;

/// Build the configured provider.
pub fn from_config(config: &Config) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let api_key = config.resolve_api_key()?;
    let concurrency = config.provider.concurrency;
    let timeout = Duration::from_secs_f64(config.provider.timeout_secs);

    let provider: Arc<dyn LlmProvider> = match config.provider.kind {
        ProviderKind::OpenAi => {
            let mut provider = OpenAiProvider::new(api_key, concurrency, timeout);
            if let Some(base_url) = &config.provider.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        ProviderKind::Anthropic => {
            let mut provider = AnthropicProvider::new(api_key, concurrency, timeout);
            if let Some(base_url) = &config.provider.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
    };

    Ok(provider)
}
