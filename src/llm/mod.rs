//! LLM integration for policy-assist.
//!
//! Supports:
//! - **Anthropic**: generation via rig-core
//! - **OpenAI**: generation and embeddings via rig-core
//!
//! Uses the rig-core crate for HTTP transport; `RigGeneration` /
//! `RigEmbedding` bridge rig's model traits to our provider traits so
//! the workflow only ever sees `dyn GenerationProvider` /
//! `dyn EmbeddingProvider`.

pub mod provider;
pub(crate) mod retry;
mod rig_adapter;

pub use provider::{EmbeddingProvider, GenerationProvider, GenerationRequest};
pub use retry::{Deadline, call_with_retry};
pub use rig_adapter::{RigEmbedding, RigGeneration};

use std::sync::Arc;

use rig::client::{CompletionClient, EmbeddingsClient};
use secrecy::ExposeSecret;

use crate::error::ProviderError;

/// Supported generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a generation provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Configuration for creating an embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub dimension: usize,
}

/// Create a generation provider from configuration.
pub fn create_generation_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ProviderError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic generation (model: {})", config.model);
    Ok(Arc::new(RigGeneration::new(model, &config.model)))
}

fn create_openai_provider(
    config: &LlmConfig,
) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ProviderError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI generation (model: {})", config.model);
    Ok(Arc::new(RigGeneration::new(model, &config.model)))
}

/// Create an embedding provider from configuration. OpenAI is the only
/// embedding backend — Anthropic does not expose one.
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            ProviderError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.embedding_model_with_ndims(&config.model, config.dimension);
    tracing::info!(
        "Using OpenAI embeddings (model: {}, dims: {})",
        config.model,
        config.dimension
    );
    Ok(Arc::new(RigEmbedding::new(
        model,
        &config.model,
        config.dimension,
    )))
}
