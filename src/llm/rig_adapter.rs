//! Adapter bridging rig-core models to our provider traits.
//!
//! rig's `CompletionModel` / `EmbeddingModel` traits are generic and not
//! object-safe, so the workflow depends on our own `dyn`-friendly traits
//! and this adapter carries the concrete rig model behind them.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};
use rig::embeddings::EmbeddingModel;

use crate::error::ProviderError;
use crate::llm::provider::{EmbeddingProvider, GenerationProvider, GenerationRequest};

/// Wraps a rig completion model as a `GenerationProvider`.
pub struct RigGeneration<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigGeneration<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> GenerationProvider for RigGeneration<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let mut builder = self
            .model
            .completion_request(request.prompt.as_str())
            .temperature(f64::from(request.temperature))
            .max_tokens(u64::from(request.max_tokens));

        if let Some(system) = request.system {
            builder = builder.preamble(system);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;

        match response.choice.first() {
            AssistantContent::Text(text) => Ok(text.text),
            other => Err(ProviderError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: format!("expected text content, got {other:?}"),
            }),
        }
    }
}

/// Wraps a rig embedding model as an `EmbeddingProvider`.
pub struct RigEmbedding<E: EmbeddingModel> {
    model: E,
    model_name: String,
    dimension: usize,
}

impl<E: EmbeddingModel> RigEmbedding<E> {
    pub fn new(model: E, model_name: &str, dimension: usize) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            dimension,
        }
    }
}

#[async_trait]
impl<E: EmbeddingModel> EmbeddingProvider for RigEmbedding<E> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let embedding =
            self.model
                .embed_text(text)
                .await
                .map_err(|e| ProviderError::RequestFailed {
                    provider: self.model_name.clone(),
                    reason: e.to_string(),
                })?;

        let vec: Vec<f32> = embedding.vec.iter().map(|&v| v as f32).collect();
        if vec.len() != self.dimension {
            return Err(ProviderError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: format!(
                    "embedding dimension {} does not match configured {}",
                    vec.len(),
                    self.dimension
                ),
            });
        }
        Ok(vec)
    }
}
