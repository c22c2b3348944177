//! Provider traits for generation and embedding.
//!
//! Both traits are deliberately narrow so tests can substitute
//! deterministic fakes — no workflow code ever touches a vendor SDK
//! directly.

use async_trait::async_trait;

use crate::error::ProviderError;

/// A request to the generation provider.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System-level instruction for the call.
    pub system: Option<String>,
    /// The user-visible prompt.
    pub prompt: String,
    /// Output token ceiling.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.3,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Converts a prompt into free-text output. The model's behavior is
/// opaque and non-deterministic; callers must treat every response as
/// potentially malformed.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier for logging.
    fn model_name(&self) -> &str;

    /// Run one completion.
    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError>;
}

/// Converts text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier for logging.
    fn model_name(&self) -> &str;

    /// Output dimension of this provider. Must match the index exactly;
    /// checked once at startup.
    fn dimension(&self) -> usize;

    /// Embed one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_request_builder() {
        let request = GenerationRequest::new("hello")
            .with_system("be terse")
            .with_max_tokens(64)
            .with_temperature(0.0);
        assert_eq!(request.prompt, "hello");
        assert_eq!(request.system.as_deref(), Some("be terse"));
        assert_eq!(request.max_tokens, 64);
        assert_eq!(request.temperature, 0.0);
    }
}
