//! Error types for policy-assist.

use std::time::Duration;

use serde::Serialize;

/// Configuration-related errors. All of these are fatal at startup —
/// none of them occur on the per-request path.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error(
        "Embedding dimension mismatch: provider produces {provider} dims, index expects {index}"
    )]
    DimensionMismatch { provider: usize, index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse record file: {0}")]
    RecordParse(#[from] serde_json::Error),
}

/// Errors from the generation and embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} call timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Request deadline exhausted before calling {provider}")]
    DeadlineExhausted { provider: String },
}

/// Vector index errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Vector dimension mismatch: got {got}, index expects {expected}")]
    Dimension { got: usize, expected: usize },

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Index unavailable: {0}")]
    Unavailable(String),
}

/// Per-request error classification, recorded on `WorkflowState` and
/// surfaced in response metadata. Every kind here is recovered locally
/// inside the stage that produced it — the request still completes with
/// a fallback answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Embedding or generation call failed after its retry budget.
    ProviderUnavailable,
    /// Vector search failed.
    IndexUnavailable,
    /// Per-request deadline exceeded.
    Timeout,
    /// Router classification output could not be parsed.
    MalformedRoutingOutput,
}

impl ErrorKind {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProviderUnavailable => "provider_unavailable",
            Self::IndexUnavailable => "index_unavailable",
            Self::Timeout => "timeout",
            Self::MalformedRoutingOutput => "malformed_routing_output",
        }
    }
}
