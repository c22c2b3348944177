//! Service configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Default top-k for vector search.
pub const DEFAULT_TOP_K: usize = 5;

/// Hard cap on caller-requested k — bounds prompt size downstream.
pub const MAX_TOP_K: usize = 20;

/// Service configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Total budget for one chat request, covering every stage.
    pub request_deadline: Duration,
    /// Ceiling for any single external call (provider or index).
    pub call_timeout: Duration,
    /// Backoff before the single retry of a failed external call.
    pub retry_backoff: Duration,
    /// Number of matches to retrieve per request.
    pub top_k: usize,
    /// Embedding dimension the index is built with. Must match the
    /// embedding provider's output exactly; validated at startup.
    pub embedding_dimension: usize,
    /// Port for the HTTP server.
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(12),
            call_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(250),
            top_k: DEFAULT_TOP_K,
            embedding_dimension: 1536,
            port: 8080,
        }
    }
}

impl ServiceConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(secs) = std::env::var("POLICY_ASSIST_DEADLINE_SECS") {
            config.request_deadline =
                Duration::from_secs(parse_value("POLICY_ASSIST_DEADLINE_SECS", &secs)?);
        }

        if let Ok(k) = std::env::var("POLICY_ASSIST_TOP_K") {
            config.top_k = parse_value("POLICY_ASSIST_TOP_K", &k)?;
        }

        if let Ok(dim) = std::env::var("POLICY_ASSIST_EMBED_DIM") {
            config.embedding_dimension = parse_value("POLICY_ASSIST_EMBED_DIM", &dim)?;
        }

        if let Ok(port) = std::env::var("POLICY_ASSIST_PORT") {
            config.port = parse_value("POLICY_ASSIST_PORT", &port)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency. Fatal at startup if violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(ConfigError::InvalidValue {
                key: "top_k".into(),
                message: format!("must be in 1..={MAX_TOP_K}, got {}", self.top_k),
            });
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding_dimension".into(),
                message: "must be non-zero".into(),
            });
        }
        if self.call_timeout > self.request_deadline {
            return Err(ConfigError::InvalidValue {
                key: "call_timeout".into(),
                message: "single-call timeout exceeds the request deadline".into(),
            });
        }
        Ok(())
    }
}

/// Parse one env var value; a bad value is a fatal startup error, never
/// a silent fallback to the default.
fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("not an integer: {raw}"),
    })
}
