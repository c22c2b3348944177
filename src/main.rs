use std::sync::Arc;

use policy_assist::config::ServiceConfig;
use policy_assist::error::ConfigError;
use policy_assist::index::{FlatIndex, IvfIndex, VectorIndex, load_records};
use policy_assist::llm::{
    EmbeddingConfig, LlmBackend, LlmConfig, create_embedding_provider, create_generation_provider,
};
use policy_assist::server::chat_routes;
use policy_assist::workflow::Orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env()?;

    // Generation backend: Anthropic if its key is set, otherwise OpenAI.
    let (backend, api_key, default_model) = if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        (LlmBackend::Anthropic, key, "claude-sonnet-4-20250514")
    } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        (LlmBackend::OpenAi, key, "gpt-4o-mini")
    } else {
        eprintln!("Error: neither ANTHROPIC_API_KEY nor OPENAI_API_KEY is set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    };
    let model = std::env::var("POLICY_ASSIST_MODEL").unwrap_or_else(|_| default_model.to_string());

    let generation = create_generation_provider(&LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model: model.clone(),
    })?;

    // Embeddings are OpenAI-only.
    let embed_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?;
    let embed_model = std::env::var("POLICY_ASSIST_EMBED_MODEL")
        .unwrap_or_else(|_| "text-embedding-3-small".to_string());
    let embedding = create_embedding_provider(&EmbeddingConfig {
        api_key: secrecy::SecretString::from(embed_key),
        model: embed_model.clone(),
        dimension: config.embedding_dimension,
    })?;

    // The index dimension must match the embedding provider exactly.
    // A mismatch is a deployment mistake — refuse to start.
    if embedding.dimension() != config.embedding_dimension {
        return Err(ConfigError::DimensionMismatch {
            provider: embedding.dimension(),
            index: config.embedding_dimension,
        }
        .into());
    }

    // ── Vector index ─────────────────────────────────────────────────────
    let use_ivf = std::env::var("POLICY_ASSIST_INDEX")
        .map(|v| v.eq_ignore_ascii_case("ivf"))
        .unwrap_or(false);
    let ivf = use_ivf.then(|| Arc::new(IvfIndex::new(config.embedding_dimension, 64, 8)));
    let index: Arc<dyn VectorIndex> = match &ivf {
        Some(ivf) => Arc::clone(ivf) as Arc<dyn VectorIndex>,
        None => Arc::new(FlatIndex::new(config.embedding_dimension)),
    };

    let mut record_count = 0usize;
    if let Ok(records_path) = std::env::var("POLICY_ASSIST_RECORDS") {
        let records = load_records(std::path::Path::new(&records_path))?;
        for record in records {
            if record.embedding.len() != config.embedding_dimension {
                return Err(ConfigError::DimensionMismatch {
                    provider: record.embedding.len(),
                    index: config.embedding_dimension,
                }
                .into());
            }
            index.upsert(record).await?;
            record_count += 1;
        }
        if let Some(ivf) = &ivf {
            ivf.rebuild()?;
        }
    }

    eprintln!("📋 Policy Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Generation: {}", model);
    eprintln!(
        "   Embeddings: {} ({} dims)",
        embed_model, config.embedding_dimension
    );
    eprintln!(
        "   Index: {} ({} records)",
        if use_ivf { "ivf" } else { "flat" },
        record_count
    );
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat\n", config.port);

    // ── Server ───────────────────────────────────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        generation,
        embedding,
        index,
    ));
    let app = chat_routes(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Chat server started");
    axum::serve(listener, app).await?;

    Ok(())
}
