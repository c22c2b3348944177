//! End-to-end chat endpoint scenarios with deterministic fake providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use policy_assist::config::ServiceConfig;
use policy_assist::error::{IndexError, ProviderError};
use policy_assist::index::{FlatIndex, PolicyRecord, ScoredId, SearchFilters, VectorIndex};
use policy_assist::llm::{EmbeddingProvider, GenerationProvider, GenerationRequest};
use policy_assist::server::chat_routes;
use policy_assist::workflow::Orchestrator;
use tower::ServiceExt;

// ── Fakes ───────────────────────────────────────────────────────────────

/// How the fake generation provider behaves for non-routing calls.
#[derive(Clone)]
enum GenBehavior {
    Answer(String),
    Fail,
    Hang,
}

/// Fake generation provider. The routing call is recognized by its
/// classification system prompt and answered with `route`; rewrite and
/// synthesis calls follow `behavior`.
struct FakeLlm {
    route: String,
    behavior: GenBehavior,
}

#[async_trait]
impl GenerationProvider for FakeLlm {
    fn model_name(&self) -> &str {
        "fake-llm"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        if request.system.as_deref().unwrap_or("").contains("classify") {
            return Ok(self.route.clone());
        }
        match &self.behavior {
            GenBehavior::Answer(text) => Ok(text.clone()),
            GenBehavior::Fail => Err(ProviderError::RequestFailed {
                provider: "fake-llm".into(),
                reason: "injected failure".into(),
            }),
            GenBehavior::Hang => {
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

struct FakeEmbedder;

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embed"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(vec![1.0, 0.0])
    }
}

/// Index whose search always fails, as when the backing store is down.
struct DownIndex;

#[async_trait]
impl VectorIndex for DownIndex {
    fn dimension(&self) -> usize {
        2
    }

    fn len(&self) -> usize {
        0
    }

    async fn search(
        &self,
        _vector: &[f32],
        _k: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<ScoredId>, IndexError> {
        Err(IndexError::Unavailable("connection refused".into()))
    }

    async fn upsert(&self, _record: PolicyRecord) -> Result<(), IndexError> {
        Err(IndexError::Unavailable("connection refused".into()))
    }

    async fn fetch(&self, _ids: &[String]) -> Result<Vec<PolicyRecord>, IndexError> {
        Err(IndexError::Unavailable("connection refused".into()))
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

fn record(id: &str, embedding: [f32; 2]) -> PolicyRecord {
    PolicyRecord {
        id: id.into(),
        title: format!("청년 정책 {id}"),
        description: "청년 대상 지원 정책".into(),
        category: "savings".into(),
        region: String::new(),
        embedding: embedding.to_vec(),
        metadata: serde_json::Value::Null,
    }
}

async fn seeded_index(n: usize) -> Arc<dyn VectorIndex> {
    let index = FlatIndex::new(2);
    for i in 0..n {
        let angle = i as f32 * 0.1;
        index
            .upsert(record(&format!("r{i}"), [angle.cos(), angle.sin()]))
            .await
            .unwrap();
    }
    Arc::new(index)
}

fn app(route: &str, behavior: GenBehavior, index: Arc<dyn VectorIndex>) -> Router {
    let config = ServiceConfig {
        request_deadline: Duration::from_secs(5),
        call_timeout: Duration::from_secs(1),
        retry_backoff: Duration::from_millis(1),
        ..Default::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(FakeLlm {
            route: route.into(),
            behavior,
        }),
        Arc::new(FakeEmbedder),
        index,
    ));
    chat_routes(orchestrator)
}

async fn post_chat(app: Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_response_skips_retrieval() {
    let app = app(
        "direct",
        GenBehavior::Answer("안녕하세요! 무엇을 도와드릴까요?".into()),
        seeded_index(3).await,
    );
    let (status, json) = post_chat(app, serde_json::json!({"message": "안녕하세요"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"], "assistant");
    assert_eq!(json["metadata"]["workflow_status"], "success");
    assert_eq!(
        json["metadata"]["stages_run"],
        serde_json::json!(["router", "synthesis"])
    );
}

#[tokio::test]
async fn retrieval_path_runs_all_stages() {
    let app = app(
        "retrieval",
        GenBehavior::Answer("25세라면 청년 우대 적금을 추천드립니다.".into()),
        seeded_index(8).await,
    );
    let (status, json) = post_chat(
        app,
        serde_json::json!({
            "message": "25살인데 적금 추천해줘",
            "context": {"age": 25}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["metadata"]["workflow_status"], "success");
    assert_eq!(
        json["metadata"]["stages_run"],
        serde_json::json!(["router", "retrieval", "synthesis"])
    );
    assert!(!json["content"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn zero_matches_still_produces_an_answer() {
    let app = app(
        "retrieval",
        GenBehavior::Answer("정확히 일치하는 정책은 없지만, 일반적으로는...".into()),
        seeded_index(0).await,
    );
    let (status, json) =
        post_chat(app, serde_json::json!({"message": "아주 특이한 질문"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["metadata"]["workflow_status"], "success");
    assert!(!json["content"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn generation_failure_degrades_with_fallback() {
    let app = app("retrieval", GenBehavior::Fail, seeded_index(3).await);
    let (status, json) = post_chat(app, serde_json::json!({"message": "적금 추천"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["metadata"]["workflow_status"], "degraded");
    assert_eq!(json["metadata"]["error"], "provider_unavailable");
    assert!(!json["content"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn index_failure_degrades_but_still_answers() {
    let app = app(
        "retrieval",
        GenBehavior::Answer("정확한 정책 목록은 지금 확인할 수 없지만...".into()),
        Arc::new(DownIndex),
    );
    let (status, json) = post_chat(app, serde_json::json!({"message": "적금 추천"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["metadata"]["workflow_status"], "degraded");
    assert_eq!(json["metadata"]["error"], "index_unavailable");
    assert_eq!(
        json["metadata"]["stages_run"],
        serde_json::json!(["router", "retrieval", "synthesis"])
    );
    assert!(!json["content"].as_str().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hung_provider_resolves_within_deadline_as_degraded() {
    let app = app("retrieval", GenBehavior::Hang, seeded_index(3).await);
    let (status, json) = post_chat(app, serde_json::json!({"message": "적금 추천"})).await;

    // Every call site is bounded by the subdivided deadline, so a
    // provider that never returns still yields a fallback response.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["metadata"]["workflow_status"], "degraded");
    assert!(!json["content"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn empty_message_terminates_with_fallback() {
    let app = app(
        "direct",
        GenBehavior::Answer("unused".into()),
        seeded_index(0).await,
    );
    let (status, json) = post_chat(app, serde_json::json!({"message": "  "})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["metadata"]["workflow_status"], "degraded");
    assert_eq!(json["metadata"]["stages_run"], serde_json::json!(["router"]));
    assert!(!json["content"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let app = app(
        "direct",
        GenBehavior::Answer("unused".into()),
        seeded_index(0).await,
    );
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = app(
        "direct",
        GenBehavior::Answer("unused".into()),
        seeded_index(0).await,
    );
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
