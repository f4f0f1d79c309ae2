//! Router-level integration tests that exercise the full axum router via
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::BodyExt;
use rlm_core::api::{self, AppState};
use rlm_core::audit::ShadowAuditor;
use rlm_core::bicameral::BicameralStreamer;
use rlm_core::cache::VerificationCache;
use rlm_core::config::AppConfig;
use rlm_core::embedding::{EmbeddingGateway, EmbeddingProvider};
use rlm_core::generation::{GenerationOptions, GenerationProvider};
use rlm_core::pipeline::VerificationPipeline;
use rlm_core::recycler::CognitiveRecycler;
use rlm_core::webhook::WebhookClient;
use tower::ServiceExt;

struct FakeEmbedder;

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        Some(vec![text.len() as f32, 1.0])
    }
    fn model_name(&self) -> &str {
        "fake-embedder"
    }
}

struct FakeGenerator;

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn generate(&self, _model: &str, _prompt: &str, _opts: GenerationOptions) -> anyhow::Result<String> {
        Ok(r#"{"consistent": true, "confidence": 0.8, "reasoning": "ok"}"#.to_string())
    }
}

fn test_state() -> Arc<AppState> {
    std::env::remove_var("RENDER");
    std::env::remove_var("SUPABASE_JWT_SECRET");
    std::env::remove_var("OPENROUTER_API_KEY");
    std::env::remove_var("OPENAI_API_KEY");

    let config = Arc::new(AppConfig::from_env().expect("config loads in dev mode"));
    let embeddings = Arc::new(EmbeddingGateway::new(Arc::new(FakeEmbedder)));
    let generator: Arc<dyn GenerationProvider> = Arc::new(FakeGenerator);
    let webhook = Arc::new(WebhookClient::new());
    let auditor = Arc::new(ShadowAuditor::new(
        generator.clone(),
        "fake-model".to_string(),
        webhook,
        None,
    ));
    let cache = Arc::new(VerificationCache::new());
    let pipeline = Arc::new(VerificationPipeline::new(
        cache.clone(),
        embeddings.clone(),
        generator.clone(),
        "fake-model".to_string(),
        None,
        None,
        auditor,
    ));
    let bicameral = Arc::new(BicameralStreamer::new(
        embeddings.clone(),
        generator.clone(),
        "fake-model".to_string(),
        None,
    ));
    let recycler = Arc::new(CognitiveRecycler::new(embeddings.clone(), None));

    Arc::new(AppState {
        config,
        embeddings,
        cache,
        pipeline,
        bicameral,
        recycler,
        antibody_store: None,
        surgical: None,
    })
}

#[tokio::test]
async fn health_requires_no_auth() {
    let app = api::build_router(test_state());
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .uri("/health")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn verify_without_bearer_is_allowed_in_dev_mode() {
    let app = api::build_router(test_state());
    let body = serde_json::json!({ "claim": "the sky is blue" });
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/verify")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["consistent"], true);
    assert_eq!(parsed["cost_usd"], 0.0);
}

#[tokio::test]
async fn recycle_never_requires_auth() {
    let app = api::build_router(test_state());
    let body = serde_json::json!({
        "user_prompt": "is the earth flat",
        "rejected_output": "yes",
        "correction": "no, it is an oblate spheroid",
    });
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/recycle")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn route_endpoint_matches_s3_scenario() {
    let app = api::build_router(test_state());
    let body = serde_json::json!({
        "task_type": "embedding",
        "input_tokens": 1_000_000,
        "complexity": "LOW",
        "require_high_quality": false,
    });
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/route")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    // No cloud key is configured in this test environment, so routing
    // falls to the local-default rather than S3's cloud-embedding row;
    // see unit coverage in src/router.rs for the cloud-enabled case.
    assert_eq!(parsed["use_local"], true);
}
