//! Exercises the `/bicameral_stream` line protocol end to end against a
//! fake generator, checking the single-verdict property (spec property 5):
//! exactly one `B:` line appears in the whole stream.

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
        Some(vec![text.len() as f32])
    }
    fn model_name(&self) -> &str {
        "fake-embedder"
    }
}

struct FakeGenerator;

#[async_trait]
impl GenerationProvider for FakeGenerator {
    async fn generate(&self, _model: &str, prompt: &str, _opts: GenerationOptions) -> anyhow::Result<String> {
        if prompt.starts_with("L-FISCAL") {
            Ok("PASS".to_string())
        } else {
            Ok("a thoughtful creative response about the claim".to_string())
        }
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
async fn bicameral_stream_emits_exactly_one_verdict_line() {
    let app = api::build_router(test_state());
    let body = serde_json::json!({ "claim": "the sky is blue", "context": [] });
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .method("POST")
                .uri("/bicameral_stream")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let verdict_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("B:")).collect();
    assert_eq!(verdict_lines.len(), 1);

    let creative_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("A:")).collect();
    assert!(!creative_lines.is_empty());
}
