use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use rlm_core::antibody_store::AntibodyStore;
use rlm_core::api::{self, AppState};
use rlm_core::audit::ShadowAuditor;
use rlm_core::bicameral::BicameralStreamer;
use rlm_core::cache::VerificationCache;
use rlm_core::config::{AppConfig, CloudProvider, EmbeddingMode};
use rlm_core::embedding::{CloudEmbedder, EmbeddingGateway, OllamaEmbedder};
use rlm_core::generation::{CloudGenerator, GenerationProvider, OllamaGenerator};
use rlm_core::pipeline::VerificationPipeline;
use rlm_core::recycler::CognitiveRecycler;
use rlm_core::surgical::SurgicalEngine;
use rlm_core::webhook::WebhookClient;

#[derive(Parser, Debug)]
#[command(name = "rlm-core", version, about = "Local Reasoning Engine")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8082)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(AppConfig::from_env().map_err(|e| anyhow::anyhow!("{e}"))?);

    println!("{}", "RLM Core: Local Reasoning Engine".cyan().bold());
    println!(
        "  mode: {}  local model: {}  cloud: {}",
        match config.embedding_mode {
            EmbeddingMode::Local => "local".green(),
            EmbeddingMode::Cloud => "cloud".yellow(),
        },
        config.default_local_model,
        config
            .cloud_provider
            .map(|p| format!("{p:?}"))
            .unwrap_or_else(|| "disabled".to_string()),
    );

    let state = build_state(config.clone())?;

    let app = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", cli.host, cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;

    println!(
        "{} listening on http://{}:{}",
        "rlm-core".green().bold(),
        cli.host,
        cli.port
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn build_state(config: Arc<AppConfig>) -> Result<Arc<AppState>> {
    let embedding_provider: Arc<dyn rlm_core::embedding::EmbeddingProvider> =
        match (config.embedding_mode, config.cloud_provider) {
            (EmbeddingMode::Cloud, Some(provider)) => {
                let api_key = cloud_api_key(&config, provider)
                    .context("cloud embedding mode selected but no API key present")?;
                Arc::new(CloudEmbedder::new(
                    provider,
                    api_key,
                    "text-embedding-3-small".to_string(),
                ))
            }
            _ => Arc::new(OllamaEmbedder::new(
                config.ollama_base_url.clone(),
                "nomic-embed-text".to_string(),
            )),
        };
    let embeddings = Arc::new(EmbeddingGateway::new(embedding_provider));

    let local_generator: Arc<dyn GenerationProvider> =
        Arc::new(OllamaGenerator::new(config.ollama_base_url.clone()));

    let (cloud_generator, cloud_model): (Option<Arc<dyn GenerationProvider>>, Option<String>) =
        match config.cloud_provider {
            Some(provider) => {
                let api_key = cloud_api_key(&config, provider);
                match api_key {
                    Some(key) => (
                        Some(Arc::new(CloudGenerator::new(provider, key)) as Arc<dyn GenerationProvider>),
                        Some("gpt-4o-mini".to_string()),
                    ),
                    None => (None, None),
                }
            }
            None => (None, None),
        };

    let webhook = Arc::new(WebhookClient::new());
    let auditor = Arc::new(ShadowAuditor::new(
        local_generator.clone(),
        config.default_local_model.clone(),
        webhook,
        config.audit_webhook_url.clone(),
    ));

    let cache = Arc::new(VerificationCache::new());
    let pipeline = Arc::new(VerificationPipeline::new(
        cache.clone(),
        embeddings.clone(),
        local_generator.clone(),
        config.default_local_model.clone(),
        cloud_generator,
        cloud_model,
        auditor,
    ));

    let antibody_store = match (&config.supabase_url, &config.supabase_service_role_key) {
        (Some(url), Some(key)) => Some(Arc::new(AntibodyStore::new(url.clone(), key.clone()))),
        _ => None,
    };

    let bicameral = Arc::new(BicameralStreamer::new(
        embeddings.clone(),
        local_generator.clone(),
        config.default_local_model.clone(),
        antibody_store.clone(),
    ));

    let recycler = Arc::new(CognitiveRecycler::new(embeddings.clone(), antibody_store.clone()));

    let surgical = if config.absolute_truth_enabled() {
        match SurgicalEngine::load(config.model_path.as_deref().unwrap_or_default()) {
            Ok(engine) => Some(Arc::new(engine)),
            Err(e) => {
                tracing::warn!("MODEL_PATH set but surgical engine failed to load: {e}");
                None
            }
        }
    } else {
        None
    };

    Ok(Arc::new(AppState {
        config,
        embeddings,
        cache,
        pipeline,
        bicameral,
        recycler,
        antibody_store,
        surgical,
    }))
}

fn cloud_api_key(config: &AppConfig, provider: CloudProvider) -> Option<String> {
    match provider {
        CloudProvider::OpenRouter => config.openrouter_api_key.clone(),
        CloudProvider::OpenAi => config.openai_api_key.clone(),
    }
}
