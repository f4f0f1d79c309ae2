//! Immutable configuration snapshot, captured once at process start.

use crate::error::AppError;

/// Which embedding/generation path is active for the lifetime of the process.
/// Decided once at startup and never revisited, per the concurrency model's
/// read-only-after-init rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    Local,
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudProvider {
    OpenRouter,
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ollama_base_url: String,
    pub default_local_model: String,
    pub jwt_secret: Option<String>,
    pub cloud_provider: Option<CloudProvider>,
    pub openrouter_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub audit_webhook_url: Option<String>,
    pub model_path: Option<String>,
    pub render_production: bool,
    pub embedding_mode: EmbeddingMode,
}

impl AppConfig {
    /// Loads the config snapshot from the process environment, applying the
    /// `RENDER=true` strict-production checks: abort startup if a cloud key
    /// or JWT secret is missing.
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let render_production = env_flag("RENDER");

        let openrouter_api_key = env_opt("OPENROUTER_API_KEY");
        let openai_api_key = env_opt("OPENAI_API_KEY");

        let cloud_provider = if openrouter_api_key.is_some() {
            Some(CloudProvider::OpenRouter)
        } else if openai_api_key.is_some() {
            Some(CloudProvider::OpenAi)
        } else {
            None
        };

        let jwt_secret = env_opt("SUPABASE_JWT_SECRET");

        if render_production {
            if cloud_provider.is_none() {
                return Err(AppError::Config(
                    "RENDER=true requires OPENROUTER_API_KEY or OPENAI_API_KEY".into(),
                ));
            }
            if jwt_secret.is_none() {
                return Err(AppError::Config(
                    "RENDER=true requires SUPABASE_JWT_SECRET".into(),
                ));
            }
        }

        let embedding_mode = if cloud_provider.is_some() {
            EmbeddingMode::Cloud
        } else {
            EmbeddingMode::Local
        };

        let default_local_model = match std::env::var("DEFAULT_LOCAL_MODEL") {
            Ok(v) => v,
            Err(_) if cloud_provider.is_some() => "gpt-4o-mini".to_string(),
            Err(_) => "phi3:mini".to_string(),
        };

        Ok(Self {
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            default_local_model,
            jwt_secret,
            cloud_provider,
            openrouter_api_key,
            openai_api_key,
            supabase_url: env_opt("NEXT_PUBLIC_SUPABASE_URL"),
            supabase_service_role_key: env_opt("SUPABASE_SERVICE_ROLE_KEY"),
            audit_webhook_url: env_opt("AUDIT_WEBHOOK_URL"),
            model_path: env_opt("MODEL_PATH"),
            render_production,
            embedding_mode,
        })
    }

    pub fn absolute_truth_enabled(&self) -> bool {
        self.model_path.is_some()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_flag(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("true") | Ok("1"))
}
