use async_trait::async_trait;
use serde_json::json;

use crate::config::CloudProvider;

use super::EmbeddingProvider;

pub struct CloudEmbedder {
    provider: CloudProvider,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl CloudEmbedder {
    pub fn new(provider: CloudProvider, api_key: String, model: String) -> Self {
        Self {
            provider,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> &'static str {
        match self.provider {
            CloudProvider::OpenRouter => "https://openrouter.ai/api/v1/embeddings",
            CloudProvider::OpenAi => "https://api.openai.com/v1/embeddings",
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CloudEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let mut req = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": text }));

        if matches!(self.provider, CloudProvider::OpenRouter) {
            req = req
                .header("HTTP-Referer", "https://rlm-core.local")
                .header("X-Title", "rlm-core");
        }

        let res = req
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| tracing::warn!("cloud embed request failed: {e}"))
            .ok()?;

        if !res.status().is_success() {
            tracing::warn!(status = %res.status(), "cloud embed returned error status");
            return None;
        }

        let body: serde_json::Value = res
            .json()
            .await
            .map_err(|e| tracing::warn!("cloud embed response parse failed: {e}"))
            .ok()?;

        body.get("data")?
            .get(0)?
            .get("embedding")?
            .as_array()?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
