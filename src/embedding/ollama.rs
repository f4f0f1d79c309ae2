use async_trait::async_trait;
use serde_json::json;

use super::EmbeddingProvider;

pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let payload = json!({ "model": self.model, "prompt": text });

        let res = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| tracing::warn!("ollama embed request failed: {e}"))
            .ok()?;

        if !res.status().is_success() {
            tracing::warn!(status = %res.status(), "ollama embed returned error status");
            return None;
        }

        let body: serde_json::Value = res
            .json()
            .await
            .map_err(|e| tracing::warn!("ollama embed response parse failed: {e}"))
            .ok()?;

        body.get("embedding")?
            .as_array()?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
