use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{GenerationOptions, GenerationProvider};

pub struct OllamaGenerator {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, model: &str, prompt: &str, opts: GenerationOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let mut options = json!({ "temperature": opts.temperature });
        if let Some(stop) = opts.stop {
            options["stop"] = json!([stop]);
        }
        if let Some(max_tokens) = opts.max_tokens {
            options["num_predict"] = json!(max_tokens);
        }

        let payload = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "format": if opts.json_mode { "json" } else { "" },
            "options": options,
        });

        let res = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .context("ollama generate request failed")?;

        if !res.status().is_success() {
            return Err(anyhow!("ollama generate returned status {}", res.status()));
        }

        let body: Value = res.json().await.context("ollama generate response parse failed")?;
        body.get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("ollama generate response missing 'response' field")
    }
}
