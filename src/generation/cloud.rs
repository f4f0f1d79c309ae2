use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::CloudProvider;

use super::{GenerationOptions, GenerationProvider};

pub struct CloudGenerator {
    provider: CloudProvider,
    api_key: String,
    client: reqwest::Client,
}

impl CloudGenerator {
    pub fn new(provider: CloudProvider, api_key: String) -> Self {
        Self {
            provider,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> &'static str {
        match self.provider {
            CloudProvider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            CloudProvider::OpenAi => "https://api.openai.com/v1/chat/completions",
        }
    }
}

#[async_trait]
impl GenerationProvider for CloudGenerator {
    async fn generate(&self, model: &str, prompt: &str, opts: GenerationOptions) -> Result<String> {
        let mut payload = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": opts.temperature,
        });
        if let Some(max_tokens) = opts.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(stop) = opts.stop {
            payload["stop"] = json!([stop]);
        }
        if opts.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let mut req = self.client.post(self.endpoint()).bearer_auth(&self.api_key).json(&payload);
        if matches!(self.provider, CloudProvider::OpenRouter) {
            req = req
                .header("HTTP-Referer", "https://rlm-core.local")
                .header("X-Title", "rlm-core");
        }

        let res = req
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .context("cloud generate request failed")?;

        if !res.status().is_success() {
            return Err(anyhow!("cloud generate returned status {}", res.status()));
        }

        let body: Value = res.json().await.context("cloud generate response parse failed")?;
        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("cloud generate response missing choices[0].message.content")
    }
}
