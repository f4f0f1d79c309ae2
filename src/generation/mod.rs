//! Generation provider trait shared by the verification pipeline, the
//! shadow auditor's personas, and the bicameral streamer.

mod cloud;
mod ollama;

pub use cloud::CloudGenerator;
pub use ollama::OllamaGenerator;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Option<&'static str>,
    pub json_mode: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: None,
            stop: None,
            json_mode: false,
        }
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, model: &str, prompt: &str, opts: GenerationOptions) -> anyhow::Result<String>;
}
