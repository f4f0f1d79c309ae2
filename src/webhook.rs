//! Fire-and-forget webhook delivery: a thin reqwest wrapper with no retry
//! logic. Failures are logged, never propagated into the request path.

use anyhow::{anyhow, Result};
use serde::Serialize;

pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn post<T: Serialize + ?Sized>(&self, url: &str, payload: &T) -> Result<()> {
        let res = self.client.post(url).json(payload).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("webhook POST {url} failed: {status} - {body}"));
        }
        Ok(())
    }
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}
