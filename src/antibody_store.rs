//! External antibody store client: a thin Supabase REST wrapper over a
//! `store`/`recall` shaped interface, specialised to the fixed
//! `memory_antibodies` table and the `match_antibodies` vector RPC.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::Antibody;

#[derive(Debug, Clone, Deserialize)]
pub struct AntibodyMatch {
    pub content: String,
    #[serde(default)]
    pub similarity: f32,
}

#[derive(Debug, Serialize)]
struct InsertAntibody<'a> {
    content: &'a str,
    embedding: &'a [f32],
    project_id: &'a Option<String>,
}

pub struct AntibodyStore {
    base_url: String,
    service_role_key: String,
    client: reqwest::Client,
}

impl AntibodyStore {
    pub fn new(base_url: String, service_role_key: String) -> Self {
        Self {
            base_url,
            service_role_key,
            client: reqwest::Client::new(),
        }
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }

    /// Inserts a new antibody record. Best-effort: callers treat failure as
    /// a logged warning, never a user-facing error.
    pub async fn insert(&self, antibody: &Antibody) -> Result<()> {
        let url = format!("{}/rest/v1/memory_antibodies", self.base_url.trim_end_matches('/'));
        let payload = InsertAntibody {
            content: &antibody.content,
            embedding: &antibody.embedding,
            project_id: &antibody.project_id,
        };

        let res = self
            .auth_headers(self.client.post(&url))
            .json(&payload)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(anyhow!("antibody insert failed: {}", res.status()));
        }
        Ok(())
    }

    /// Searches for antibodies near `query_embedding` via the
    /// `match_antibodies` RPC. Returns an empty vec (never an error) when
    /// the store is unreachable, per the "omit silently" rule.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        match_threshold: f32,
        match_count: u32,
    ) -> Vec<AntibodyMatch> {
        let url = format!(
            "{}/rest/v1/rpc/match_antibodies",
            self.base_url.trim_end_matches('/')
        );
        let payload = json!({
            "query_embedding": query_embedding,
            "match_threshold": match_threshold,
            "match_count": match_count,
        });

        let result = async {
            let res = self
                .auth_headers(self.client.post(&url))
                .json(&payload)
                .send()
                .await?;
            if !res.status().is_success() {
                return Err(anyhow!("match_antibodies returned {}", res.status()));
            }
            res.json::<Vec<AntibodyMatch>>().await.map_err(Into::into)
        }
        .await;

        match result {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!("antibody search unreachable, omitting silently: {e}");
                Vec::new()
            }
        }
    }
}
