//! C9: Cognitive Recycler. Turns a corrected failure into a future
//! antibody. Runs fully in the background; the caller gets an immediate
//! acknowledgement regardless of how the embedding/store calls resolve.

use std::sync::Arc;

use chrono::Utc;

use crate::antibody_store::AntibodyStore;
use crate::domain::Antibody;
use crate::embedding::EmbeddingGateway;

pub struct RecyclePayload {
    pub user_prompt: String,
    pub rejected_output: String,
    pub correction: String,
    pub project_id: Option<String>,
}

pub struct CognitiveRecycler {
    embeddings: Arc<EmbeddingGateway>,
    store: Option<Arc<AntibodyStore>>,
}

impl CognitiveRecycler {
    pub fn new(embeddings: Arc<EmbeddingGateway>, store: Option<Arc<AntibodyStore>>) -> Self {
        Self { embeddings, store }
    }

    /// Schedules the recycling work and returns immediately; the caller
    /// never waits on the embedding or store round-trip.
    pub fn recycle(&self, payload: RecyclePayload) {
        let embeddings = self.embeddings.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let learning_unit = format!(
                "PAST FAILURE: User asked '{}', model replied incorrectly '{}'. CORRECTIVE ACTION: {}.",
                payload.user_prompt, payload.rejected_output, payload.correction
            );

            let Some(embedding) = embeddings.embed(&payload.user_prompt).await else {
                tracing::warn!("cognitive recycler: embedding unavailable, dropping antibody");
                return;
            };

            let Some(store) = store else {
                tracing::info!("cognitive recycler: no antibody store configured, antibody discarded");
                return;
            };

            let antibody = Antibody {
                content: learning_unit,
                embedding,
                project_id: payload.project_id,
                created_at: Utc::now(),
            };

            if let Err(e) = store.insert(&antibody).await {
                tracing::warn!("cognitive recycler: antibody insert failed: {e}");
            }
        });
    }
}
