//! C7: Bicameral Streamer. Runs a creative ("A") generation stream and a
//! fiscal ("B") verdict concurrently, multiplexing both onto one
//! line-oriented `text/plain` response.
//!
//! Open Question (canonical B: ordering), resolved in DESIGN.md: the
//! verdict is emitted at the first moment both the fiscal call has
//! completed AND at least one creative chunk has already been yielded,
//! never before the reader has seen any "A:" output, falling back to
//! "emit after the creative stream ends" if fiscal is still outstanding
//! when creative output stops.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::antibody_store::AntibodyStore;
use crate::domain::{Node, VerificationRequest};
use crate::embedding::{cosine_similarity, EmbeddingGateway};
use crate::generation::{GenerationOptions, GenerationProvider};

const ANTIBODY_THRESHOLD: f32 = 0.5;
const ANTIBODY_LIMIT: u32 = 2;
const PRUNED_CONTEXT_LIMIT: usize = 3;
const FISCAL_STOP: &str = "\n";

pub struct BicameralStreamer {
    embeddings: Arc<EmbeddingGateway>,
    generator: Arc<dyn GenerationProvider>,
    model: String,
    antibody_store: Option<Arc<AntibodyStore>>,
}

impl BicameralStreamer {
    pub fn new(
        embeddings: Arc<EmbeddingGateway>,
        generator: Arc<dyn GenerationProvider>,
        model: String,
        antibody_store: Option<Arc<AntibodyStore>>,
    ) -> Self {
        Self {
            embeddings,
            generator,
            model,
            antibody_store,
        }
    }

    /// Returns a channel receiver of already-prefixed lines
    /// (`A:...`, `B:...`, `E:...`). The fiscal task is launched before the
    /// creative task, per the concurrency model.
    pub fn stream(self: Arc<Self>, req: VerificationRequest) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            self.run(req, tx).await;
        });
        rx
    }

    async fn run(&self, req: VerificationRequest, tx: mpsc::Sender<String>) {
        let fiscal_prompt = format!(
            "L-FISCAL: Is '{}' a valid premise? Answer PASS or FALLACY only. Response:",
            req.claim
        );
        let fiscal_opts = GenerationOptions {
            temperature: 0.0,
            max_tokens: Some(5),
            stop: Some(FISCAL_STOP),
            json_mode: false,
        };

        let generator = self.generator.clone();
        let model = self.model.clone();
        let fiscal_handle = tokio::spawn(async move {
            generator.generate(&model, &fiscal_prompt, fiscal_opts).await
        });

        let antibody_injection = self.antibody_injection(&req.claim).await;
        let gen_prompt = self.build_creative_prompt(&req, &antibody_injection).await;

        // `fiscal_handle` is consumed at most once: `take_fiscal_verdict`
        // takes it out of the `Option`, so a second call after the verdict
        // has already been taken is a no-op rather than a re-poll of an
        // already-resolved `JoinHandle` (which panics).
        let mut fiscal_handle = Some(fiscal_handle);
        let mut verdict_taken = false;

        match self.generator.generate(&self.model, &gen_prompt, GenerationOptions::default()).await {
            Ok(full_text) => {
                for chunk in chunk_text(&full_text) {
                    if tx.send(format!("A:{chunk}")).await.is_err() {
                        return;
                    }

                    if !verdict_taken {
                        let finished = fiscal_handle.as_ref().is_some_and(|h| h.is_finished());
                        if finished {
                            verdict_taken = true;
                            if let Some(verdict) = take_fiscal_verdict(&mut fiscal_handle).await {
                                if tx.send(format!("B:{verdict}")).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(format!("E:{e}")).await;
                return;
            }
        }

        if !verdict_taken {
            if let Some(verdict) = take_fiscal_verdict(&mut fiscal_handle).await {
                let _ = tx.send(format!("B:{verdict}")).await;
            }
        }
    }

    async fn antibody_injection(&self, claim: &str) -> String {
        let Some(store) = &self.antibody_store else {
            return String::new();
        };
        let Some(claim_embedding) = self.embeddings.embed(claim).await else {
            return String::new();
        };

        let matches = store
            .search(&claim_embedding, ANTIBODY_THRESHOLD, ANTIBODY_LIMIT)
            .await;
        if matches.is_empty() {
            return String::new();
        }

        let lines: Vec<String> = matches.iter().map(|m| format!("- {}", m.content)).collect();
        format!(
            "\nNEURAL ANTIBODIES DETECTED (AVOID THESE PAST MISTAKES):\n{}",
            lines.join("\n")
        )
    }

    /// Embeds the claim and every context node, ranks by similarity
    /// descending, and keeps the top 3. Degrades to the first 3 nodes in
    /// input order if embedding fails anywhere in the pass.
    async fn build_creative_prompt(&self, req: &VerificationRequest, antibody_injection: &str) -> String {
        let context_nodes = req.context_nodes();
        let top_context = self.prune_context(&req.claim, &context_nodes).await;

        format!(
            "Eres un asistente veraz. {antibody_injection}\nReact to: {}. Context: {}",
            req.claim,
            serde_json::to_string(&top_context.iter().map(|n| &n.text).collect::<Vec<_>>())
                .unwrap_or_default()
        )
    }

    async fn prune_context(&self, claim: &str, context: &[Node]) -> Vec<Node> {
        if context.is_empty() {
            return Vec::new();
        }

        let Some(claim_embedding) = self.embeddings.embed(claim).await else {
            return context.iter().take(PRUNED_CONTEXT_LIMIT).cloned().collect();
        };

        let mut scored = Vec::with_capacity(context.len());
        for node in context {
            match self.embeddings.embed(&node.text).await {
                Some(embedding) => scored.push((cosine_similarity(&claim_embedding, &embedding), node.clone())),
                None => return context.iter().take(PRUNED_CONTEXT_LIMIT).cloned().collect(),
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(PRUNED_CONTEXT_LIMIT).map(|(_, n)| n).collect()
    }
}

fn chunk_text(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

async fn take_fiscal_verdict(
    handle: &mut Option<tokio::task::JoinHandle<anyhow::Result<String>>>,
) -> Option<String> {
    let handle = handle.take()?;
    match handle.await {
        Ok(Ok(text)) => Some(text.trim().to_string()),
        Ok(Err(e)) => {
            tracing::warn!("fiscal verdict call failed: {e}");
            None
        }
        Err(e) => {
            tracing::warn!("fiscal verdict task panicked: {e}");
            None
        }
    }
}

/// Adapts a receiver of pre-formatted lines into the newline-delimited
/// byte stream the `/bicameral_stream` handler serves.
pub fn into_body_stream(
    rx: mpsc::Receiver<String>,
) -> impl futures::Stream<Item = Result<axum::body::Bytes, std::io::Error>> {
    ReceiverStream::new(rx).map(|line| Ok(axum::body::Bytes::from(format!("{line}\n"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_text_splits_on_spaces_inclusive() {
        let chunks = chunk_text("hello world foo");
        assert_eq!(chunks, vec!["hello ", "world ", "foo"]);
    }
}
