//! C3: Vector-Skip Matcher. Short-circuits verification when the claim's
//! embedding is already near-identical to a pinned invariant.

use crate::domain::{Node, VerificationResult};
use crate::embedding::cosine_similarity;

pub const DEFAULT_THRESHOLD: f32 = 0.96;

/// Compares `claim_embedding` against every PIN node's embedding and, if the
/// best match clears `threshold`, returns a verified-consistent result
/// without a model call. Any missing embedding degrades to "no match"
/// rather than failing the request.
pub fn try_skip(
    claim_embedding: Option<&[f32]>,
    pin_embeddings: &[(Node, Option<Vec<f32>>)],
    embedder_name: &str,
    threshold: f32,
) -> Option<VerificationResult> {
    let claim_embedding = claim_embedding?;

    let mut best: f32 = 0.0;
    for (_, embedding) in pin_embeddings {
        let Some(embedding) = embedding else { continue };
        let sim = cosine_similarity(claim_embedding, embedding);
        if sim > best {
            best = sim;
        }
    }

    if best >= threshold {
        Some(VerificationResult {
            consistent: true,
            confidence: best,
            reasoning: "semantic match with invariant".to_string(),
            model_used: format!("{embedder_name} (Vector-Skip)"),
            cost_usd: 0.0,
        })
    } else {
        None
    }
}
