//! C5: Verification Pipeline. The sequential L1-L7 stages that decide
//! whether a claim is consistent with its invariants, preferring the
//! cheapest stage that can answer confidently and never failing a request
//! outright (innocent-until-proven-guilty).

use std::sync::Arc;

use serde_json::Value;

use crate::audit::ShadowAuditor;
use crate::cache::VerificationCache;
use crate::domain::{CacheKey, Complexity, Node, TaskType, VerificationRequest, VerificationResult};
use crate::embedding::EmbeddingGateway;
use crate::generation::{GenerationOptions, GenerationProvider};
use crate::router::{self, RouteRequest};
use crate::vector_skip;

const CONTEXT_NODE_LIMIT: usize = 5;
const TRUNCATE_CHARS: usize = 200;
const VECTOR_SKIP_THRESHOLD: f32 = vector_skip::DEFAULT_THRESHOLD;

pub struct VerificationPipeline {
    cache: Arc<VerificationCache>,
    embeddings: Arc<EmbeddingGateway>,
    local_generator: Arc<dyn GenerationProvider>,
    cloud_generator: Option<Arc<dyn GenerationProvider>>,
    local_model: String,
    cloud_model: Option<String>,
    auditor: Arc<ShadowAuditor>,
}

impl VerificationPipeline {
    pub fn new(
        cache: Arc<VerificationCache>,
        embeddings: Arc<EmbeddingGateway>,
        local_generator: Arc<dyn GenerationProvider>,
        local_model: String,
        cloud_generator: Option<Arc<dyn GenerationProvider>>,
        cloud_model: Option<String>,
        auditor: Arc<ShadowAuditor>,
    ) -> Self {
        Self {
            cache,
            embeddings,
            local_generator,
            cloud_generator,
            local_model,
            cloud_model,
            auditor,
        }
    }

    pub async fn verify(&self, req: &VerificationRequest) -> VerificationResult {
        let cache_key = CacheKey::compute(req);

        // L1: exact cache.
        if let Some(hit) = self.cache.get(&cache_key).await {
            return hit;
        }

        let pin_nodes = req.pin_node_list();

        // L2: vector-skip against PIN nodes only.
        if !pin_nodes.is_empty() {
            let claim_embedding = self.embeddings.embed(&req.claim).await;
            let mut pin_embeddings = Vec::with_capacity(pin_nodes.len());
            for pin in &pin_nodes {
                let embedding = self.embeddings.embed(&pin.text).await;
                pin_embeddings.push((pin.clone(), embedding));
            }

            if let Some(skip_result) = vector_skip::try_skip(
                claim_embedding.as_deref(),
                &pin_embeddings,
                self.embeddings.model_name(),
                VECTOR_SKIP_THRESHOLD,
            ) {
                self.cache.set(cache_key, skip_result.clone()).await;
                return skip_result;
            }
        }

        // L3: build the prompt from context + pin nodes.
        let context_nodes = req.context_nodes();
        let prompt = build_prompt(&req.claim, &context_nodes, &pin_nodes);

        // L4: model call, cloud preferred when routing calls for it.
        let route = router::route(
            &RouteRequest {
                task_type: TaskType::Verification,
                input_tokens: estimate_tokens(&prompt),
                complexity: req.task_complexity,
                require_high_quality: req.task_complexity == Complexity::High,
            },
            self.cloud_generator.is_some(),
            &self.local_model,
        );

        let (generator, model, used_local): (&Arc<dyn GenerationProvider>, &str, bool) =
            if !route.use_local {
                match (&self.cloud_generator, &self.cloud_model) {
                    (Some(gen), Some(model)) => (gen, model.as_str(), false),
                    _ => (&self.local_generator, self.local_model.as_str(), true),
                }
            } else {
                (&self.local_generator, self.local_model.as_str(), true)
            };

        let opts = GenerationOptions {
            temperature: 0.1,
            json_mode: true,
            ..Default::default()
        };

        let result = match generator.generate(model, &prompt, opts).await {
            Ok(raw) => {
                // L5: parse, defaulting to safe-consistent on failure.
                let mut result = parse_verification_response(&raw, model);
                // cost_usd must be 0 whenever the generator actually used is
                // local, regardless of what the route decision priced in
                // (the route can call for cloud while falling back to the
                // local generator when no cloud generator is configured).
                result.cost_usd = if used_local { 0.0 } else { route.estimated_cost_usd };

                // L6: store + optionally schedule the shadow audit.
                self.cache.set(cache_key, result.clone()).await;
                if let (Some(node_id), Some(project_id)) = (&req.node_id, &req.project_id) {
                    self.auditor.schedule(
                        node_id.clone(),
                        project_id.clone(),
                        req.claim.clone(),
                        result.reasoning.clone(),
                        context_nodes.clone(),
                    );
                }
                result
            }
            // L7: transport failure -> default-safe, never surfaced as an error.
            Err(e) => {
                tracing::warn!("verification model call failed: {e}");
                VerificationResult {
                    consistent: true,
                    confidence: 0.3,
                    reasoning: "engine offline, default safe".to_string(),
                    model_used: "offline-fallback".to_string(),
                    cost_usd: 0.0,
                }
            }
        };

        result
    }
}

fn build_prompt(claim: &str, context: &[Node], pins: &[Node]) -> String {
    let pin_summary = if pins.is_empty() {
        "No invariants established.".to_string()
    } else {
        pins.iter()
            .map(|n| format!("- [PIN] {}", n.truncated_text(TRUNCATE_CHARS)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let context_summary = if context.is_empty() {
        "No additional context.".to_string()
    } else {
        context
            .iter()
            .take(CONTEXT_NODE_LIMIT)
            .map(|n| {
                let kind = n.kind.as_deref().unwrap_or("node");
                format!("- [{kind}] {}", n.truncated_text(TRUNCATE_CHARS))
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are a logic verification engine. Determine if the following CLAIM is consistent with the established INVARIANTS (PIN nodes).\n\n\
         INVARIANTS (GROUND TRUTH - Cannot be contradicted):\n{pin_summary}\n\n\
         CONTEXT:\n{context_summary}\n\n\
         CLAIM TO VERIFY:\n{claim}\n\n\
         Respond in JSON format:\n\
         {{\"consistent\": true/false, \"confidence\": 0.0-1.0, \"reasoning\": \"brief explanation\"}}\n"
    )
}

fn parse_verification_response(raw: &str, model: &str) -> VerificationResult {
    match serde_json::from_str::<Value>(raw) {
        Ok(parsed) => VerificationResult {
            consistent: parsed.get("consistent").and_then(Value::as_bool).unwrap_or(true),
            confidence: parsed
                .get("confidence")
                .and_then(Value::as_f64)
                .map(|v| v as f32)
                .unwrap_or(0.7),
            reasoning: parsed
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or("local model verification")
                .to_string(),
            model_used: model.to_string(),
            cost_usd: 0.0,
        },
        Err(_) => VerificationResult {
            consistent: true,
            confidence: 0.5,
            reasoning: "unparseable, defaulting consistent".to_string(),
            model_used: model.to_string(),
            cost_usd: 0.0,
        },
    }
}

fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4).max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_handles_well_formed_json() {
        let raw = r#"{"consistent": false, "confidence": 0.2, "reasoning": "contradicts invariant"}"#;
        let result = parse_verification_response(raw, "phi3:mini");
        assert!(!result.consistent);
        assert!((result.confidence - 0.2).abs() < 1e-6);
    }

    #[test]
    fn parse_defaults_to_consistent_on_garbage() {
        let result = parse_verification_response("not json at all", "phi3:mini");
        assert!(result.consistent);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.reasoning, "unparseable, defaulting consistent");
    }

    #[test]
    fn prompt_includes_claim_and_truncates_long_nodes() {
        let claim = "the sky is blue";
        let long_text = "x".repeat(500);
        let pin = Node {
            id: None,
            kind: None,
            text: long_text,
        };
        let prompt = build_prompt(claim, &[], &[pin]);
        assert!(prompt.contains(claim));
        assert!(prompt.contains(&"x".repeat(TRUNCATE_CHARS)));
        assert!(!prompt.contains(&"x".repeat(TRUNCATE_CHARS + 1)));
    }
}
