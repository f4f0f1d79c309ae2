//! C4: Router. A pure function placing a task onto the cheapest model that
//! satisfies its quality requirement. No I/O, fully unit-testable.

use crate::domain::{Complexity, TaskType};

#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub task_type: TaskType,
    pub input_tokens: u64,
    pub complexity: Complexity,
    pub require_high_quality: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub use_local: bool,
    pub recommended_model: String,
    pub estimated_cost_usd: f64,
    pub reasoning: String,
}

const PREMIUM_CHAT_RATE: f64 = 5.00;
const SMALL_EMBED_RATE: f64 = 0.02;
const MINI_CHAT_RATE: f64 = 0.15;
const ALT_PREMIUM_RATE: f64 = 3.00;

/// Routes a task per the fixed decision table below (first match wins):
///
/// 1. cloud + high-quality          -> premium chat model, $5.00/1M
/// 2. cloud + embedding              -> small embedding model, $0.02/1M
/// 3. cloud (default)                -> mini chat model, $0.15/1M
/// 4. local + high-quality           -> premium chat model, $5.00/1M
/// 5. local + HIGH complexity + generation -> alt premium model, $3.00/1M
/// 6. otherwise                      -> local default model, $0.00
pub fn route(req: &RouteRequest, cloud_enabled: bool, local_default_model: &str) -> RouteDecision {
    let cost = |tokens: u64, rate: f64| (tokens as f64 / 1_000_000.0) * rate;

    if cloud_enabled {
        if req.require_high_quality {
            return RouteDecision {
                use_local: false,
                recommended_model: "claude-3-5-sonnet".to_string(),
                estimated_cost_usd: cost(req.input_tokens, PREMIUM_CHAT_RATE),
                reasoning: "cloud quality required: routed to premium chat model".to_string(),
            };
        }
        if matches!(req.task_type, TaskType::Embedding) {
            return RouteDecision {
                use_local: false,
                recommended_model: "text-embedding-3-small".to_string(),
                estimated_cost_usd: cost(req.input_tokens, SMALL_EMBED_RATE),
                reasoning: "cloud embedding task: routed to small embedding model".to_string(),
            };
        }
        return RouteDecision {
            use_local: false,
            recommended_model: "gpt-4o-mini".to_string(),
            estimated_cost_usd: cost(req.input_tokens, MINI_CHAT_RATE),
            reasoning: "cloud default: routed to mini chat model".to_string(),
        };
    }

    if req.require_high_quality {
        return RouteDecision {
            use_local: false,
            recommended_model: "claude-3-5-sonnet".to_string(),
            estimated_cost_usd: cost(req.input_tokens, PREMIUM_CHAT_RATE),
            reasoning: "quality required even without cloud mode: routed to premium chat model"
                .to_string(),
        };
    }

    if req.complexity == Complexity::High && matches!(req.task_type, TaskType::Generation) {
        return RouteDecision {
            use_local: false,
            recommended_model: "claude-3-5-sonnet".to_string(),
            estimated_cost_usd: cost(req.input_tokens, ALT_PREMIUM_RATE),
            reasoning: "high-complexity local generation: escalated to alternate premium model"
                .to_string(),
        };
    }

    RouteDecision {
        use_local: true,
        recommended_model: local_default_model.to_string(),
        estimated_cost_usd: 0.0,
        reasoning: "routed to local model at no cost".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_cloud_embedding_low_complexity() {
        let req = RouteRequest {
            task_type: TaskType::Embedding,
            input_tokens: 1_000_000,
            complexity: Complexity::Low,
            require_high_quality: false,
        };
        let decision = route(&req, true, "phi3:mini");
        assert!(!decision.use_local);
        assert_eq!(decision.recommended_model, "text-embedding-3-small");
        assert!((decision.estimated_cost_usd - 0.02).abs() < 1e-9);
    }

    #[test]
    fn s4_local_high_complexity_generation_escalates() {
        let req = RouteRequest {
            task_type: TaskType::Generation,
            input_tokens: 100_000,
            complexity: Complexity::High,
            require_high_quality: false,
        };
        let decision = route(&req, false, "phi3:mini");
        assert!(!decision.use_local);
        assert_eq!(decision.recommended_model, "claude-3-5-sonnet");
        assert!((decision.estimated_cost_usd - 0.30).abs() < 1e-9);
    }

    #[test]
    fn cloud_high_quality_always_wins_first() {
        let req = RouteRequest {
            task_type: TaskType::Embedding,
            input_tokens: 1_000,
            complexity: Complexity::Low,
            require_high_quality: true,
        };
        let decision = route(&req, true, "phi3:mini");
        assert_eq!(decision.recommended_model, "claude-3-5-sonnet");
    }

    #[test]
    fn cloud_default_chat() {
        let req = RouteRequest {
            task_type: TaskType::Generation,
            input_tokens: 2_000_000,
            complexity: Complexity::Low,
            require_high_quality: false,
        };
        let decision = route(&req, true, "phi3:mini");
        assert_eq!(decision.recommended_model, "gpt-4o-mini");
        assert!((decision.estimated_cost_usd - 0.30).abs() < 1e-9);
    }

    #[test]
    fn local_low_complexity_stays_free_and_local() {
        let req = RouteRequest {
            task_type: TaskType::Verification,
            input_tokens: 50_000,
            complexity: Complexity::Low,
            require_high_quality: false,
        };
        let decision = route(&req, false, "phi3:mini");
        assert!(decision.use_local);
        assert_eq!(decision.recommended_model, "phi3:mini");
        assert_eq!(decision.estimated_cost_usd, 0.0);
    }

    #[test]
    fn router_is_deterministic() {
        let req = RouteRequest {
            task_type: TaskType::Verification,
            input_tokens: 12_345,
            complexity: Complexity::Medium,
            require_high_quality: false,
        };
        let a = route(&req, false, "phi3:mini");
        let b = route(&req, false, "phi3:mini");
        assert_eq!(a, b);
    }
}
