//! Core data types shared across the verification and interception pipelines.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A caller-supplied record. `text` is extracted once at ingress using the
/// `statement -> content -> string-form` fallback so downstream code never
/// has to duck-type a JSON object again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: String,
}

impl Node {
    /// Builds a `Node` from a raw JSON object, applying the statement -> content
    /// -> Debug-string fallback.
    pub fn from_value(value: &Value) -> Self {
        let id = value.get("id").and_then(Value::as_str).map(str::to_string);
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        let text = value
            .get("statement")
            .and_then(Value::as_str)
            .or_else(|| value.get("content").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string());
        Self { id, kind, text }
    }

    /// Truncates the node's text to `limit` characters (char-boundary safe).
    pub fn truncated_text(&self, limit: usize) -> String {
        self.text.chars().take(limit).collect()
    }
}

/// Task complexity hint supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// The kind of work the router is being asked to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Verification,
    Generation,
    Embedding,
    Planning,
}

/// A persisted record of a past incorrect answer and its correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Antibody {
    pub content: String,
    pub embedding: Vec<f32>,
    pub project_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Polarity of an assertion inside the axiom pool: TRUE for invariants,
/// FALSE for matched antibodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    True,
    False,
}

/// In-memory union of invariants (positive) and matched antibodies
/// (negative) for a single generation call. Conflicts resolve TRUE-wins.
#[derive(Debug, Clone, Default)]
pub struct AxiomPool {
    axioms: BTreeMap<String, Polarity>,
}

impl AxiomPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an axiom, logging (via `tracing::warn`) and resolving
    /// TRUE-wins whenever a key's polarity would flip to FALSE after
    /// already being recorded TRUE.
    pub fn insert(&mut self, text: String, polarity: Polarity) {
        match self.axioms.get(&text) {
            Some(Polarity::True) if polarity == Polarity::False => {
                tracing::warn!(axiom = %text, "axiom conflict: keeping TRUE (TRUE-wins)");
            }
            _ => {
                self.axioms.insert(text, polarity);
            }
        }
    }

    pub fn from_invariants_and_antibodies(invariants: &[Node], antibodies: &[Antibody]) -> Self {
        let mut pool = Self::new();
        for inv in invariants {
            pool.insert(inv.text.clone(), Polarity::True);
        }
        for ab in antibodies {
            pool.insert(ab.content.clone(), Polarity::False);
        }
        pool
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Polarity)> {
        self.axioms.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.axioms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axioms.is_empty()
    }

    /// Renders the pool as a plain `assertion -> is_true` map, as consumed
    /// by `sync_axioms`.
    pub fn as_bool_map(&self) -> BTreeMap<String, bool> {
        self.axioms
            .iter()
            .map(|(k, v)| (k.clone(), matches!(v, Polarity::True)))
            .collect()
    }
}

/// Request body for `/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub claim: String,
    #[serde(default)]
    pub context: Vec<Value>,
    #[serde(default)]
    pub pin_nodes: Vec<Value>,
    #[serde(default = "default_complexity")]
    pub task_complexity: Complexity,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_complexity() -> Complexity {
    Complexity::Low
}

impl VerificationRequest {
    pub fn context_nodes(&self) -> Vec<Node> {
        self.context.iter().map(Node::from_value).collect()
    }

    pub fn pin_node_list(&self) -> Vec<Node> {
        self.pin_nodes.iter().map(Node::from_value).collect()
    }
}

/// Response of a verification pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub consistent: bool,
    pub confidence: f32,
    pub reasoning: String,
    pub model_used: String,
    #[serde(default)]
    pub cost_usd: f64,
}

impl VerificationResult {
    /// Marks this result as served from cache: suffixes `model_used` and
    /// zeroes the cost, per the L1 cache-hit contract.
    pub fn into_cached(mut self) -> Self {
        if !self.model_used.ends_with(" (Cached)") {
            self.model_used.push_str(" (Cached)");
        }
        self.cost_usd = 0.0;
        self
    }
}

/// Deterministic cache key: `sha256(claim || canonical(context) || canonical(pin_nodes) || task_complexity)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn compute(req: &VerificationRequest) -> Self {
        let canonical_context = canonical_json(&req.context);
        let canonical_pins = canonical_json(&req.pin_nodes);
        let complexity = match req.task_complexity {
            Complexity::Low => "LOW",
            Complexity::Medium => "MEDIUM",
            Complexity::High => "HIGH",
        };

        let mut hasher = Sha256::new();
        hasher.update(req.claim.as_bytes());
        hasher.update(b"\x1e");
        hasher.update(canonical_context.as_bytes());
        hasher.update(b"\x1e");
        hasher.update(canonical_pins.as_bytes());
        hasher.update(b"\x1e");
        hasher.update(complexity.as_bytes());

        Self(hex::encode(hasher.finalize()))
    }
}

/// Stable JSON serialization with sorted object keys, used as the
/// canonicalisation step for the cache key.
fn canonical_json(values: &[Value]) -> String {
    let sorted: Vec<Value> = values.iter().map(sort_value_keys).collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

fn sort_value_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_value_keys(v)))
                .collect();
            serde_json::to_value(sorted).unwrap_or(Value::Null)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_fallback_prefers_statement_over_content() {
        let v = serde_json::json!({"statement": "a", "content": "b"});
        assert_eq!(Node::from_value(&v).text, "a");
    }

    #[test]
    fn node_fallback_uses_content_when_statement_missing() {
        let v = serde_json::json!({"content": "b"});
        assert_eq!(Node::from_value(&v).text, "b");
    }

    #[test]
    fn node_fallback_renders_string_form_when_both_missing() {
        let v = serde_json::json!({"id": "n1"});
        let node = Node::from_value(&v);
        assert!(node.text.contains("n1"));
    }

    #[test]
    fn cache_key_is_order_independent_within_an_object() {
        let req_a = VerificationRequest {
            claim: "x".into(),
            context: vec![serde_json::json!({"a": 1, "b": 2})],
            pin_nodes: vec![],
            task_complexity: Complexity::Low,
            node_id: None,
            project_id: None,
        };
        let req_b = VerificationRequest {
            context: vec![serde_json::json!({"b": 2, "a": 1})],
            ..req_a.clone()
        };
        assert_eq!(CacheKey::compute(&req_a), CacheKey::compute(&req_b));
    }

    #[test]
    fn cache_key_changes_with_complexity() {
        let base = VerificationRequest {
            claim: "x".into(),
            context: vec![],
            pin_nodes: vec![],
            task_complexity: Complexity::Low,
            node_id: None,
            project_id: None,
        };
        let high = VerificationRequest {
            task_complexity: Complexity::High,
            ..base.clone()
        };
        assert_ne!(CacheKey::compute(&base), CacheKey::compute(&high));
    }

    #[test]
    fn axiom_pool_resolves_conflicts_true_wins() {
        let mut pool = AxiomPool::new();
        pool.insert("x is y".into(), Polarity::True);
        pool.insert("x is y".into(), Polarity::False);
        assert_eq!(pool.as_bool_map().get("x is y"), Some(&true));
    }
}
