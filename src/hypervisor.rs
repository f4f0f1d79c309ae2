//! C8: Logit Hypervisor. Synchronous, per-token veto/boost bias
//! calculation against the active axiom pool. Must never suspend: this
//! runs on the decode thread inline with token sampling.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::domain::AxiomPool;

const VETO_BIAS: f32 = -1.0e4;
const BOOST_BIAS: f32 = 4.0;

/// Maps a model's decoded token text to its vocabulary id. Built once per
/// model process-wide (enumerating the full vocabulary is the one
/// unavoidably expensive step) and never mutated after.
pub struct VocabularyMap {
    token_to_id: HashMap<String, u32>,
}

impl VocabularyMap {
    /// Builds the map from an iterator of `(id, decoded_text)` pairs.
    /// Decoding errors upstream are expected to already be resolved with
    /// UTF-8 lossy conversion; this only trims and skips empties.
    pub fn build(tokens: impl IntoIterator<Item = (u32, String)>) -> Self {
        let mut token_to_id = HashMap::new();
        for (id, text) in tokens {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                token_to_id.entry(trimmed.to_string()).or_insert(id);
            }
        }
        Self { token_to_id }
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}

static VOCAB_MAP: OnceLock<VocabularyMap> = OnceLock::new();

/// Returns the process-wide vocabulary map, building it with `builder` on
/// first use only.
pub fn vocabulary_map(builder: impl FnOnce() -> VocabularyMap) -> &'static VocabularyMap {
    VOCAB_MAP.get_or_init(builder)
}

/// Per-generation-call axiom enforcement. Holds no cross-generation state;
/// a fresh instance is synced for every `/generate/absolute_truth` call.
pub struct LogitHypervisor {
    axioms: AxiomPool,
    /// Lower-cased axiom text, cached once per `sync_axioms` call so the
    /// substring scan doesn't re-lowercase on every token.
    lowered_true: Vec<String>,
    lowered_false: Vec<String>,
}

impl LogitHypervisor {
    pub fn new() -> Self {
        Self {
            axioms: AxiomPool::new(),
            lowered_true: Vec::new(),
            lowered_false: Vec::new(),
        }
    }

    /// Replaces the active axiom pool wholesale.
    pub fn sync_axioms(&mut self, pool: AxiomPool) {
        self.lowered_true = pool
            .iter()
            .filter(|(_, polarity)| matches!(polarity, crate::domain::Polarity::True))
            .map(|(text, _)| text.to_lowercase())
            .collect();
        self.lowered_false = pool
            .iter()
            .filter(|(_, polarity)| matches!(polarity, crate::domain::Polarity::False))
            .map(|(text, _)| text.to_lowercase())
            .collect();
        self.axioms = pool;
    }

    pub fn axiom_count(&self) -> usize {
        self.axioms.len()
    }

    /// Computes a bias map for every vocabulary token that would extend or
    /// complete a TRUE or FALSE axiom, given the text decoded so far.
    /// Substring, case-insensitive matching; ties resolve TRUE-wins.
    /// Must be O(vocabulary size) and synchronous.
    pub fn calculate_logit_bias(
        &self,
        current_text: &str,
        vocab: &VocabularyMap,
    ) -> HashMap<u32, f32> {
        let lowered_current = current_text.to_lowercase();
        let mut biases: HashMap<u32, f32> = HashMap::new();

        for (token_text, &token_id) in &vocab.token_to_id {
            let candidate = format!("{lowered_current}{}", token_text.to_lowercase());

            let extends_true = self
                .lowered_true
                .iter()
                .any(|axiom| axiom.contains(&candidate) || candidate.contains(axiom.as_str()));
            let extends_false = self
                .lowered_false
                .iter()
                .any(|axiom| axiom.contains(&candidate) || candidate.contains(axiom.as_str()));

            match (extends_true, extends_false) {
                (true, _) => {
                    biases.insert(token_id, BOOST_BIAS);
                }
                (false, true) => {
                    biases.insert(token_id, VETO_BIAS);
                }
                (false, false) => {}
            }
        }

        biases
    }
}

impl Default for LogitHypervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Polarity;

    fn vocab() -> VocabularyMap {
        VocabularyMap::build(vec![
            (1, "sky".to_string()),
            (2, "ocean".to_string()),
            (3, " blue".to_string()),
            (4, "red".to_string()),
        ])
    }

    #[test]
    fn true_axiom_boosts_completing_token() {
        let mut pool = AxiomPool::new();
        pool.insert("the sky is blue".to_string(), Polarity::True);
        let mut hv = LogitHypervisor::new();
        hv.sync_axioms(pool);

        let biases = hv.calculate_logit_bias("the sky is", &vocab());
        assert_eq!(biases.get(&3), Some(&BOOST_BIAS));
    }

    #[test]
    fn false_axiom_vetoes_completing_token() {
        let mut pool = AxiomPool::new();
        pool.insert("the sky is red".to_string(), Polarity::False);
        let mut hv = LogitHypervisor::new();
        hv.sync_axioms(pool);

        let biases = hv.calculate_logit_bias("the sky is ", &vocab());
        assert_eq!(biases.get(&4), Some(&VETO_BIAS));
    }

    #[test]
    fn unrelated_token_gets_no_entry() {
        let mut pool = AxiomPool::new();
        pool.insert("the sky is blue".to_string(), Polarity::True);
        let mut hv = LogitHypervisor::new();
        hv.sync_axioms(pool);

        let biases = hv.calculate_logit_bias("completely unrelated context", &vocab());
        assert!(biases.get(&2).is_none());
    }

    #[test]
    fn conflicting_axioms_resolve_true_wins() {
        let mut pool = AxiomPool::new();
        pool.insert("the sky is blue".to_string(), Polarity::True);
        pool.insert("the sky is blue".to_string(), Polarity::False);
        let mut hv = LogitHypervisor::new();
        hv.sync_axioms(pool);

        let biases = hv.calculate_logit_bias("the sky is", &vocab());
        assert_eq!(biases.get(&3), Some(&BOOST_BIAS));
    }

    #[test]
    fn vocabulary_map_trims_and_skips_empty() {
        let vm = VocabularyMap::build(vec![
            (1, "  hello  ".to_string()),
            (2, "   ".to_string()),
        ]);
        assert_eq!(vm.len(), 1);
    }
}
