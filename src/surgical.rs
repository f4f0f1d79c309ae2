//! Surgical inference engine backing `/generate/absolute_truth`: a local
//! GGUF decoder whose sampling loop runs every candidate token through the
//! Logit Hypervisor before it's chosen.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use crate::domain::AxiomPool;
use crate::hypervisor::{LogitHypervisor, VocabularyMap};

const MAX_TOKENS: usize = 200;
const STOP_TEXT: &str = "\n";

pub struct SurgicalEngine {
    model: std::sync::Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
}

impl SurgicalEngine {
    /// Loads a GGUF model from `model_path`, expecting a sibling
    /// `tokenizer.json` in the same directory (the convention `MODEL_PATH`
    /// deployments already follow).
    pub fn load(model_path: &str) -> Result<Self> {
        let device = Device::Cpu;
        let path = Path::new(model_path);
        let tokenizer_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("tokenizer.json");

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer at {:?}: {e}", tokenizer_path))?;

        let mut file = std::fs::File::open(path)
            .with_context(|| format!("failed to open MODEL_PATH {model_path}"))?;
        let content = gguf_file::Content::read(&mut file).context("failed to parse gguf header")?;
        let model = ModelWeights::from_gguf(content, &mut file, &device)
            .context("failed to load quantized model weights")?;

        Ok(Self {
            model: std::sync::Mutex::new(model),
            tokenizer,
            device,
        })
    }

    /// Builds the process-wide vocabulary map for this engine's tokenizer,
    /// decoding every token id once.
    pub fn vocabulary_map(&self) -> VocabularyMap {
        let vocab = self.tokenizer.get_vocab(true);
        VocabularyMap::build(
            vocab
                .into_iter()
                .map(|(text, id)| (id, text)),
        )
    }

    /// Runs the decode loop with the hypervisor's bias applied at every
    /// step, stopping at `STOP_TEXT` or `MAX_TOKENS`.
    pub fn generate_with_hypervisor(
        &self,
        prompt: &str,
        axioms: AxiomPool,
        vocab: &VocabularyMap,
    ) -> Result<String> {
        let mut hypervisor = LogitHypervisor::new();
        hypervisor.sync_axioms(axioms);

        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow!("tokenizer encode failed: {e}"))?;
        let mut tokens = encoding.get_ids().to_vec();

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("surgical engine model lock poisoned"))?;

        let mut generated = String::new();
        for step in 0..MAX_TOKENS {
            let input = Tensor::new(&tokens[tokens.len().saturating_sub(1)..], &self.device)?
                .unsqueeze(0)?;
            let logits = model.forward(&input, step)?;
            let logits = logits.squeeze(0)?.to_dtype(candle_core::DType::F32)?;
            let mut scores = logits.to_vec1::<f32>()?;

            let decoded_so_far = format!("{prompt}{generated}");
            let biases = hypervisor.calculate_logit_bias(&decoded_so_far, vocab);
            for (id, bias) in biases {
                if let Some(score) = scores.get_mut(id as usize) {
                    *score += bias;
                }
            }

            let next_id = argmax(&scores) as u32;
            tokens.push(next_id);

            let piece = self
                .tokenizer
                .decode(&[next_id], true)
                .map_err(|e| anyhow!("tokenizer decode failed: {e}"))?;
            generated.push_str(&piece);

            if generated.contains(STOP_TEXT) {
                break;
            }
        }

        Ok(generated.trim_end_matches(STOP_TEXT).to_string())
    }
}

fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}
