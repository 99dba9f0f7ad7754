// gguf.rs — In-process text generation from quantized GGUF weights.
//
// Runs Mistral-7B-Instruct (Q6_K) through candle's quantized llama implementation.
// The model and tokenizer are loaded once and reused for every map/reduce call;
// each call restarts at position 0, which discards the previous KV cache.

use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use super::{GenerationConfig, TextGenerator};
use crate::config;
use crate::download::{self, RemoteFile};

const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct GgufGenerator {
    model: ModelWeights,
    tokenizer: Tokenizer,
    eos_token: Option<u32>,
    device: Device,
}

/// Download the default GGUF weights and tokenizer if not already cached.
/// Returns `(weights_path, tokenizer_path)`.
pub fn ensure_model_files() -> anyhow::Result<(PathBuf, PathBuf)> {
    let dir = download::home_relative(config::llm::MODEL_DIR_REL)?;
    download::ensure_files(
        &dir,
        &[
            RemoteFile {
                file_name: config::llm::GGUF_FILE_NAME,
                url: config::llm::GGUF_URL,
                sha256: None,
                timeout_secs: config::download::LARGE_FILE_TIMEOUT_SECS,
            },
            RemoteFile {
                file_name: TOKENIZER_FILE,
                url: config::llm::TOKENIZER_URL,
                sha256: None,
                timeout_secs: config::download::TIMEOUT_SECS,
            },
        ],
    )?;
    Ok((dir.join(config::llm::GGUF_FILE_NAME), dir.join(TOKENIZER_FILE)))
}

impl GgufGenerator {
    pub fn load(weights_path: &Path, tokenizer_path: &Path, device: Device) -> anyhow::Result<Self> {
        log::info!(
            "Loading {} from {} (device={:?})",
            config::llm::GGUF_MODEL_NAME,
            weights_path.display(),
            device
        );

        let mut file = std::fs::File::open(weights_path)
            .with_context(|| format!("open {}", weights_path.display()))?;
        let content = gguf_file::Content::read(&mut file)
            .with_context(|| format!("read GGUF header {}", weights_path.display()))?;
        log::info!(
            "GGUF: {} tensors, {} metadata entries",
            content.tensor_infos.len(),
            content.metadata.len()
        );
        let model = ModelWeights::from_gguf(content, &mut file, &device).context("load quantized model")?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer {}: {e}", tokenizer_path.display()))?;
        let eos_token = tokenizer.token_to_id(config::llm::EOS_TOKEN);
        if eos_token.is_none() {
            log::warn!("Tokenizer has no {} token; generation stops at max_new_tokens", config::llm::EOS_TOKEN);
        }

        log::info!("Text generation model loaded");
        Ok(Self {
            model,
            tokenizer,
            eos_token,
            device,
        })
    }

    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        // Prompts carry their own <s> marker, so no extra special tokens.
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("tokenize prompt: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn next_logits(&mut self, tokens: &[u32], index_pos: usize) -> anyhow::Result<Tensor> {
        let input = Tensor::new(tokens, &self.device)?.unsqueeze(0)?;
        let logits = self.model.forward(&input, index_pos)?;
        Ok(logits.squeeze(0)?)
    }
}

impl TextGenerator for GgufGenerator {
    fn generate(&mut self, prompt: &str, cfg: &GenerationConfig) -> anyhow::Result<String> {
        let all_tokens = self.encode(prompt)?;
        let prompt_tokens = truncate_prompt(&all_tokens, cfg.prompt_budget());
        if prompt_tokens.len() < all_tokens.len() {
            log::warn!(
                "Prompt has {} tokens, keeping the last {} (context_length={}, max_new_tokens={})",
                all_tokens.len(),
                prompt_tokens.len(),
                cfg.context_length,
                cfg.max_new_tokens
            );
        }

        let mut logits_processor = LogitsProcessor::from_sampling(cfg.seed, sampling_for(cfg));
        let mut context: Vec<u32> = prompt_tokens.to_vec();
        let mut generated: Vec<u32> = Vec::with_capacity(cfg.max_new_tokens);

        let mut logits = self.next_logits(prompt_tokens, 0)?;
        for _ in 0..cfg.max_new_tokens {
            let logits_adj = if cfg.repetition_penalty == 1.0 {
                logits.clone()
            } else {
                let start_at = context.len().saturating_sub(cfg.last_n_tokens);
                candle_transformers::utils::apply_repeat_penalty(&logits, cfg.repetition_penalty, &context[start_at..])?
            };
            let next = logits_processor.sample(&logits_adj)?;
            if Some(next) == self.eos_token {
                break;
            }
            generated.push(next);
            context.push(next);
            if generated.len() == cfg.max_new_tokens {
                break;
            }
            logits = self.next_logits(&[next], context.len() - 1)?;
        }

        log::debug!("Generated {} tokens from a {}-token prompt", generated.len(), prompt_tokens.len());
        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| anyhow::anyhow!("decode output: {e}"))?;
        Ok(text.trim().to_string())
    }

    fn count_tokens(&self, text: &str) -> anyhow::Result<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// Keep the tail of an over-long prompt; the instruction closes the prompt.
fn truncate_prompt(tokens: &[u32], budget: usize) -> &[u32] {
    &tokens[tokens.len().saturating_sub(budget)..]
}

fn sampling_for(cfg: &GenerationConfig) -> Sampling {
    if cfg.temperature <= 0.0 {
        Sampling::ArgMax
    } else {
        Sampling::TopKThenTopP {
            k: cfg.top_k,
            p: cfg.top_p,
            temperature: cfg.temperature,
        }
    }
}
