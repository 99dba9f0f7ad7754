// llm/ — Text generation backends used by the summarizer.
//
// - gguf: quantized Mistral-instruct weights run in-process with candle
// - http: a llama.cpp-compatible completion server

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config;

pub mod gguf;
pub mod http;

pub use gguf::GgufGenerator;
pub use http::HttpGenerator;

/// Sampling and context settings for one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub context_length: usize,
    pub top_k: usize,
    pub top_p: f64,
    pub repetition_penalty: f32,
    pub last_n_tokens: usize,
    pub seed: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: config::llm::DEFAULT_MAX_NEW_TOKENS,
            temperature: config::llm::DEFAULT_TEMPERATURE,
            context_length: config::llm::DEFAULT_CONTEXT_LENGTH,
            top_k: config::llm::DEFAULT_TOP_K,
            top_p: config::llm::DEFAULT_TOP_P,
            repetition_penalty: config::llm::DEFAULT_REPETITION_PENALTY,
            last_n_tokens: config::llm::DEFAULT_LAST_N_TOKENS,
            seed: config::llm::DEFAULT_SEED,
        }
    }
}

impl GenerationConfig {
    /// Load overrides from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read generation config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse generation config {}", path.display()))
    }

    /// Prompt tokens that fit alongside `max_new_tokens` in the context window.
    pub fn prompt_budget(&self) -> usize {
        self.context_length.saturating_sub(self.max_new_tokens).max(1)
    }
}

/// Trait implemented by text generation backends.
pub trait TextGenerator {
    /// Complete `prompt`, returning only the newly generated text.
    fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> anyhow::Result<String>;

    /// Number of model tokens in `text`, used to size reduce prompts.
    fn count_tokens(&self, text: &str) -> anyhow::Result<usize>;
}
