// engine.rs — Candle BERT embedding engine.
//
// Loads a sentence-transformers BERT model (all-MiniLM-L6-v2 by default) from
// safetensors. The engine is both the tokenizer and the encoder for
// `pooling::embed_sentences`, so it is loaded once and reused across batches.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::pooling::{BatchTokenizer, TokenEncoder, TokenizedBatch};
use crate::config;
use crate::download::{self, RemoteFile};

const WEIGHTS_FILE: &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";

/// The embedding engine holds the loaded model and tokenizer.
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    pad_id: u32,
    hidden_size: usize,
    device: Device,
}

/// Parse a device name: `cpu` or `cuda:N` (`cuda` alone means ordinal 0).
pub fn parse_device(spec: &str) -> anyhow::Result<Device> {
    let spec = spec.trim().to_ascii_lowercase();
    if spec == "cpu" {
        return Ok(Device::Cpu);
    }
    if let Some(rest) = spec.strip_prefix("cuda") {
        let ordinal = match rest.strip_prefix(':') {
            Some(n) => n.parse::<usize>().with_context(|| format!("invalid cuda ordinal in '{spec}'"))?,
            None if rest.is_empty() => 0,
            None => bail!("invalid device '{spec}' (expected cpu or cuda:N)"),
        };
        return Device::new_cuda(ordinal).with_context(|| format!("open device {spec}"));
    }
    bail!("invalid device '{spec}' (expected cpu or cuda:N)")
}

/// Download the default embedding model if not already cached. Returns the model directory.
pub fn ensure_model_files() -> anyhow::Result<PathBuf> {
    let dir = download::home_relative(config::embedding::MODEL_DIR_REL)?;
    let urls = model_urls(config::embedding::MODEL_BASE_URL);
    download::ensure_files(&dir, &model_files(&urls))
}

fn model_urls(base: &str) -> [String; 3] {
    [WEIGHTS_FILE, TOKENIZER_FILE, CONFIG_FILE].map(|name| format!("{base}/{name}"))
}

/// Every model file is pinned by hash.
fn model_files(urls: &[String; 3]) -> Vec<RemoteFile<'_>> {
    [
        (WEIGHTS_FILE, config::embedding::MODEL_SAFETENSORS_SHA256),
        (TOKENIZER_FILE, config::embedding::TOKENIZER_JSON_SHA256),
        (CONFIG_FILE, config::embedding::CONFIG_JSON_SHA256),
    ]
    .into_iter()
    .zip(urls)
    .map(|((file_name, sha256), url)| RemoteFile {
        file_name,
        url,
        sha256: Some(sha256),
        timeout_secs: config::download::TIMEOUT_SECS,
    })
    .collect()
}

impl EmbeddingEngine {
    /// Load the model from a local directory containing model.safetensors,
    /// tokenizer.json, and config.json.
    pub fn load(model_dir: &Path, device: Device) -> anyhow::Result<Self> {
        let config_path = model_dir.join(CONFIG_FILE);
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("read {}", config_path.display()))?;
        let bert_config: BertConfig = serde_json::from_str(&config_str)
            .with_context(|| format!("parse {}", config_path.display()))?;

        log::info!(
            "Loading embedding model: hidden_size={}, layers={}, heads={}, device={:?}",
            bert_config.hidden_size,
            bert_config.num_hidden_layers,
            bert_config.num_attention_heads,
            device,
        );

        let weights_path = model_dir.join(WEIGHTS_FILE);
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.clone()], DType::F32, &device)
                .with_context(|| format!("load weights from {}", weights_path.display()))?
        };

        let model = BertModel::load(vb, &bert_config).context("load BERT model")?;

        let tokenizer_path = model_dir.join(TOKENIZER_FILE);
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer {}: {e}", tokenizer_path.display()))?;

        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id(config::embedding::PAD_TOKEN))
            .unwrap_or(0);

        if bert_config.hidden_size != config::embedding::EMBEDDING_DIMS {
            log::warn!(
                "Model at {} has {} dims ({} has {})",
                model_dir.display(),
                bert_config.hidden_size,
                config::embedding::EMBEDDING_MODEL_NAME,
                config::embedding::EMBEDDING_DIMS,
            );
        }
        log::info!("Embedding model loaded successfully (dims={})", bert_config.hidden_size);

        Ok(Self {
            model,
            tokenizer,
            pad_id,
            hidden_size: bert_config.hidden_size,
            device,
        })
    }
}

impl BatchTokenizer for EmbeddingEngine {
    fn tokenize(&self, texts: &[&str], max_seq_len: usize) -> anyhow::Result<TokenizedBatch> {
        tokenize_batch(&self.tokenizer, self.pad_id, texts, max_seq_len, &self.device)
    }
}

/// Tokenize through a copy of `tokenizer` configured for this call: truncation
/// to `max_seq_len` counting special tokens (so `[SEP]` survives), then right
/// padding to the longest row. Settings carried in tokenizer.json are replaced.
fn tokenize_batch(
    tokenizer: &Tokenizer,
    pad_id: u32,
    texts: &[&str],
    max_seq_len: usize,
    device: &Device,
) -> anyhow::Result<TokenizedBatch> {
    let mut tokenizer = tokenizer.clone();
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_seq_len,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("configure truncation: {e}"))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        pad_id,
        pad_token: config::embedding::PAD_TOKEN.to_string(),
        ..Default::default()
    }));

    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

    let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
    let mut ids = Vec::with_capacity(encodings.len() * seq_len);
    let mut mask = Vec::with_capacity(encodings.len() * seq_len);
    for enc in &encodings {
        ids.extend(enc.get_ids().iter().map(|&id| id as i64));
        mask.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
    }

    let shape = (encodings.len(), seq_len);
    Ok(TokenizedBatch {
        input_ids: Tensor::from_vec(ids, shape, device)?,
        attention_mask: Tensor::from_vec(mask, shape, device)?,
    })
}

impl TokenEncoder for EmbeddingEngine {
    fn forward(&self, batch: &TokenizedBatch) -> anyhow::Result<Tensor> {
        let token_type_ids = batch.input_ids.zeros_like()?;
        // [batch, seq_len, hidden_size]
        let hidden = self
            .model
            .forward(&batch.input_ids, &token_type_ids, Some(&batch.attention_mask))
            .context("BERT forward pass")?;
        Ok(hidden)
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}
