// pooling.rs — Batched sentence embedding with attention-mask-aware mean pooling.
//
// The batch loop only talks to two capabilities (tokenizer and encoder), so any
// backend that can produce [batch, seq, hidden] states plugs in here.

use anyhow::bail;
use candle_core::{DType, Tensor};

use crate::config;

/// Padded, truncated token ids plus the attention mask of the same shape.
/// Both tensors are `[batch, seq_len]`; the mask is 1 for real tokens, 0 for padding.
pub struct TokenizedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Turns a slice of texts into one padded batch.
pub trait BatchTokenizer {
    fn tokenize(&self, texts: &[&str], max_seq_len: usize) -> anyhow::Result<TokenizedBatch>;
}

/// Runs the encoder forward pass. Must not mutate model state.
pub trait TokenEncoder {
    /// Per-token hidden states, `[batch, seq_len, hidden_size]`.
    fn forward(&self, batch: &TokenizedBatch) -> anyhow::Result<Tensor>;

    fn hidden_size(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct EmbedOptions {
    pub batch_size: usize,
    pub max_seq_len: usize,
    /// L2-normalize each pooled vector.
    pub normalize: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            batch_size: config::embedding::DEFAULT_BATCH_SIZE,
            max_seq_len: config::embedding::DEFAULT_MAX_SEQ_LEN,
            normalize: false,
        }
    }
}

/// Row-major `(rows, dims)` matrix of sentence embeddings, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dims: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(dims: usize) -> Self {
        Self { dims, data: Vec::new() }
    }

    pub fn rows(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dims.max(1))
    }

    fn push_row(&mut self, row: &[f32]) -> anyhow::Result<()> {
        if row.len() != self.dims {
            bail!("unexpected embedding dims: got {}, expected {}", row.len(), self.dims);
        }
        self.data.extend_from_slice(row);
        Ok(())
    }
}

/// Embed `sentences` batch by batch and stitch the pooled vectors back together
/// in input order. Any failing batch aborts the whole call.
pub fn embed_sentences<S, T, M>(
    sentences: &[S],
    tokenizer: &T,
    model: &M,
    options: &EmbedOptions,
) -> anyhow::Result<EmbeddingMatrix>
where
    S: AsRef<str>,
    T: BatchTokenizer + ?Sized,
    M: TokenEncoder + ?Sized,
{
    if options.batch_size == 0 {
        bail!("batch size must be at least 1");
    }
    if options.max_seq_len == 0 {
        bail!("max sequence length must be at least 1");
    }

    let mut matrix = EmbeddingMatrix::new(model.hidden_size());
    let total_batches = sentences.len().div_ceil(options.batch_size);

    for (batch_idx, batch) in sentences.chunks(options.batch_size).enumerate() {
        let texts: Vec<&str> = batch.iter().map(|s| s.as_ref()).collect();
        log::debug!("Embedding batch {}/{} ({} sentences)", batch_idx + 1, total_batches, texts.len());

        let encoded = tokenizer.tokenize(&texts, options.max_seq_len)?;
        let hidden = model.forward(&encoded)?;

        let mut pooled = mean_pooling(&hidden, &encoded.attention_mask)?;
        if options.normalize {
            pooled = l2_normalize(&pooled)?;
        }

        let rows: Vec<Vec<f32>> = pooled.to_dtype(DType::F32)?.to_vec2()?;
        if rows.len() != texts.len() {
            bail!("encoder returned {} rows for a batch of {}", rows.len(), texts.len());
        }
        for row in &rows {
            matrix.push_row(row)?;
        }
    }

    log::info!(
        "Embedded {} sentences in {} batches (dims={})",
        matrix.rows(),
        total_batches,
        matrix.dims()
    );
    Ok(matrix)
}

/// Attention-mask-aware mean pooling.
///
/// For each position, multiply the hidden state by the attention mask (0 or 1),
/// then sum across positions and divide by the number of non-masked positions.
///
/// input_embeds: [batch, seq_len, hidden_size]
/// attention_mask: [batch, seq_len] (1 for real tokens, 0 for padding)
/// output: [batch, hidden_size]
pub fn mean_pooling(input_embeds: &Tensor, attention_mask: &Tensor) -> anyhow::Result<Tensor> {
    let input_embeds = input_embeds.to_dtype(DType::F32)?;

    // [batch, seq_len] → [batch, seq_len, hidden_size]
    let mask_expanded = attention_mask
        .to_dtype(DType::F32)?
        .unsqueeze(2)?
        .broadcast_as(input_embeds.shape())?;

    let sum_embeddings = (&input_embeds * &mask_expanded)?.sum(1)?;

    // An all-padding row sums to 0; the clamp turns it into a zero vector instead of NaN.
    let sum_mask = mask_expanded
        .sum(1)?
        .clamp(config::embedding::POOLING_MASK_EPS, f64::MAX)?;

    Ok((sum_embeddings / sum_mask)?)
}

/// L2 normalize a tensor along the last dimension.
pub fn l2_normalize(tensor: &Tensor) -> anyhow::Result<Tensor> {
    let norm = tensor.sqr()?.sum_keepdim(1)?.sqrt()?;
    let norm = norm.clamp(config::embedding::L2_NORM_EPS, f64::MAX)?;
    Ok(tensor.broadcast_div(&norm)?)
}
