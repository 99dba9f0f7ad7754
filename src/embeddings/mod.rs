// embeddings/ — Local sentence embedding using candle (pure Rust).
//
// Provides:
// - Batched masked mean pooling over pluggable tokenizer/encoder capabilities
// - BERT inference backend with lazy model download

pub mod engine;
pub mod pooling;
