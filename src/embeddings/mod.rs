// Embeddings module
// Ollama integration and document chunking

pub mod chunking;
pub mod ollama;

use anyhow::Result;

pub use chunking::{Chunk, ChunkingConfig, SplitChunks, split_pages};
pub use ollama::OllamaClient;

/// Maps text to fixed-length vectors. Implementations must return vectors of
/// the same dimension for every input.
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
