// LanceDB vector database module
// Handles vector storage and similarity search for embeddings


pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embeddings::Chunk;

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique identifier for this embedding
    pub id: String,
    /// The vector embedding
    pub vector: Vec<f32>,
    /// Metadata about the chunk this embedding represents
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Filename of the uploaded document
    pub source: String,
    /// 1-based page the chunk was cut from
    pub page: u32,
    /// Index of this chunk within its document
    pub chunk_index: u32,
    /// The actual text content of the chunk
    pub content: String,
    /// Timestamp when this embedding was created
    pub created_at: String,
}

impl EmbeddingRecord {
    /// Pair a chunk with its vector under a fresh id
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            metadata: ChunkMetadata {
                source: chunk.source.clone(),
                page: u32::try_from(chunk.page).unwrap_or(u32::MAX),
                chunk_index: u32::try_from(chunk.chunk_index).unwrap_or(u32::MAX),
                content: chunk.text.clone(),
                created_at: Utc::now().to_rfc3339(),
            },
        }
    }
}
