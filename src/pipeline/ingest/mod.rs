
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{RagService, run_blocking};
use crate::database::EmbeddingRecord;
use crate::embeddings::{Chunk, split_pages};
use crate::extract::has_text;
use crate::{ChatDocError, Result};

pub const UPLOAD_SUCCESS_MESSAGE: &str = "PDF document uploaded and processed successfully.";
pub const ONLY_PDF_MESSAGE: &str = "Only PDF files are supported.";

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub filename: String,
    pub message: String,
    /// Number of entries appended to the index
    pub chunks: usize,
}

/// Reduce a client-supplied filename to a safe, bare `.pdf` name.
///
/// Only the final path component survives, with either `/` or `\` treated as
/// a separator. Empty names, `.`, `..` and names containing control
/// characters are rejected, as is anything without a `.pdf` extension.
#[inline]
pub fn validate_filename(raw: &str) -> Result<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();

    if name.is_empty() || name == "." || name == ".." || name.chars().any(char::is_control) {
        return Err(ChatDocError::Validation(format!(
            "Invalid filename: {:?}",
            raw
        )));
    }

    let is_pdf = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(ChatDocError::Validation(ONLY_PDF_MESSAGE.to_string()));
    }

    Ok(name.to_string())
}

impl RagService {
    /// Store, parse, split and embed one uploaded PDF, then append its chunks
    /// to the index.
    #[inline]
    pub async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        let filename = validate_filename(filename)?;
        info!("Ingesting {} ({} bytes)", filename, bytes.len());

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let upload_path = self.upload_dir.join(&filename);
        tokio::fs::write(&upload_path, &bytes).await?;
        debug!("Saved upload to {:?}", upload_path);

        let extractor = Arc::clone(&self.extractor);
        let pages = run_blocking(move || extractor.extract_pages(&bytes))
            .await?
            .map_err(|e| ChatDocError::Extraction(format!("{:#}", e)))?;

        if !has_text(&pages) {
            return Err(ChatDocError::Extraction(format!(
                "No text could be extracted from {}",
                filename
            )));
        }

        let chunks: Vec<Chunk> = split_pages(&pages, &filename, &self.config.chunking).collect();
        debug!(
            "Split {} pages of {} into {} chunks",
            pages.len(),
            filename,
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let vectors = run_blocking(move || embedder.embed_batch(&texts))
            .await?
            .map_err(|e| ChatDocError::Upstream(format!("Embedding request failed: {:#}", e)))?;

        if vectors.len() != chunks.len() {
            return Err(ChatDocError::Upstream(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::from_chunk(chunk, vector))
            .collect();

        let written = self.store.write().await.merge(records).await?;
        info!("Indexed {} chunks from {}", written, filename);

        Ok(IngestReport {
            filename,
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            chunks: written,
        })
    }
}
