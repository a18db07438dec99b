//! Ingestion and question answering over the shared vector index

pub mod ingest;
pub mod query;

#[cfg(test)]
pub(crate) mod test_support;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::database::VectorStore;
use crate::embeddings::{Embedder, OllamaClient};
use crate::extract::{PdfExtractor, TextExtractor};
use crate::llm::{ChatCompletionClient, CompletionModel};
use crate::{ChatDocError, Result};

pub use ingest::{IngestReport, ONLY_PDF_MESSAGE, UPLOAD_SUCCESS_MESSAGE, validate_filename};
pub use query::{NOT_INITIALIZED_MESSAGE, QueryAnswer, SYSTEM_PROMPT, build_context, build_messages};

/// Index statistics reported by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub entries: u64,
    pub dimension: usize,
    pub sources: Vec<String>,
}

/// Owns the vector index and the collaborators both pipelines need.
///
/// Queries take the index read lock, uploads take the write lock only for the
/// append, so concurrent uploads are applied one after another and a query
/// never observes a half-written batch.
pub struct RagService {
    config: Config,
    store: RwLock<VectorStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    completion: Arc<dyn CompletionModel>,
    upload_dir: PathBuf,
}

impl RagService {
    /// Build the production service: Ollama embeddings, PDF extraction, the
    /// configured chat completion endpoint and the on-disk index.
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| ChatDocError::Config(format!("{:#}", e)))?;
        let completion = ChatCompletionClient::new(&config.llm)
            .map_err(|e| ChatDocError::Config(format!("{:#}", e)))?;

        if config.llm.api_key.is_none() {
            info!("No completion API key set, requests will be sent unauthenticated");
        }

        let store = VectorStore::open(&config).await?;

        Ok(Self::from_parts(
            config,
            store,
            Arc::new(embedder),
            Arc::new(PdfExtractor),
            Arc::new(completion),
        ))
    }

    #[inline]
    pub fn from_parts(
        config: Config,
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
        completion: Arc<dyn CompletionModel>,
    ) -> Self {
        let upload_dir = config.upload_dir_path();
        Self {
            config,
            store: RwLock::new(store),
            embedder,
            extractor,
            completion,
            upload_dir,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory raw uploads are written to
    #[inline]
    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    #[inline]
    pub async fn status(&self) -> Result<IndexStatus> {
        let store = self.store.read().await;
        Ok(IndexStatus {
            entries: store.count_embeddings().await?,
            dimension: store.dimension(),
            sources: store.list_sources().await?,
        })
    }

    /// Embed one text on the blocking pool
    async fn embed_one(&self, text: String) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        run_blocking(move || embedder.embed(&text))
            .await?
            .map_err(|e| ChatDocError::Upstream(format!("Embedding request failed: {:#}", e)))
    }
}

/// Run `task` on Tokio's blocking pool, surfacing a panicked or cancelled task as an error
async fn run_blocking<T, F>(task: F) -> Result<anyhow::Result<T>>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ChatDocError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))
}
