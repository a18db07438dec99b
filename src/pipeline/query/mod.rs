
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{RagService, run_blocking};
use crate::database::SearchResult;
use crate::llm::ChatMessage;
use crate::{ChatDocError, Result};

pub const NOT_INITIALIZED_MESSAGE: &str =
    "Vector store is not initialized. Please upload a document.";

pub const SYSTEM_PROMPT: &str = "You are an AI assistant. Answer based on the provided context only, do not use other informations. If you cannot answer, say 'I need more context.'";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    /// Source filename of each chunk that contributed context, in rank order
    pub sources: Vec<String>,
}

impl QueryAnswer {
    #[inline]
    pub fn not_initialized() -> Self {
        Self {
            answer: NOT_INITIALIZED_MESSAGE.to_string(),
            sources: Vec::new(),
        }
    }
}

/// Join retrieved chunks in rank order with `\n`, capped at `max_chars`
/// characters including separators.
///
/// The first chunk that does not fit whole is cut to the remaining budget and
/// ends the context. Returns the context and the sources of every chunk that
/// contributed text.
#[inline]
pub fn build_context(results: &[SearchResult], max_chars: usize) -> (String, Vec<String>) {
    let mut context = String::new();
    let mut used = 0;
    let mut sources = Vec::new();

    for result in results {
        let content = &result.metadata.content;
        if content.is_empty() {
            continue;
        }

        let separator = usize::from(!sources.is_empty());
        let remaining = max_chars.saturating_sub(used + separator);
        if remaining == 0 {
            break;
        }

        if separator == 1 {
            context.push('\n');
        }

        let length = content.chars().count();
        sources.push(result.metadata.source.clone());

        if length <= remaining {
            context.push_str(content);
            used += separator + length;
        } else {
            context.extend(content.chars().take(remaining));
            break;
        }
    }

    (context, sources)
}

/// System instruction plus the question and its context
#[inline]
pub fn build_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Question: {}\nContext: {}", question, context)),
    ]
}

impl RagService {
    /// Answer `question` from the most similar indexed chunks.
    ///
    /// An empty index is not an error: the answer is [`NOT_INITIALIZED_MESSAGE`].
    #[inline]
    pub async fn query(&self, question: &str) -> Result<QueryAnswer> {
        if question.trim().is_empty() {
            return Err(ChatDocError::Validation(
                "Question must not be empty.".to_string(),
            ));
        }

        let is_empty = {
            let store = self.store.read().await;
            store.is_empty().await?
        };
        if is_empty {
            debug!("Query received before any document was indexed");
            return Ok(QueryAnswer::not_initialized());
        }

        let query_vector = self.embed_one(question.to_string()).await?;

        let results = {
            let store = self.store.read().await;
            store
                .search_similar(&query_vector, self.config.retrieval.top_k)
                .await?
        };
        if results.is_empty() {
            return Ok(QueryAnswer::not_initialized());
        }

        let (context, sources) = build_context(&results, self.config.retrieval.max_context_chars);
        debug!(
            "Built context of {} characters from {} chunks",
            context.chars().count(),
            sources.len()
        );

        let messages = build_messages(question, &context);
        let completion = Arc::clone(&self.completion);
        let answer = run_blocking(move || completion.complete(&messages))
            .await?
            .map_err(|e| ChatDocError::Upstream(format!("Completion request failed: {:#}", e)))?;

        info!("Answered question using {} chunks", sources.len());
        Ok(QueryAnswer { answer, sources })
    }
}
