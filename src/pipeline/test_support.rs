// In-process stand-ins for Ollama, pdf-extract and the completion endpoint

use anyhow::{Result, anyhow, bail};
use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use super::RagService;
use crate::config::{Config, OllamaConfig};
use crate::database::VectorStore;
use crate::embeddings::Embedder;
use crate::extract::{PageText, TextExtractor};
use crate::llm::{ChatMessage, CompletionModel};

pub(crate) const TEST_DIMENSION: usize = 64;

/// Normalized bag-of-words vectors: texts sharing words land close together
pub(crate) struct HashingEmbedder;

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; TEST_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % TEST_DIMENSION as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

pub(crate) struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("connection refused"))
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("connection refused"))
    }
}

/// Treats `%PDF` followed by form-feed separated UTF-8 pages as a document
pub(crate) struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>> {
        let Some(body) = bytes.strip_prefix(b"%PDF") else {
            bail!("File does not start with a PDF header");
        };

        Ok(String::from_utf8_lossy(body)
            .split('\x0c')
            .enumerate()
            .map(|(index, text)| PageText {
                page: index + 1,
                text: text.trim().to_string(),
            })
            .collect())
    }
}

/// Encode pages in the format [`PlainTextExtractor`] reads
pub(crate) fn fake_pdf(pages: &[&str]) -> Vec<u8> {
    format!("%PDF{}", pages.join("\x0c")).into_bytes()
}

/// Build a real PDF with one Helvetica text line per page
pub(crate) fn pdf_document(pages: &[&str]) -> Vec<u8> {
    let font_id = 3;
    let first_page_id = 4;
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", first_page_id + 2 * i))
        .collect();

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let escaped = text
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        let content = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", escaped);
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {} 0 R >> >> /Contents {} 0 R >>",
            font_id,
            first_page_id + 2 * i + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
    }

    let xref_offset = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        write!(xref, "{:010} 00000 n \n", offset).expect("write to string");
    }
    write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    )
    .expect("write to string");
    pdf.extend_from_slice(xref.as_bytes());
    pdf
}

/// Returns a fixed answer and keeps every prompt it was sent
pub(crate) struct RecordingCompletion {
    answer: String,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingCompletion {
    pub(crate) fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().expect("prompt lock").clone()
    }
}

impl CompletionModel for RecordingCompletion {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt lock")
            .push(messages.to_vec());
        Ok(self.answer.clone())
    }
}

pub(crate) struct FailingCompletion;

impl CompletionModel for FailingCompletion {
    fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(anyhow!("HTTP 503"))
    }
}

pub(crate) fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama = OllamaConfig {
        embedding_dimension: TEST_DIMENSION as u32,
        ..OllamaConfig::default()
    };
    config
}

pub(crate) async fn service_with(
    config: Config,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionModel>,
) -> RagService {
    service_with_extractor(config, embedder, Arc::new(PlainTextExtractor), completion).await
}

pub(crate) async fn service_with_extractor(
    config: Config,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    completion: Arc<dyn CompletionModel>,
) -> RagService {
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");
    RagService::from_parts(
        config,
        store,
        embedder,
        extractor,
        completion,
    )
}
