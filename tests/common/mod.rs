// Shared fixtures: wiremock stand-ins for Ollama and the completion API

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chatdoc::config::{Config, LlmConfig, OllamaConfig};
use chatdoc::database::VectorStore;
use chatdoc::embeddings::OllamaClient;
use chatdoc::extract::{PageText, TextExtractor};
use chatdoc::llm::ChatCompletionClient;
use chatdoc::pipeline::RagService;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const DIMENSION: usize = 32;

/// Normalized bag-of-words vector, so texts sharing words are close
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Reads `%PDF` followed by form-feed separated UTF-8 pages
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> anyhow::Result<Vec<PageText>> {
        let body = bytes
            .strip_prefix(b"%PDF")
            .ok_or_else(|| anyhow::anyhow!("File does not start with a PDF header"))?;

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

pub fn fake_pdf(pages: &[&str]) -> Vec<u8> {
    format!("%PDF{}", pages.join("\x0c")).into_bytes()
}

/// Ollama serving `/api/embed` with bag-of-words vectors
pub async fn mock_ollama() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("embed request is JSON");
            let embeddings: Vec<Vec<f32>> = body["input"]
                .as_array()
                .expect("input is an array")
                .iter()
                .map(|text| bag_of_words(text.as_str().unwrap_or_default()))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
        })
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "models": [{ "name": "test-embed" }] })),
        )
        .mount(&server)
        .await;

    server
}

/// Completion endpoint that always answers `answer`
pub async fn mock_completions(answer: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": answer } }]
        })))
        .mount(&server)
        .await;

    server
}

pub fn config_for(temp_dir: &TempDir, ollama: &MockServer, llm: &MockServer) -> Config {
    let address = ollama.address();
    let mut config = Config::with_base_dir(temp_dir.path());
    config.ollama = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "test-embed".to_string(),
        embedding_dimension: DIMENSION as u32,
        ..OllamaConfig::default()
    };
    config.llm = LlmConfig {
        base_url: format!("{}/v1", llm.uri()),
        model: "test-llm".to_string(),
        api_key: Some("test-key".to_string()),
        ..LlmConfig::default()
    };
    config
}

/// Production clients pointed at the mocks, with the plain-text extractor
pub async fn service(config: Config) -> Arc<RagService> {
    let embedder = OllamaClient::new(&config.ollama)
        .expect("embedder builds")
        .with_retry_attempts(1);
    let completion = ChatCompletionClient::new(&config.llm).expect("completion client builds");
    let store = VectorStore::open(&config)
        .await
        .expect("should open vector store");

    Arc::new(RagService::from_parts(
        config,
        store,
        Arc::new(embedder),
        Arc::new(PlainTextExtractor),
        Arc::new(completion),
    ))
}

pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}
