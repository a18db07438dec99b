use super::*;
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::extract::PdfExtractor;
use crate::pipeline::test_support::{
    FailingEmbedder, HashingEmbedder, RecordingCompletion, TEST_DIMENSION, fake_pdf,
    pdf_document, service_with, service_with_extractor, test_config,
};
use crate::pipeline::{NOT_INITIALIZED_MESSAGE, ONLY_PDF_MESSAGE, UPLOAD_SUCCESS_MESSAGE};
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "chatdoc-test-boundary";

async fn app_with(config: Config, embedder: Arc<dyn Embedder>) -> Router {
    let service = service_with(config, embedder, RecordingCompletion::new("Test answer")).await;
    router(Arc::new(service))
}

async fn app(temp_dir: &TempDir) -> Router {
    app_with(test_config(temp_dir), Arc::new(HashingEmbedder)).await
}

fn upload_request(field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("valid request")
}

fn query_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/query/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

fn status_request() -> Request<Body> {
    Request::builder()
        .uri("/status/")
        .body(Body::empty())
        .expect("valid request")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn fresh_status_is_empty() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let (status, body) = send(&app, status_request()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "entries": 0, "dimension": TEST_DIMENSION, "sources": [] })
    );
}

#[tokio::test]
async fn query_before_upload_is_not_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let (status, body) = send(&app, query_request(&json!({ "question": "Hi?" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "answer": NOT_INITIALIZED_MESSAGE, "sources": [] })
    );
}

#[tokio::test]
async fn upload_then_query() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let pdf = fake_pdf(&["The borrow checker enforces aliasing rules."]);
    let (status, body) = send(&app, upload_request("file", "rust.pdf", &pdf)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "filename": "rust.pdf", "message": UPLOAD_SUCCESS_MESSAGE, "chunks": 1 })
    );

    let (status, body) = send(
        &app,
        query_request(&json!({ "question": "What does the borrow checker enforce?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Test answer");
    assert_eq!(body["sources"], json!(["rust.pdf"]));

    let (_, body) = send(&app, status_request()).await;
    assert_eq!(body["entries"], 1);
    assert_eq!(body["sources"], json!(["rust.pdf"]));
}

#[tokio::test]
async fn real_pdf_upload_is_extracted_and_answerable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let completion = RecordingCompletion::new("A fox.");
    let service = service_with_extractor(
        test_config(&temp_dir),
        Arc::new(HashingEmbedder),
        Arc::new(PdfExtractor),
        Arc::clone(&completion),
    )
    .await;
    let app = router(Arc::new(service));

    let pdf = pdf_document(&["The quick brown fox jumps over the lazy dog"]);
    let (status, body) = send(&app, upload_request("file", "fox.pdf", &pdf)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks"], 1);

    let (status, body) = send(
        &app,
        query_request(&json!({ "question": "What does the quick brown fox do?" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"], json!(["fox.pdf"]));
    let prompts = completion.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(
        prompts[0][1]
            .content
            .contains("The quick brown fox jumps over the lazy dog")
    );
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let (status, body) = send(&app, upload_request("file", "notes.txt", b"hello")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "detail": ONLY_PDF_MESSAGE }));
    assert!(!temp_dir.path().join("uploads").exists());
}

#[tokio::test]
async fn traversal_filename_is_flattened() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let pdf = fake_pdf(&["Contained text"]);
    let (status, body) = send(&app, upload_request("file", "../../escape.pdf", &pdf)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["filename"], "escape.pdf");
    assert!(temp_dir.path().join("uploads").join("escape.pdf").exists());
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let (status, body) = send(&app, upload_request("document", "doc.pdf", b"%PDF x")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().is_some_and(|d| d.contains("file")));
}

#[tokio::test]
async fn unreadable_pdf_is_unprocessable() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let (status, body) = send(&app, upload_request("file", "broken.pdf", b"not a pdf")).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn embedding_outage_is_bad_gateway() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app_with(test_config(&temp_dir), Arc::new(FailingEmbedder)).await;

    let pdf = fake_pdf(&["Some text"]);
    let (status, body) = send(&app, upload_request("file", "doc.pdf", &pdf)).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = test_config(&temp_dir);
    config.server.max_upload_bytes = 1024;
    let app = app_with(config, Arc::new(HashingEmbedder)).await;

    let pdf = fake_pdf(&["x".repeat(8192).as_str()]);
    let (status, _) = send(&app, upload_request("file", "big.pdf", &pdf)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_query_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let (status, body) = send(&app, query_request(&json!({ "q": "wrong field" }))).await;
    assert!(status.is_client_error());
    assert!(body["detail"].is_string());

    let (status, body) = send(&app, query_request(&json!({ "question": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn routes_accept_paths_without_trailing_slash() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let request = Request::builder()
        .uri("/status")
        .body(Body::empty())
        .expect("valid request");
    let (status, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let app = app(&temp_dir).await;

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/query/")
        .header(header::ORIGIN, "http://localhost:8501")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .expect("valid request");
    let response = app.oneshot(request).await.expect("infallible");

    assert!(response.status().is_success());
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    );
}

#[test]
fn error_kinds_map_to_status_codes() {
    use crate::ChatDocError;

    let cases = [
        (ChatDocError::Validation("bad".into()), StatusCode::BAD_REQUEST),
        (
            ChatDocError::Extraction("bad".into()),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (ChatDocError::Upstream("down".into()), StatusCode::BAD_GATEWAY),
        (
            ChatDocError::Database("broken".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (
            ChatDocError::Config("missing".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, expected) in cases {
        assert_eq!(ApiError::from(err).status(), expected);
    }

    let err = ApiError::from(ChatDocError::Validation(ONLY_PDF_MESSAGE.to_string()));
    assert_eq!(err.detail(), ONLY_PDF_MESSAGE);
}
