use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::errors::ApiError;
use crate::pipeline::{IndexStatus, IngestReport, QueryAnswer, RagService, validate_filename};

/// Multipart field carrying the uploaded document
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

/// `POST /upload/`
#[inline]
pub async fn upload(
    State(service): State<Arc<RagService>>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        // Reject bad names before buffering the body
        let filename = validate_filename(field.file_name().unwrap_or_default())?;
        let bytes = field.bytes().await?;

        let report = service.ingest(&filename, bytes.to_vec()).await?;
        return Ok(Json(report));
    }

    Err(ApiError::bad_request(format!(
        "Missing multipart field '{}'.",
        UPLOAD_FIELD
    )))
}

/// `POST /query/`
#[inline]
pub async fn query(
    State(service): State<Arc<RagService>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryAnswer>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(service.query(&request.question).await?))
}

/// `GET /status/`
#[inline]
pub async fn status(
    State(service): State<Arc<RagService>>,
) -> Result<Json<IndexStatus>, ApiError> {
    Ok(Json(service.status().await?))
}
