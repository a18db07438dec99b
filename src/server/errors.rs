use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

use crate::ChatDocError;

/// Error returned by every handler, rendered as `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    #[inline]
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    #[inline]
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<ChatDocError> for ApiError {
    #[inline]
    fn from(err: ChatDocError) -> Self {
        let status = match &err {
            ChatDocError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatDocError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ChatDocError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ChatDocError::Config(_)
            | ChatDocError::Database(_)
            | ChatDocError::Io(_)
            | ChatDocError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", err);
        } else {
            warn!("Request rejected: {}", err);
        }

        Self::new(status, err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    #[inline]
    fn from(err: MultipartError) -> Self {
        warn!("Malformed multipart request: {}", err);
        Self::new(err.status(), err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        warn!("Malformed JSON request: {}", rejection);
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
