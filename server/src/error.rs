//! HTTP mapping of search and provider failures. Bodies are `{"error": "message"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bookrank::{Error, FetchError};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// Malformed query or pattern (400).
    BadRequest(String),
    /// Missing or wrong admin token (401).
    Unauthorized(String),
    /// Upstream reported the book does not exist (404).
    NotFound(String),
    /// An ingestion is already running (409).
    Conflict(String),
    /// Upstream provider failed or timed out (502).
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::NotFound(book_id) => ApiError::NotFound(format!("book {book_id} not found")),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidQuery(msg) => ApiError::BadRequest(msg),
            Error::Fetch(fetch) => fetch.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
