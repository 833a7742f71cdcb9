//! The error category surface shared by the HTTP and SSE paths.
//!
//! Internal plumbing (indexing, chunking, file I/O) keeps using
//! `anyhow::Result`, matching teacher's idiom; `AppError` exists only at the
//! boundary where an outcome is reported to a caller outside the crate — an
//! HTTP response or an SSE `error` event.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("vault path does not exist or is not a directory")]
    VaultMissing,

    #[error("embedding call failed after retries: {0}")]
    EmbedderUnavailable(String),

    #[error("language model endpoint unreachable: {0}")]
    LlmUnavailable(String),

    #[error("generation stream terminated abnormally: {0}")]
    GenerationStreamBroken(String),

    #[error("failed to index file {path}: {reason}")]
    IndexingFileFailed { path: String, reason: String },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("client cancelled the request")]
    ClientCancelled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// The error category name surfaced to clients.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::VaultMissing => "vault_missing",
            AppError::EmbedderUnavailable(_) => "embedder_unavailable",
            AppError::LlmUnavailable(_) => "llm_unavailable",
            AppError::GenerationStreamBroken(_) => "generation_stream_broken",
            AppError::IndexingFileFailed { .. } => "indexing_file_failed",
            AppError::MalformedRequest(_) => "malformed_request",
            AppError::ClientCancelled => "client_cancelled",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::VaultMissing => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::EmbedderUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LlmUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GenerationStreamBroken(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::IndexingFileFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ClientCancelled => StatusCode::OK,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `{message, category}` payload an SSE `error` event carries.
    pub fn sse_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.to_string(),
            "category": self.category(),
        })
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    category: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                category: self.category().to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
