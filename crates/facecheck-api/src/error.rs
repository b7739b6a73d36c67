//! API error types and their HTTP status mapping.
//!
//! Validation and domain errors (missing fields, empty name, no face,
//! multiple faces, no users registered) map to 400; a missing delete target
//! maps to 404; everything else is a 500 with the error message embedded in
//! the response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facecheck_core::PipelineError;
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Store(#[from] facecheck_store::StoreError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Pipeline(PipelineError::NoFaceDetected) => {
                ApiError::bad_request("no face detected in image")
            }
            EngineError::Pipeline(PipelineError::MultipleFaces(n)) => ApiError::bad_request(
                format!("multiple faces detected ({n}); submit an image with exactly one face"),
            ),
            EngineError::Pipeline(other) => ApiError::internal(other.to_string()),
            EngineError::ChannelClosed => ApiError::internal("face engine unavailable"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody { status: "error", message: self.to_string() };
        (status, Json(body)).into_response()
    }
}
