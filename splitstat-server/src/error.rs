use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use splitstat_core::{EngineError, ErrorResponse};
use thiserror::Error;
use tracing::warn;

/// Error returned by a handler, rendered as `{ "error": "..." }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The request body could not be read.
    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(EngineError::NotFound(_))
            | ApiError::Engine(EngineError::VariantNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Engine(EngineError::InvalidState { .. }) => StatusCode::CONFLICT,
            ApiError::Engine(EngineError::Configuration(_))
            | ApiError::Engine(EngineError::UnsupportedMetric(_))
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self, "Rejected request");
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
