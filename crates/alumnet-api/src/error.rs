use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Route-level error taxonomy. Every variant renders as a JSON body
/// `{error, message}`; internal detail is logged, never surfaced.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Gone(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn code(&self) -> (&'static str, StatusCode) {
        match self {
            ApiError::Validation(_) => ("validation_error", StatusCode::BAD_REQUEST),
            ApiError::Unauthorized => ("unauthorized", StatusCode::UNAUTHORIZED),
            ApiError::Forbidden(_) => ("forbidden", StatusCode::FORBIDDEN),
            ApiError::NotFound(_) => ("not_found", StatusCode::NOT_FOUND),
            ApiError::Conflict(_) => ("conflict", StatusCode::CONFLICT),
            ApiError::Gone(_) => ("gone", StatusCode::GONE),
            ApiError::Internal(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            error!("internal error: {:#}", err);
        }

        let (code, status) = self.code();
        let message = match &self {
            // Generic text for 500s; the cause stays in the log.
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let (code, status) = ApiError::Validation("bad".into()).code();
        assert_eq!(code, "validation_error");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, status) = ApiError::Internal(anyhow::anyhow!("db broke")).code();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
