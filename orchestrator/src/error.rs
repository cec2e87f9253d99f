use axum::{http::StatusCode, response::IntoResponse, response::Json};
use serde::Serialize;

/// Error taxonomy surfaced by the core, independent of how a given handler
/// chooses to report it (bubbled as an HTTP error, or swallowed into a
/// delivery record with an outer 200 per the dispatcher flow).
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("capacity exhausted")]
    CapacityExhausted,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::Forbidden => StatusCode::FORBIDDEN,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            ProxyError::Conflict(_) => StatusCode::CONFLICT,
            ProxyError::CapacityExhausted => StatusCode::OK,
            ProxyError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::BadRequest(_) => "BAD_REQUEST",
            ProxyError::Unauthorized => "UNAUTHORIZED",
            ProxyError::Forbidden => "FORBIDDEN",
            ProxyError::NotFound(_) => "NOT_FOUND",
            ProxyError::SignatureInvalid => "SIGNATURE_INVALID",
            ProxyError::Conflict(_) => "CONFLICT",
            ProxyError::CapacityExhausted => "CAPACITY_EXHAUSTED",
            ProxyError::Validation(_) => "VALIDATION",
            ProxyError::Internal(_) => "INTERNAL",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            error_type: self.error_type().to_string(),
        });
        (status, body).into_response()
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
