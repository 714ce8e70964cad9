//! Maps the core error taxonomy (spec §7) onto HTTP status codes for
//! every handler in this crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orizon_registry::RegistryError;
use orizon_validate::ValidationError;
use serde::Serialize;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    category: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    category: &'static str,
}

impl AppError {
    pub fn new(status: StatusCode, category: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            category,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
                category: self.category,
            }),
        )
            .into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        let (status, category) = match &e {
            RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            RegistryError::InvalidConstraint(_) => (StatusCode::BAD_REQUEST, "InvalidConstraint"),
            RegistryError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            RegistryError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RateLimited"),
            RegistryError::PayloadTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "PayloadTooLarge"),
            RegistryError::Cancelled => (StatusCode::INTERNAL_SERVER_ERROR, "Cancelled"),
            RegistryError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IOFailure"),
        };
        Self::new(status, category, e.to_string())
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidInput", e.to_string())
    }
}
