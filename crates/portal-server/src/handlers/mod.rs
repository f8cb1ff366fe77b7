//! HTTP handlers

pub mod admin;
pub mod auth;
pub mod health;
pub mod sessions;
pub mod users;

pub use health::health;

use crate::services::AuthError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use portal_storage::ErrorClass;
use serde_json::json;
use tracing::error;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AuthError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AuthError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AuthError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            AuthError::Storage(e) if e.class() == ErrorClass::Validation => {
                (StatusCode::BAD_REQUEST, "invalid_input")
            }
            AuthError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));
        (status, body).into_response()
    }
}
