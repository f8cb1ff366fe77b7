//! Auth extractor for protected routes

use crate::services::AuthError;
use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use portal_types::{Principal, Session, User};
use serde_json::json;
use tracing::warn;

/// Authenticated account and the session that proved it
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user: User,
    pub session: Session,
}

/// Same as `AuthUser`, but only for administrators
#[derive(Clone, Debug)]
pub struct AdminUser(pub AuthUser);

/// Auth rejection response
pub struct AuthRejection {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AuthRejection {
    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: message.into(),
        }
    }
}

impl From<AuthError> for AuthRejection {
    fn from(err: AuthError) -> Self {
        if err.is_unavailable() {
            warn!("Session lookup failed: {}", err);
            return Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "session_unavailable",
                message: "Session store is unavailable".to_string(),
            };
        }
        match err {
            AuthError::Internal(message) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal",
                message,
            },
            _ => Self::unauthorized("Invalid or expired session"),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
        }));
        (self.status, body).into_response()
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthRejection> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AuthRejection::unauthorized("Missing Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthRejection::unauthorized("Invalid Authorization format"))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let (user, session) = state.auth.authenticate(token).await?;
        Ok(AuthUser { user, session })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        if !auth.user.is_admin() {
            return Err(AuthRejection {
                status: StatusCode::FORBIDDEN,
                code: "forbidden",
                message: AuthError::Forbidden.to_string(),
            });
        }
        Ok(AdminUser(auth))
    }
}
