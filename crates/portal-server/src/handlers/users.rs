//! User handlers

use crate::extractors::AuthUser;
use axum::Json;
use chrono::{DateTime, Utc};
use portal_types::{Principal, Role, User};
use serde::Serialize;

/// Public view of an account; credentials never leave the server
#[derive(Debug, Serialize)]
pub struct UserResponse {
    id: String,
    kind: &'static str,
    display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.principal_id().to_string(),
            kind: user.kind(),
            display_name: user.display_name().to_string(),
            email: user.email().map(str::to_string),
            role: user.role(),
            provider: user.as_federated().map(|f| f.provider.to_string()),
            created_at: user.created_at(),
            updated_at: user.updated_at(),
        }
    }
}

pub async fn me(auth: AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(&auth.user))
}
