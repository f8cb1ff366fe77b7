//! Administrator handlers

use super::users::UserResponse;
use crate::extractors::AdminUser;
use crate::services::AuthError;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use portal_types::{Principal, Provider};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    field: Option<String>,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    users: Vec<UserResponse>,
}

#[derive(Debug, Deserialize)]
pub struct FederatedUserRequest {
    email: String,
    name: String,
    provider: String,
}

/// All accounts, or those whose `field` equals `value`
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserListResponse>, AuthError> {
    let users = match query.field.as_deref() {
        Some(field) => state.users.find(field, &query.value).await?,
        None => state.users.list().await?,
    };

    Ok(Json(UserListResponse {
        users: users.iter().map(UserResponse::from).collect(),
    }))
}

pub async fn create_federated_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<FederatedUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AuthError> {
    let user = state
        .users
        .add_federated(&req.email, &req.name, Provider::from(req.provider))
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(key): Path<String>,
) -> Result<StatusCode, AuthError> {
    if key == admin.user.principal_id() {
        return Err(AuthError::InvalidInput(
            "administrators cannot delete their own account".to_string(),
        ));
    }
    state.users.remove(&key).await?;
    info!("User {} deleted by {}", key, admin.user.principal_id());
    Ok(StatusCode::NO_CONTENT)
}
