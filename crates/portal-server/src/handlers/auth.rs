//! Authentication handlers

use super::users::UserResponse;
use crate::extractors::AuthUser;
use crate::services::{AuthError, Registration};
use crate::AppState;
use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use portal_types::{Session, User};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    username: String,
    password: String,
    email: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Bearer token for subsequent requests
    token: String,
    expires_at: DateTime<Utc>,
    user: UserResponse,
}

impl LoginResponse {
    fn new(user: &User, session: &Session) -> Self {
        Self {
            token: session.id().to_string(),
            expires_at: session.expires_at(),
            user: UserResponse::from(user),
        }
    }
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AuthError> {
    info!("Registration attempt for: {}", req.username);

    let registration = Registration {
        username: req.username,
        password: req.password,
        email: req.email,
        display_name: req.display_name,
    };
    let (user, session) = state
        .auth
        .register(registration, user_agent(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(LoginResponse::new(&user, &session))))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let (user, session) = state
        .auth
        .login(&req.username, &req.password, user_agent(&headers))
        .await?;

    Ok(Json(LoginResponse::new(&user, &session)))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AuthError> {
    state.auth.logout(&auth.session).await?;
    Ok(StatusCode::NO_CONTENT)
}
