//! Session handlers

use crate::extractors::AuthUser;
use crate::services::AuthError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use portal_types::{Principal, Session};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// The session making this request
    current: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    sessions: Vec<SessionResponse>,
}

impl SessionResponse {
    fn new(session: Session, current: &Session) -> Self {
        Self {
            current: session.id() == current.id(),
            id: session.id().to_string(),
            created_at: session.created_at(),
            expires_at: session.expires_at(),
            user_agent: session.user_agent,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<SessionListResponse>, AuthError> {
    let sessions = state
        .auth
        .list_sessions(auth.user.principal_id())
        .await?
        .into_iter()
        .map(|session| SessionResponse::new(session, &auth.session))
        .collect();

    Ok(Json(SessionListResponse { sessions }))
}

pub async fn revoke(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AuthError> {
    state.auth.revoke_session(&auth.user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
