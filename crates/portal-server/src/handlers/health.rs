//! Health check handler

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use portal_storage::StorageState;
use serde_json::{json, Value};

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ready = state.storage.state() == StorageState::Ready;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if ready { "ok" } else { "unavailable" },
        "storage": state.storage.backend_kind().to_string(),
        "version": env!("CARGO_PKG_VERSION"),
    });
    (status, Json(body))
}
