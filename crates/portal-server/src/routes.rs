//! HTTP router

use crate::handlers;
use crate::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/users/me", get(handlers::users::me))
        .route("/sessions", get(handlers::sessions::list))
        .route("/sessions/:id", delete(handlers::sessions::revoke))
        .route(
            "/admin/users",
            get(handlers::admin::list_users).post(handlers::admin::create_federated_user),
        )
        .route("/admin/users/:key", delete(handlers::admin::delete_user))
}
