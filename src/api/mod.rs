// HTTP surface: the unauthenticated webhook intake plus the authenticated
// operator REST shell. One `Router::new()` with CORS and shared state
// layered on at the end.

pub mod admin;
pub mod auth;
pub mod webhook;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // -- Public --------------------------------------------------------
        .route("/healthz", get(admin::healthz))
        .route("/readyz", get(admin::readyz))
        .route("/api/v1/webhook", post(webhook::webhook))
        // -- Authenticated ---------------------------------------------------
        .route("/api/v1/metrics", get(admin::metrics))
        .route(
            "/api/v1/configurations",
            get(admin::list_configurations).post(admin::create_configuration),
        )
        .route(
            "/api/v1/user-alerts/:user_id",
            get(admin::list_user_alerts),
        )
        .route("/api/v1/user-alerts", post(admin::create_user_alert))
        .route("/api/v1/trades/:user_id", get(admin::list_trades))
        .layer(cors)
        .with_state(state)
}
