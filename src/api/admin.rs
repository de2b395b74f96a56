// Authenticated operator REST surface: configuration/user-alert/trade CRUD
// plus the metrics snapshot. The authenticated operator counterpart of the
// webhook intake, gated by the same `AuthBearer` constant-time bearer check.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::domain::{AlertConfiguration, UserAlert};
use crate::error::CoreError;

// -- Liveness / readiness (public) -------------------------------------------

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.metrics.is_ready();
    let status = if ready {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "ready": ready })))
}

// -- Metrics ------------------------------------------------------------------

pub async fn metrics(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

// -- Alert configurations -------------------------------------------------------

pub async fn list_configurations(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, CoreError> {
    let configs = state.store.list_alert_configurations().await?;
    Ok(Json(configs))
}

pub async fn create_configuration(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(config): Json<AlertConfiguration>,
) -> Result<impl IntoResponse, CoreError> {
    config.validate()?;
    state.store.upsert_alert_configuration(config.clone()).await?;
    state.increment_version();
    Ok(Json(json!({ "success": true, "id": config.id })))
}

// -- User alerts ----------------------------------------------------------------

pub async fn list_user_alerts(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let alerts = state.store.list_user_alerts_for_user(&user_id).await?;
    Ok(Json(alerts))
}

pub async fn create_user_alert(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(alert): Json<UserAlert>,
) -> Result<impl IntoResponse, CoreError> {
    if !(crate::domain::user_alert::MIN_COOLDOWN_MS..=crate::domain::user_alert::MAX_COOLDOWN_MS)
        .contains(&alert.cooldown_ms)
    {
        return Err(CoreError::Validation(format!(
            "cooldownMs must be between {} and {}",
            crate::domain::user_alert::MIN_COOLDOWN_MS,
            crate::domain::user_alert::MAX_COOLDOWN_MS
        )));
    }
    if alert.conditions.is_empty() || alert.conditions.len() > 5 {
        return Err(CoreError::Validation(
            "conditions must contain between 1 and 5 entries".to_string(),
        ));
    }

    let id = alert.id.clone();
    state.store.upsert_user_alert(alert).await?;
    state.increment_version();
    Ok(Json(json!({ "success": true, "id": id })))
}

// -- Trades -----------------------------------------------------------------------

pub async fn list_trades(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let trades = state.store.list_trades_for_user(&user_id).await?;
    Ok(Json(trades))
}
