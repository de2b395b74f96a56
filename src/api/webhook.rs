// Webhook ingestion entrypoint. Thin HTTP adapter over `IngestionPipeline`:
// pulls the raw body and signature header off the request, forwards them
// unparsed, and maps the pipeline's outcome/error onto the response shapes
// external strategy engines expect.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::net::SocketAddr;

use crate::app_state::AppState;
use crate::error::CoreError;
use crate::ingestion::IngestOutcome;

const SIGNATURE_HEADER: &str = "x-tradingview-signature";

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !state.metrics.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": "engine is shutting down" })),
        )
            .into_response();
    }

    let signature_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state
        .ingestion
        .ingest(&body, signature_header, Some(addr.ip().to_string()))
        .await
    {
        Ok(IngestOutcome::Received { alert_id }) => (
            StatusCode::OK,
            Json(json!({ "success": true, "alertId": alert_id, "status": "received" })),
        )
            .into_response(),
        Ok(IngestOutcome::Duplicate) => (
            StatusCode::OK,
            Json(json!({ "success": true, "duplicate": true })),
        )
            .into_response(),
        Err(e @ CoreError::RateLimited(_)) => {
            let status = e.status_code();
            (status, Json(json!({ "success": false, "error": e.to_string() }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}
