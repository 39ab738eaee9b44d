use std::sync::atomic::Ordering;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::instrument;

use crate::app::AppState;

#[instrument(name = "root_handler", skip_all)]
pub async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": state.cargo_pkg_name,
        "version": state.cargo_pkg_version,
        "status": "ok"
    }))
}

#[instrument(name = "health_handler", skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// Ready only while the controller is watching
#[instrument(name = "ready_handler", skip_all)]
pub async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready" })),
        )
    }
}

#[instrument(name = "not_found_handler", skip_all)]
pub async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
