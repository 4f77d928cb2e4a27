use crate::services::metrics::get_metrics;
use crate::startup::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "billing-service",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness includes a database round-trip.
pub async fn readiness_check(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.db.health_check().await?;
    Ok(Json(json!({ "status": "ready" })))
}

pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics()
}
