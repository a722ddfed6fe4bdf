//! Liveness and readiness probes

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::database;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "app": state.settings.app_name,
        "version": state.settings.app_version,
        "environment": state.settings.environment,
    }))
}

/// GET /health/ready - 503 until the database answers
pub async fn ready(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    if let Err(e) = database::ping(&state.pool).await {
        warn!(error = %e, "Database health check failed");
        return Err(ApiError::ServiceUnavailable("Database not ready".into()));
    }
    Ok(Json(json!({ "status": "ready", "database": "connected" })))
}

/// GET /health/live
pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}
