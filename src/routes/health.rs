//! `GET /health`: liveness plus the two operator-facing signals the
//! scheduler can't surface any other way — DB reachability and the
//! missed-tick counter (§4.10).

use std::sync::Arc;

use axum::extract::State;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub database_reachable: bool,
    pub missed_ticks: u64,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database_reachable = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let missed_ticks = state.scheduler.missed_ticks();
    let status = if database_reachable { "healthy" } else { "degraded" };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database_reachable,
        missed_ticks,
    };

    let code = if database_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(response))
}
