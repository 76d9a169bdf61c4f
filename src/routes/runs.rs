//! Operator-facing run surface: list/inspect ticks, fire a manual one, and
//! check cache/source consistency outside the tick cycle.
//! `POST /trigger` asks the scheduler for an out-of-band tick and reports
//! whether it actually ran or was dropped by the single-flight guard.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::db::repository::RunRepository;
use crate::error::{AppError, AppResult};
use crate::scheduler::TriggerOutcome;
use crate::sync::ConsistencyReport;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trigger", post(trigger_run))
        .route("/consistency", get(check_consistency))
        .route("/", get(list_runs))
        .route("/:id", get(get_run))
}

async fn trigger_run(State(state): State<Arc<AppState>>) -> Json<TriggerOutcome> {
    Json(state.scheduler.trigger_manual().await)
}

/// `GET /runs/consistency` (§4.3 `validateConsistency`): a read-only
/// cached-vs-fresh count comparison an operator can call at any time,
/// independent of whether a tick is currently running.
async fn check_consistency(State(state): State<Arc<AppState>>) -> AppResult<Json<ConsistencyReport>> {
    let report = state.orchestrator.check_consistency().await?;
    Ok(Json(report))
}

async fn list_runs(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<crate::db::models::run::Run>>> {
    let runs = RunRepository::list_recent(&state.db, 50).await?;
    Ok(Json(runs))
}

#[derive(Serialize)]
struct RunDetail {
    #[serde(flatten)]
    run: crate::db::models::run::Run,
    steps: Vec<crate::db::models::run::RunStep>,
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<RunDetail>> {
    let run = RunRepository::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("run {id}")))?;
    let steps = RunRepository::list_steps_for_run(&state.db, &id).await?;
    Ok(Json(RunDetail { run, steps }))
}
