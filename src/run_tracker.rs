//! Run tracker (C8): opens/closes a run record per tick and records
//! per-step inputs/outputs/timing/errors. Always writes an audit row
//! regardless of outcome, via a scope guard so a step's audit row is
//! written on every exit path — including an early `return`/`?` inside
//! the step or a panic unwinding through it — rather than requiring every
//! call site to remember to log.

use sqlx::SqlitePool;

use crate::db::models::run::{Run, RunStatus};
use crate::db::repository::RunRepository;
use crate::error::AppResult;

/// Opens a new run record. Thin wrapper kept for symmetry with
/// `finish_run` and so callers never touch `RunRepository` directly.
pub async fn start_run(pool: &SqlitePool, context: &str) -> AppResult<Run> {
    RunRepository::start(pool, context).await
}

/// Closes a run record with its final status and aggregate counts.
pub async fn finish_run(
    pool: &SqlitePool,
    run_id: &str,
    status: RunStatus,
    opportunities_processed: i64,
    notifications_sent: i64,
    errors: &[String],
) -> AppResult<Run> {
    RunRepository::finish(
        pool,
        run_id,
        status,
        opportunities_processed,
        notifications_sent,
        errors,
    )
    .await
}

/// Resource-scoped acquisition for one `RunStep` (§9 design note: "Scoped
/// step logging"). `enter` starts the clock; `set_output`/`set_error` record
/// what happened; `Drop` persists the row regardless of which of those were
/// called, or whether neither was (a step that runs to completion with no
/// explicit output still gets a timed, error-free row).
///
/// The persistence call is async, so it cannot run inside `Drop` directly:
/// `Drop` schedules it as a detached `tokio::spawn`'d task on the runtime
/// that's current at drop time. This is best-effort audit logging, not the
/// step's own result — a failure to persist the audit row is logged and
/// swallowed, never propagated back into the tick.
pub struct RunStepScope {
    pool: SqlitePool,
    run_id: String,
    step_name: String,
    input_summary: Option<String>,
    output_summary: Option<String>,
    error_message: Option<String>,
    started_at: std::time::Instant,
}

impl RunStepScope {
    pub fn enter(
        pool: SqlitePool,
        run_id: impl Into<String>,
        step_name: impl Into<String>,
        input_summary: Option<String>,
    ) -> Self {
        Self {
            pool,
            run_id: run_id.into(),
            step_name: step_name.into(),
            input_summary,
            output_summary: None,
            error_message: None,
            started_at: std::time::Instant::now(),
        }
    }

    pub fn set_output(&mut self, output: String) {
        self.output_summary = Some(output);
    }

    pub fn set_error(&mut self, error: String) {
        self.error_message = Some(error);
    }
}

impl Drop for RunStepScope {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let run_id = std::mem::take(&mut self.run_id);
        let step_name = std::mem::take(&mut self.step_name);
        let input = self.input_summary.take();
        let output = self.output_summary.take();
        let error = self.error_message.take();
        let duration_seconds = self.started_at.elapsed().as_secs_f64();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = RunRepository::log_step(
                        &pool,
                        &run_id,
                        &step_name,
                        input.as_deref(),
                        output.as_deref(),
                        duration_seconds,
                        error.as_deref(),
                    )
                    .await
                    {
                        tracing::warn!(error = %e, step = %step_name, "failed to persist run step");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    step = %step_name,
                    "no tokio runtime available to persist run step"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_persists_step_row_on_normal_drop() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let run = start_run(&pool, "{}").await.unwrap();

        {
            let mut scope =
                RunStepScope::enter(pool.clone(), run.id.clone(), "fetchData", None);
            scope.set_output("{\"count\":3}".to_string());
        }

        // The Drop impl spawns a detached task; yield so it runs before we assert.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let steps = RunRepository::list_steps_for_run(&pool, &run.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_name, "fetchData");
        assert_eq!(steps[0].output_data.as_deref(), Some("{\"count\":3}"));
        assert!(steps[0].error_message.is_none());
    }

    #[tokio::test]
    async fn scope_persists_error_message() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let run = start_run(&pool, "{}").await.unwrap();

        {
            let mut scope =
                RunStepScope::enter(pool.clone(), run.id.clone(), "planNotifications", None);
            scope.set_error("store contention".to_string());
        }

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let steps = RunRepository::list_steps_for_run(&pool, &run.id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].error_message.as_deref(), Some("store contention"));
    }
}
