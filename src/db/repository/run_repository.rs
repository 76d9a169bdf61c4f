use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Run, RunStatus, RunStep};
use crate::error::{AppError, AppResult};

/// Repository backing the run tracker (C8): one `agent_runs` row per tick
/// plus many `agent_history` rows, one per step.
pub struct RunRepository;

impl RunRepository {
    pub async fn start(pool: &SqlitePool, context: &str) -> AppResult<Run> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, Run>(
            r#"
            INSERT INTO agent_runs (
                id, trigger_time, end_time, status, context,
                opportunities_processed, notifications_sent, errors
            ) VALUES (?, ?, NULL, ?, ?, 0, 0, '[]')
            RETURNING id, trigger_time, end_time, status, context,
                      opportunities_processed, notifications_sent, errors
            "#,
        )
        .bind(&id)
        .bind(now)
        .bind(RunStatus::Running.as_str())
        .bind(context)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn finish(
        pool: &SqlitePool,
        run_id: &str,
        status: RunStatus,
        opportunities_processed: i64,
        notifications_sent: i64,
        errors: &[String],
    ) -> AppResult<Run> {
        let now = Utc::now().naive_utc();
        let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());

        sqlx::query_as::<_, Run>(
            r#"
            UPDATE agent_runs
            SET end_time = ?, status = ?, opportunities_processed = ?,
                notifications_sent = ?, errors = ?
            WHERE id = ?
            RETURNING id, trigger_time, end_time, status, context,
                      opportunities_processed, notifications_sent, errors
            "#,
        )
        .bind(now)
        .bind(status.as_str())
        .bind(opportunities_processed)
        .bind(notifications_sent)
        .bind(errors_json)
        .bind(run_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn log_step(
        pool: &SqlitePool,
        run_id: &str,
        step_name: &str,
        input_data: Option<&str>,
        output_data: Option<&str>,
        duration_seconds: f64,
        error_message: Option<&str>,
    ) -> AppResult<RunStep> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, RunStep>(
            r#"
            INSERT INTO agent_history (
                id, run_id, step_name, input_data, output_data, timestamp,
                duration_seconds, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, run_id, step_name, input_data, output_data, timestamp,
                      duration_seconds, error_message
            "#,
        )
        .bind(id)
        .bind(run_id)
        .bind(step_name)
        .bind(input_data)
        .bind(output_data)
        .bind(now)
        .bind(duration_seconds)
        .bind(error_message)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, run_id: &str) -> AppResult<Option<Run>> {
        sqlx::query_as::<_, Run>(
            r#"
            SELECT id, trigger_time, end_time, status, context,
                   opportunities_processed, notifications_sent, errors
            FROM agent_runs WHERE id = ?
            "#,
        )
        .bind(run_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> AppResult<Vec<Run>> {
        sqlx::query_as::<_, Run>(
            r#"
            SELECT id, trigger_time, end_time, status, context,
                   opportunities_processed, notifications_sent, errors
            FROM agent_runs
            ORDER BY trigger_time DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_steps_for_run(pool: &SqlitePool, run_id: &str) -> AppResult<Vec<RunStep>> {
        sqlx::query_as::<_, RunStep>(
            r#"
            SELECT id, run_id, step_name, input_data, output_data, timestamp,
                   duration_seconds, error_message
            FROM agent_history
            WHERE run_id = ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
