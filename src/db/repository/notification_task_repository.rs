use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{NewNotificationTask, NotificationTaskRow, TaskStatus, TaskType};
use crate::error::{AppError, AppResult};

/// Repository for the notification task store (C5).
///
/// Plain `sqlx::query_as` with the full column list spelled out on every
/// statement, atomic single-row `UPDATE ... RETURNING` for every state
/// transition.
pub struct NotificationTaskRepository;

const COLUMNS: &str = r#"
    id, logical_order_id, org_name, task_type, status, due_time, message,
    sent_at, created_run_id, sent_run_id, retry_count, max_retry_count,
    cooldown_hours, last_sent_at, created_at, updated_at
"#;

impl NotificationTaskRepository {
    /// Inserts a new `Pending` task. Rejects the insert (returns
    /// `AppError::StoreError`) if an open `Pending` task already exists for
    /// the same `(logical_order_id, task_type)` — callers must consult
    /// `has_pending` first; this is the last-line invariant guard, not the
    /// primary dedup mechanism.
    pub async fn save(pool: &SqlitePool, task: NewNotificationTask) -> AppResult<NotificationTaskRow> {
        if Self::has_pending(pool, &task.logical_order_id, task.task_type).await? {
            return Err(AppError::StoreError(format!(
                "a Pending task already exists for ({}, {:?})",
                task.logical_order_id, task.task_type
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let query = format!(
            r#"
            INSERT INTO notification_tasks (
                id, logical_order_id, org_name, task_type, status, due_time, message,
                sent_at, created_run_id, sent_run_id, retry_count, max_retry_count,
                cooldown_hours, last_sent_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        );

        sqlx::query_as::<_, NotificationTaskRow>(&query)
            .bind(id)
            .bind(&task.logical_order_id)
            .bind(&task.org_name)
            .bind(task.task_type.as_str())
            .bind(TaskStatus::Pending.as_str())
            .bind(task.due_time)
            .bind::<Option<String>>(None)
            .bind::<Option<NaiveDateTime>>(None)
            .bind(&task.created_run_id)
            .bind::<Option<String>>(None)
            .bind(0i64)
            .bind(task.max_retry_count)
            .bind(task.cooldown_hours)
            .bind::<Option<NaiveDateTime>>(None)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn has_pending(
        pool: &SqlitePool,
        logical_order_id: &str,
        task_type: TaskType,
    ) -> AppResult<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notification_tasks WHERE logical_order_id = ? AND task_type = ? AND status = ?",
        )
        .bind(logical_order_id)
        .bind(task_type.as_str())
        .bind(TaskStatus::Pending.as_str())
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row.0 > 0)
    }

    /// The most recent row for `(logical_order_id, task_type)` regardless of
    /// status — cooldown at plan time is evaluated against this, not just
    /// `Pending` rows, per §4.7.3.
    pub async fn find_latest_for_key(
        pool: &SqlitePool,
        logical_order_id: &str,
        task_type: TaskType,
    ) -> AppResult<Option<NotificationTaskRow>> {
        let query = format!(
            r#"
            SELECT {COLUMNS} FROM notification_tasks
            WHERE logical_order_id = ? AND task_type = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#
        );
        sqlx::query_as::<_, NotificationTaskRow>(&query)
            .bind(logical_order_id)
            .bind(task_type.as_str())
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn find_pending(pool: &SqlitePool) -> AppResult<Vec<NotificationTaskRow>> {
        let query = format!(
            r#"SELECT {COLUMNS} FROM notification_tasks WHERE status = ? ORDER BY due_time ASC"#
        );
        sqlx::query_as::<_, NotificationTaskRow>(&query)
            .bind(TaskStatus::Pending.as_str())
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Open (non-terminal) escalation tasks for `org_name` whose
    /// `logical_order_id` is not the canonical per-org id — used during the
    /// legacy-cleanup step (§4.7.1 step 5) to retire stale per-order
    /// escalation rows.
    pub async fn find_open_escalation_tasks_for_org_excluding(
        pool: &SqlitePool,
        org_name: &str,
        canonical_logical_id: &str,
    ) -> AppResult<Vec<NotificationTaskRow>> {
        let query = format!(
            r#"
            SELECT {COLUMNS} FROM notification_tasks
            WHERE org_name = ?
              AND task_type = ?
              AND status IN (?, ?)
              AND logical_order_id != ?
            "#
        );
        sqlx::query_as::<_, NotificationTaskRow>(&query)
            .bind(org_name)
            .bind(TaskType::Escalation.as_str())
            .bind(TaskStatus::Pending.as_str())
            .bind(TaskStatus::Failed.as_str())
            .bind(canonical_logical_id)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Retires a task to `Sent` without a dispatch (used by the legacy
    /// cleanup step and by nothing else — a retired row must never be
    /// mistaken for a successfully delivered notification by anything that
    /// inspects `sent_at`/`last_sent_at`, so both are left null).
    pub async fn retire_without_dispatch(pool: &SqlitePool, id: &str) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE notification_tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(TaskStatus::Sent.as_str())
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn update_message(pool: &SqlitePool, id: &str, rendered: &str) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "UPDATE notification_tasks SET message = ?, updated_at = ? WHERE id = ? AND message IS NULL",
        )
        .bind(rendered)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// `Pending -> Sent` on success: stamps `sent_at`, `last_sent_at`, `sent_run_id`.
    pub async fn mark_sent(pool: &SqlitePool, id: &str, run_id: &str) -> AppResult<NotificationTaskRow> {
        let now = Utc::now().naive_utc();
        let query = format!(
            r#"
            UPDATE notification_tasks
            SET status = ?, sent_at = ?, last_sent_at = ?, sent_run_id = ?, updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        );
        sqlx::query_as::<_, NotificationTaskRow>(&query)
            .bind(TaskStatus::Sent.as_str())
            .bind(now)
            .bind(now)
            .bind(run_id)
            .bind(now)
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    /// `Pending -> Failed` on send failure: increments `retry_count`. The
    /// task stays `Failed` once `retry_count` reaches `max_retry_count`
    /// (§8 property 6) — this method only increments; the orchestrator never
    /// re-dispatches a `Failed` task within the same tick (§4.7.3).
    pub async fn mark_failed(pool: &SqlitePool, id: &str) -> AppResult<NotificationTaskRow> {
        let now = Utc::now().naive_utc();
        let query = format!(
            r#"
            UPDATE notification_tasks
            SET status = ?, retry_count = retry_count + 1, updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        );
        sqlx::query_as::<_, NotificationTaskRow>(&query)
            .bind(TaskStatus::Failed.as_str())
            .bind(now)
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }
}
