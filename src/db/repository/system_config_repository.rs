use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{SystemConfigRow, SystemConfigSnapshot};
use crate::error::{AppError, AppResult};

/// Repository for `system_config`. `load_snapshot` is called once at the
/// start of every tick (§5: lock-free snapshot semantics) rather than
/// caching rows across ticks.
pub struct SystemConfigRepository;

impl SystemConfigRepository {
    pub async fn load_snapshot(pool: &SqlitePool) -> AppResult<SystemConfigSnapshot> {
        let rows = sqlx::query_as::<_, SystemConfigRow>(
            "SELECT key, value, description, updated_at FROM system_config",
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(SystemConfigSnapshot::from_rows(&rows))
    }

    pub async fn set(pool: &SqlitePool, key: &str, value: &str, description: Option<&str>) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            INSERT INTO system_config (key, value, description, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }
}
