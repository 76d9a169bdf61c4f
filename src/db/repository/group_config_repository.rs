use sqlx::SqlitePool;

use crate::db::models::GroupConfig;
use crate::error::{AppError, AppResult};

/// Repository for the group-routing registry (C4). Read-mostly: rows are
/// edited out-of-band by the operator UI, which is out of scope here.
pub struct GroupConfigRepository;

impl GroupConfigRepository {
    pub async fn find_enabled_by_org(
        pool: &SqlitePool,
        org_name: &str,
    ) -> AppResult<Option<GroupConfig>> {
        sqlx::query_as::<_, GroupConfig>(
            r#"
            SELECT id, org_name, name, webhook_url, enabled, cooldown_minutes, max_per_hour
            FROM group_configs
            WHERE org_name = ? AND enabled = TRUE
            "#,
        )
        .bind(org_name)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn list_all(pool: &SqlitePool) -> AppResult<Vec<GroupConfig>> {
        sqlx::query_as::<_, GroupConfig>(
            "SELECT id, org_name, name, webhook_url, enabled, cooldown_minutes, max_per_hour FROM group_configs",
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }
}
