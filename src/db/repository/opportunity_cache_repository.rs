use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::CachedOpportunity;
use crate::error::{AppError, AppResult};

/// Repository backing the data-sync cache (§4.3).
///
/// `replace_all` performs the full-refresh strategy: delete every row, then
/// insert the monitored subset, inside a single transaction so readers never
/// observe a partial refresh. SQLite has no atomic "replace table contents"
/// primitive, so this is a plain delete-then-insert inside one transaction.
pub struct OpportunityCacheRepository;

impl OpportunityCacheRepository {
    pub async fn replace_all(
        pool: &SqlitePool,
        opportunities: &[CachedOpportunity],
    ) -> AppResult<(u64, u64)> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        let deleted = sqlx::query("DELETE FROM opportunity_cache")
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?
            .rows_affected();

        for o in opportunities {
            sqlx::query(
                r#"
                INSERT INTO opportunity_cache (
                    order_num, customer_name, address, supervisor_name, create_time,
                    org_name, status, elapsed_hours, is_overdue, escalation_level,
                    sla_threshold_hours, sla_progress_ratio, is_violation, last_updated,
                    source_hash, cache_version
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&o.order_num)
            .bind(&o.customer_name)
            .bind(&o.address)
            .bind(&o.supervisor_name)
            .bind(o.create_time)
            .bind(&o.org_name)
            .bind(&o.status)
            .bind(o.elapsed_hours)
            .bind(o.is_overdue)
            .bind(o.escalation_level)
            .bind(o.sla_threshold_hours)
            .bind(o.sla_progress_ratio)
            .bind(o.is_violation)
            .bind(Utc::now().naive_utc())
            .bind(&o.source_hash)
            .bind(o.cache_version)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;
        }

        tx.commit().await.map_err(AppError::Database)?;

        Ok((deleted, opportunities.len() as u64))
    }

    pub async fn find_all(pool: &SqlitePool) -> AppResult<Vec<CachedOpportunity>> {
        sqlx::query_as::<_, CachedOpportunity>(
            r#"
            SELECT
                order_num, customer_name, address, supervisor_name, create_time,
                org_name, status, elapsed_hours, is_overdue, escalation_level,
                sla_threshold_hours, sla_progress_ratio, is_violation, last_updated,
                source_hash, cache_version
            FROM opportunity_cache
            ORDER BY order_num ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count(pool: &SqlitePool) -> AppResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM opportunity_cache")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(row.0)
    }
}
