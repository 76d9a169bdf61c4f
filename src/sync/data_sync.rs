//! Data-sync strategy (C3): fetch from the analytics source, classify, and
//! full-refresh the cache, falling back to the last-known-good cache on a
//! failed fetch: try live fetch, log and fall back on failure, replacing
//! the whole cache table inside one transaction so readers never observe
//! a partial refresh.

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::business_time::BusinessHoursConfig;
use crate::classifier::{self, SlaThresholds};
use crate::db::models::opportunity::{CachedOpportunity, Opportunity};
use crate::db::repository::OpportunityCacheRepository;
use crate::error::{AppError, AppResult};
use crate::sync::opportunity_fetcher::OpportunityFetcher;

/// Operator-facing consistency snapshot (§4.3 `validateConsistency`):
/// compares the cache's row count against a fresh live-fetch count without
/// mutating either side.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub cached_count: i64,
    pub fresh_count: i64,
    pub consistent: bool,
    pub time: NaiveDateTime,
}

pub struct DataSyncStrategy<'a> {
    pool: &'a sqlx::SqlitePool,
    fetcher: &'a dyn OpportunityFetcher,
}

impl<'a> DataSyncStrategy<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool, fetcher: &'a dyn OpportunityFetcher) -> Self {
        Self { pool, fetcher }
    }

    /// Fetch live opportunities and classify them. On fetch failure, log and
    /// fall back to the last-known-good cache rather than propagating — the
    /// orchestrator still gets a usable (possibly stale) working set.
    ///
    /// Returns `(opportunities, fetch_error)`: `fetch_error` is `Some` iff a
    /// live fetch failed and the cache fallback was used, so the orchestrator
    /// can still record the swallowed `FetchError` on the run (§7 — a
    /// fetch failure is swallowed, not propagated, but must still show up in
    /// `Run.errors`) even though this call returns `Ok`.
    pub async fn get_opportunities(
        &self,
        now: NaiveDateTime,
        thresholds: &SlaThresholds,
        business_hours: &BusinessHoursConfig,
    ) -> AppResult<(Vec<Opportunity>, Option<String>)> {
        match self.fetcher.fetch().await {
            Ok(raw) => {
                let opportunities: Vec<Opportunity> = raw
                    .iter()
                    .map(|r| classifier::classify(r, now, thresholds, business_hours))
                    .collect();
                info!(count = opportunities.len(), "fetched live opportunities");
                Ok((opportunities, None))
            }
            Err(e) => {
                warn!(error = %e, "live fetch failed, falling back to last-known-good cache");
                let cached = OpportunityCacheRepository::find_all(self.pool).await?;
                if cached.is_empty() {
                    return Err(AppError::FetchError(format!(
                        "fetch failed and cache is empty: {e}"
                    )));
                }
                let opportunities = cached.into_iter().map(Opportunity::from).collect();
                Ok((opportunities, Some(e.to_string())))
            }
        }
    }

    /// Replace the entire `opportunity_cache` table with the monitored subset
    /// of `opportunities`, inside one transaction.
    pub async fn refresh_cache(&self, opportunities: &[Opportunity]) -> AppResult<()> {
        let rows: Vec<CachedOpportunity> = opportunities
            .iter()
            .filter(|o| o.monitored)
            .map(CachedOpportunity::from)
            .collect();

        OpportunityCacheRepository::replace_all(self.pool, &rows).await?;
        info!(count = rows.len(), "refreshed opportunity cache");
        Ok(())
    }

    /// Operator convenience (§4.3 `validateConsistency`): report the cached
    /// row count against a fresh live-fetch count, without touching the
    /// cache table either way. A failed live fetch here is reported as
    /// `fresh_count = 0, consistent = false` rather than propagated — this
    /// is a read-only diagnostic, not part of the tick's own fetch path.
    pub async fn validate_consistency(
        &self,
        now: NaiveDateTime,
        thresholds: &SlaThresholds,
        business_hours: &BusinessHoursConfig,
    ) -> AppResult<ConsistencyReport> {
        let cached_count = OpportunityCacheRepository::count(self.pool).await?;

        let fresh_count = match self.fetcher.fetch().await {
            Ok(raw) => raw
                .iter()
                .map(|r| classifier::classify(r, now, thresholds, business_hours))
                .filter(|o| o.monitored)
                .count() as i64,
            Err(e) => {
                warn!(error = %e, "live fetch failed during consistency check");
                0
            }
        };

        Ok(ConsistencyReport {
            cached_count,
            fresh_count,
            consistent: cached_count == fresh_count,
            time: Utc::now().naive_utc(),
        })
    }
}
