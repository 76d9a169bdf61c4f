//! Group-routing registry (C4): a thin read-through over
//! `GroupConfigRepository`. An org with no enabled config falls back to the
//! escalation webhook for reminders too, so a misconfigured org never
//! silently drops messages; escalations always go to the escalation webhook
//! regardless of org.

use sqlx::SqlitePool;

use crate::db::repository::GroupConfigRepository;
use crate::error::AppResult;

pub struct GroupRoutingRegistry<'a> {
    pool: &'a SqlitePool,
    escalation_webhook_url: &'a str,
}

impl<'a> GroupRoutingRegistry<'a> {
    pub fn new(pool: &'a SqlitePool, escalation_webhook_url: &'a str) -> Self {
        Self {
            pool,
            escalation_webhook_url,
        }
    }

    /// Webhook URL for a reminder message to `org_name`. Falls back to the
    /// escalation webhook when the org has no enabled `GroupConfig`.
    pub async fn reminder_webhook_for_org(&self, org_name: &str) -> AppResult<String> {
        match GroupConfigRepository::find_enabled_by_org(self.pool, org_name).await? {
            Some(cfg) => Ok(cfg.webhook_url),
            None => Ok(self.escalation_webhook_url.to_string()),
        }
    }

    /// Escalation messages always go here, regardless of `orgName`.
    pub fn escalation_webhook(&self) -> &str {
        self.escalation_webhook_url
    }
}
