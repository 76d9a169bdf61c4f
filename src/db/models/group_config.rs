use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Per-organization routing config, edited out-of-band (operator UI) and
/// read-mostly by the notification manager. When an org has no enabled row,
/// its reminders fall back to the escalation webhook rather than being
/// silently dropped (§4.4).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub org_name: String,
    pub name: String,
    pub webhook_url: String,
    pub enabled: bool,
    pub cooldown_minutes: i64,
    pub max_per_hour: i64,
}
