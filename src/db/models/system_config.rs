use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single `system_config` row: `key PK, value, description, updatedAt`.
/// Values are stored as their string representation; typed access happens
/// in `SystemConfigSnapshot`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SystemConfigRow {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: NaiveDateTime,
}

/// Operator-editable policy values, read fresh from `system_config` at the
/// start of every tick (§5: "configuration reads are lock-free snapshots; a
/// config change mid-tick is not observed by that tick"). Boot-time
/// structural values live in `Config` instead — see `config.rs`.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfigSnapshot {
    pub agent_execution_interval_minutes: u64,
    pub agent_max_retries: i64,
    pub notification_reminder_enabled: bool,
    pub notification_escalation_enabled: bool,
    pub notification_cooldown_minutes: i64,
    pub webhook_api_interval_seconds: u64,
    pub reminder_max_display_orders: usize,
    pub escalation_max_display_orders: usize,
    pub sla_pending_reminder_hours: f64,
    pub sla_pending_escalation_hours: f64,
    pub sla_not_visiting_reminder_hours: f64,
    pub sla_not_visiting_escalation_hours: f64,
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub work_days: Vec<u32>,
}

impl Default for SystemConfigSnapshot {
    fn default() -> Self {
        SystemConfigSnapshot {
            agent_execution_interval_minutes: 60,
            agent_max_retries: 5,
            notification_reminder_enabled: true,
            notification_escalation_enabled: true,
            notification_cooldown_minutes: 120,
            webhook_api_interval_seconds: 1,
            reminder_max_display_orders: 5,
            escalation_max_display_orders: 5,
            sla_pending_reminder_hours: 4.0,
            sla_pending_escalation_hours: 8.0,
            sla_not_visiting_reminder_hours: 8.0,
            sla_not_visiting_escalation_hours: 16.0,
            work_start_hour: 9,
            work_end_hour: 19,
            work_days: vec![1, 2, 3, 4, 5],
        }
    }
}

/// The exhaustive key list from the configuration surface (§6.4), used both
/// to seed defaults on first boot and to parse rows back into a snapshot.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "agent_execution_interval",
    "agent_max_retries",
    "notification_reminder_enabled",
    "notification_escalation_enabled",
    "notification_cooldown",
    "webhook_api_interval",
    "reminder_max_display_orders",
    "escalation_max_display_orders",
    "sla_pending_reminder",
    "sla_pending_escalation",
    "sla_not_visiting_reminder",
    "sla_not_visiting_escalation",
    "work_start_hour",
    "work_end_hour",
    "work_days",
];

impl SystemConfigSnapshot {
    /// Parses a coded default on any missing or malformed key rather than
    /// failing the tick — per §7's `ConfigError` propagation rule ("use
    /// coded default; log a warning").
    pub fn from_rows(rows: &[SystemConfigRow]) -> Self {
        let mut snapshot = SystemConfigSnapshot::default();

        for row in rows {
            match row.key.as_str() {
                "agent_execution_interval" => {
                    Self::apply_u64(&row.key, &row.value, &mut snapshot.agent_execution_interval_minutes)
                }
                "agent_max_retries" => Self::apply_i64(&row.key, &row.value, &mut snapshot.agent_max_retries),
                "notification_reminder_enabled" => {
                    Self::apply_bool(&row.key, &row.value, &mut snapshot.notification_reminder_enabled)
                }
                "notification_escalation_enabled" => {
                    Self::apply_bool(&row.key, &row.value, &mut snapshot.notification_escalation_enabled)
                }
                "notification_cooldown" => {
                    Self::apply_i64(&row.key, &row.value, &mut snapshot.notification_cooldown_minutes)
                }
                "webhook_api_interval" => {
                    Self::apply_u64(&row.key, &row.value, &mut snapshot.webhook_api_interval_seconds)
                }
                "reminder_max_display_orders" => {
                    Self::apply_usize(&row.key, &row.value, &mut snapshot.reminder_max_display_orders)
                }
                "escalation_max_display_orders" => {
                    Self::apply_usize(&row.key, &row.value, &mut snapshot.escalation_max_display_orders)
                }
                "sla_pending_reminder" => {
                    Self::apply_f64(&row.key, &row.value, &mut snapshot.sla_pending_reminder_hours)
                }
                "sla_pending_escalation" => {
                    Self::apply_f64(&row.key, &row.value, &mut snapshot.sla_pending_escalation_hours)
                }
                "sla_not_visiting_reminder" => {
                    Self::apply_f64(&row.key, &row.value, &mut snapshot.sla_not_visiting_reminder_hours)
                }
                "sla_not_visiting_escalation" => {
                    Self::apply_f64(&row.key, &row.value, &mut snapshot.sla_not_visiting_escalation_hours)
                }
                "work_start_hour" => Self::apply_u32(&row.key, &row.value, &mut snapshot.work_start_hour),
                "work_end_hour" => Self::apply_u32(&row.key, &row.value, &mut snapshot.work_end_hour),
                "work_days" => {
                    let parsed: Vec<u32> = row
                        .value
                        .split(',')
                        .filter_map(|s| s.trim().parse::<u32>().ok())
                        .collect();
                    if parsed.is_empty() {
                        tracing::warn!(key = %row.key, value = %row.value, "invalid work_days, using default");
                    } else {
                        snapshot.work_days = parsed;
                    }
                }
                other => tracing::debug!(key = other, "unrecognized system_config key, ignoring"),
            }
        }

        snapshot
    }

    fn apply_u64(key: &str, value: &str, target: &mut u64) {
        match value.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, value, "invalid numeric system_config value, using default"),
        }
    }

    fn apply_u32(key: &str, value: &str, target: &mut u32) {
        match value.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, value, "invalid numeric system_config value, using default"),
        }
    }

    fn apply_i64(key: &str, value: &str, target: &mut i64) {
        match value.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, value, "invalid numeric system_config value, using default"),
        }
    }

    fn apply_usize(key: &str, value: &str, target: &mut usize) {
        match value.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, value, "invalid numeric system_config value, using default"),
        }
    }

    fn apply_f64(key: &str, value: &str, target: &mut f64) {
        match value.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, value, "invalid numeric system_config value, using default"),
        }
    }

    fn apply_bool(key: &str, value: &str, target: &mut bool) {
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" => *target = true,
            "0" | "false" | "no" => *target = false,
            _ => tracing::warn!(key, value, "invalid boolean system_config value, using default"),
        }
    }

    pub fn sla_thresholds(&self, status: crate::db::models::OrderStatus) -> Option<(f64, f64)> {
        use crate::db::models::OrderStatus;
        match status {
            OrderStatus::PendingAppointment => {
                Some((self.sla_pending_reminder_hours, self.sla_pending_escalation_hours))
            }
            OrderStatus::TemporarilyNotVisiting => Some((
                self.sla_not_visiting_reminder_hours,
                self.sla_not_visiting_escalation_hours,
            )),
            OrderStatus::Other => None,
        }
    }
}
