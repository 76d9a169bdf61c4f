use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Canonical task-type enum. `TaskType::parse` migrates any legacy
/// `Violation`/`Standard` string value found in older rows to the current
/// `Reminder`/`Escalation` naming on read, so no alias survives in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    Reminder,
    Escalation,
}

impl TaskType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Reminder" | "Violation" => TaskType::Reminder,
            "Escalation" => TaskType::Escalation,
            other => {
                tracing::warn!(value = other, "unrecognized task type, defaulting to Reminder");
                TaskType::Reminder
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Reminder => "Reminder",
            TaskType::Escalation => "Escalation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Sent,
    Failed,
    /// Reachable but unused: no step writes `Sent -> Confirmed` today. Kept so
    /// a future confirmation channel (e.g. read receipts) has somewhere to
    /// land without a schema change.
    Confirmed,
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Pending" => TaskStatus::Pending,
            "Sent" => TaskStatus::Sent,
            "Failed" => TaskStatus::Failed,
            "Confirmed" => TaskStatus::Confirmed,
            other => {
                tracing::warn!(value = other, "unrecognized task status, defaulting to Pending");
                TaskStatus::Pending
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Sent => "Sent",
            TaskStatus::Failed => "Failed",
            TaskStatus::Confirmed => "Confirmed",
        }
    }
}

/// Durable notification task row. For a reminder, `logical_order_id` is the
/// opportunity's `order_num`; for an escalation it is the synthetic
/// `"ESCALATION_" + org_name` — this is what scopes escalations to the
/// organization rather than the individual order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationTaskRow {
    pub id: String,
    pub logical_order_id: String,
    pub org_name: String,
    pub task_type: String,
    pub status: String,
    pub due_time: NaiveDateTime,
    pub message: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
    pub created_run_id: String,
    pub sent_run_id: Option<String>,
    pub retry_count: i64,
    pub max_retry_count: i64,
    pub cooldown_hours: f64,
    pub last_sent_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NotificationTaskRow {
    pub fn task_type(&self) -> TaskType {
        TaskType::parse(&self.task_type)
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::parse(&self.status)
    }

    /// A task is in cooldown iff it has a `last_sent_at` and `now - last_sent_at < cooldown_hours`.
    pub fn in_cooldown(&self, now: NaiveDateTime) -> bool {
        match self.last_sent_at {
            Some(last) => {
                let elapsed_hours = (now - last).num_seconds() as f64 / 3600.0;
                elapsed_hours < self.cooldown_hours
            }
            None => false,
        }
    }

    /// `status = Pending ∧ ¬inCooldown ∧ retryCount < maxRetryCount`.
    pub fn should_send_now(&self, now: NaiveDateTime) -> bool {
        self.status() == TaskStatus::Pending
            && !self.in_cooldown(now)
            && self.retry_count < self.max_retry_count
    }
}

#[derive(Debug, Clone)]
pub struct NewNotificationTask {
    pub logical_order_id: String,
    pub org_name: String,
    pub task_type: TaskType,
    pub due_time: NaiveDateTime,
    pub created_run_id: String,
    pub max_retry_count: i64,
    pub cooldown_hours: f64,
}
