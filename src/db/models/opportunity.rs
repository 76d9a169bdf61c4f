use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Raw opportunity status as reported by the analytics source.
///
/// Only `PendingAppointment` and `TemporarilyNotVisiting` are monitored —
/// every other value is kept in the working set (it contributes to `total`
/// counts) but never drives classification or tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingAppointment,
    TemporarilyNotVisiting,
    Other,
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PendingAppointment" => OrderStatus::PendingAppointment,
            "TemporarilyNotVisiting" => OrderStatus::TemporarilyNotVisiting,
            _ => OrderStatus::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingAppointment => "PendingAppointment",
            OrderStatus::TemporarilyNotVisiting => "TemporarilyNotVisiting",
            OrderStatus::Other => "Other",
        }
    }

    pub fn is_monitored(&self) -> bool {
        !matches!(self, OrderStatus::Other)
    }
}

/// A single service work-order row, as reported by the `OpportunityFetcher`.
///
/// Raw fields only — no SLA derivation lives here. `createTime` is the
/// source-of-truth for SLA classification; `source_hash` is a stable hash
/// over the business fields, used by the cache to detect real changes
/// between refreshes rather than rewriting every row every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOpportunity {
    pub order_num: String,
    pub customer_name: String,
    pub address: String,
    pub supervisor_name: String,
    pub org_name: String,
    pub create_time: NaiveDateTime,
    pub order_status: OrderStatus,
}

/// One opportunity plus the SLA fields the classifier (C2) derives from it.
///
/// Defined as a flat record with every derived field present from the start
/// (filled in by `classifier::classify`, never mutated piecemeal afterward) —
/// there is no "dynamically attach fields to the raw row" step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub order_num: String,
    pub customer_name: String,
    pub address: String,
    pub supervisor_name: String,
    pub org_name: String,
    pub create_time: NaiveDateTime,
    pub order_status: OrderStatus,

    pub monitored: bool,
    pub elapsed_business_hours: f64,
    pub reminder_due_hit: bool,
    pub escalation_due_hit: bool,
    pub approaching_escalation: bool,
    pub overdue_hours: f64,
    pub escalation_level: u8,
    pub progress_ratio: f64,
    /// The escalation-tier SLA threshold (business hours) applied for this
    /// opportunity's status. `0.0` when `!monitored`.
    pub escalation_threshold_hours: f64,
}

impl Opportunity {
    pub fn source_hash(&self) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.order_num.hash(&mut hasher);
        self.customer_name.hash(&mut hasher);
        self.address.hash(&mut hasher);
        self.supervisor_name.hash(&mut hasher);
        self.org_name.hash(&mut hasher);
        self.create_time.hash(&mut hasher);
        self.order_status.as_str().hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}

/// Persisted row shape for `opportunity_cache`. Entries are disposable: the
/// cache's authority ends at the next successful fetch, and only monitored
/// opportunities with a non-null `create_time` are ever cached.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CachedOpportunity {
    pub order_num: String,
    pub customer_name: String,
    pub address: String,
    pub supervisor_name: String,
    pub create_time: NaiveDateTime,
    pub org_name: String,
    pub status: String,
    pub elapsed_hours: f64,
    pub is_overdue: bool,
    pub escalation_level: i64,
    pub sla_threshold_hours: f64,
    pub sla_progress_ratio: f64,
    pub is_violation: bool,
    pub last_updated: NaiveDateTime,
    pub source_hash: String,
    pub cache_version: i64,
}

impl From<&Opportunity> for CachedOpportunity {
    fn from(o: &Opportunity) -> Self {
        CachedOpportunity {
            order_num: o.order_num.clone(),
            customer_name: o.customer_name.clone(),
            address: o.address.clone(),
            supervisor_name: o.supervisor_name.clone(),
            create_time: o.create_time,
            org_name: o.org_name.clone(),
            status: o.order_status.as_str().to_string(),
            elapsed_hours: o.elapsed_business_hours,
            is_overdue: o.escalation_due_hit,
            escalation_level: o.escalation_level as i64,
            sla_threshold_hours: o.escalation_threshold_hours,
            sla_progress_ratio: o.progress_ratio,
            is_violation: o.reminder_due_hit,
            last_updated: chrono::Utc::now().naive_utc(),
            source_hash: o.source_hash(),
            cache_version: 1,
        }
    }
}

impl From<CachedOpportunity> for Opportunity {
    fn from(c: CachedOpportunity) -> Self {
        let approaching_escalation = !c.is_overdue && c.sla_progress_ratio >= 0.8;
        Opportunity {
            order_num: c.order_num,
            customer_name: c.customer_name,
            address: c.address,
            supervisor_name: c.supervisor_name,
            org_name: c.org_name,
            create_time: c.create_time,
            order_status: OrderStatus::parse(&c.status),
            monitored: true,
            elapsed_business_hours: c.elapsed_hours,
            reminder_due_hit: c.is_violation,
            escalation_due_hit: c.is_overdue,
            approaching_escalation,
            overdue_hours: (c.elapsed_hours - c.sla_threshold_hours).max(0.0),
            escalation_level: c.escalation_level as u8,
            progress_ratio: c.sla_progress_ratio,
            escalation_threshold_hours: c.sla_threshold_hours,
        }
    }
}
