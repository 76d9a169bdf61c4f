//! Opportunity & SLA classifier (C2). Pure function of
//! `(createTime, orderStatus, now, thresholds, business-hours config)` — no I/O.

use chrono::NaiveDateTime;

use crate::business_time::BusinessHoursConfig;
use crate::db::models::opportunity::{OrderStatus, Opportunity, RawOpportunity};

/// The four-key SLA threshold map (§3.1/§4.2), one reminder/escalation pair
/// per monitored status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaThresholds {
    pub pending_reminder_hours: f64,
    pub pending_escalation_hours: f64,
    pub not_visiting_reminder_hours: f64,
    pub not_visiting_escalation_hours: f64,
}

impl Default for SlaThresholds {
    fn default() -> Self {
        Self {
            pending_reminder_hours: 4.0,
            pending_escalation_hours: 8.0,
            not_visiting_reminder_hours: 8.0,
            not_visiting_escalation_hours: 16.0,
        }
    }
}

impl From<&crate::db::models::system_config::SystemConfigSnapshot> for SlaThresholds {
    fn from(snapshot: &crate::db::models::system_config::SystemConfigSnapshot) -> Self {
        Self {
            pending_reminder_hours: snapshot.sla_pending_reminder_hours,
            pending_escalation_hours: snapshot.sla_pending_escalation_hours,
            not_visiting_reminder_hours: snapshot.sla_not_visiting_reminder_hours,
            not_visiting_escalation_hours: snapshot.sla_not_visiting_escalation_hours,
        }
    }
}

impl SlaThresholds {
    /// `(reminder, escalation)` thresholds for a status, or `None` if unmonitored.
    pub fn for_status(&self, status: OrderStatus) -> Option<(f64, f64)> {
        match status {
            OrderStatus::PendingAppointment => {
                Some((self.pending_reminder_hours, self.pending_escalation_hours))
            }
            OrderStatus::TemporarilyNotVisiting => Some((
                self.not_visiting_reminder_hours,
                self.not_visiting_escalation_hours,
            )),
            OrderStatus::Other => None,
        }
    }
}

/// Derive every SLA field for one opportunity. Unmonitored statuses return a
/// record with every derived boolean `false` and `progress_ratio = 0.0` —
/// the caller still gets a complete `Opportunity`, just an inert one.
pub fn classify(
    raw: &RawOpportunity,
    now: NaiveDateTime,
    thresholds: &SlaThresholds,
    business_hours: &BusinessHoursConfig,
) -> Opportunity {
    let elapsed = business_hours.business_hours_between(raw.create_time, now);

    let base = Opportunity {
        order_num: raw.order_num.clone(),
        customer_name: raw.customer_name.clone(),
        address: raw.address.clone(),
        supervisor_name: raw.supervisor_name.clone(),
        org_name: raw.org_name.clone(),
        create_time: raw.create_time,
        order_status: raw.order_status,
        monitored: false,
        elapsed_business_hours: elapsed,
        reminder_due_hit: false,
        escalation_due_hit: false,
        approaching_escalation: false,
        overdue_hours: 0.0,
        escalation_level: 0,
        progress_ratio: 0.0,
        escalation_threshold_hours: 0.0,
    };

    let Some((reminder_threshold, escalation_threshold)) = thresholds.for_status(raw.order_status)
    else {
        return base;
    };

    let reminder_due_hit = elapsed > reminder_threshold;
    let escalation_due_hit = elapsed > escalation_threshold;
    let progress_ratio = (elapsed / escalation_threshold).min(1.0);
    let approaching_escalation = !escalation_due_hit && progress_ratio >= 0.8;
    let overdue_hours = (elapsed - escalation_threshold).max(0.0);
    let escalation_level = if escalation_due_hit { 1 } else { 0 };

    Opportunity {
        monitored: true,
        reminder_due_hit,
        escalation_due_hit,
        approaching_escalation,
        overdue_hours,
        escalation_level,
        progress_ratio,
        escalation_threshold_hours: escalation_threshold,
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn raw(status: OrderStatus, create_time: NaiveDateTime) -> RawOpportunity {
        RawOpportunity {
            order_num: "O-1".to_string(),
            customer_name: "Acme".to_string(),
            address: "1 Main St".to_string(),
            supervisor_name: "J. Doe".to_string(),
            org_name: "north".to_string(),
            create_time,
            order_status: status,
        }
    }

    #[test]
    fn unmonitored_status_suppresses_all_sla_fields() {
        let r = raw(OrderStatus::Other, dt(2026, 7, 20, 9, 0));
        let now = dt(2026, 7, 27, 9, 0);
        let o = classify(&r, now, &SlaThresholds::default(), &BusinessHoursConfig::default());
        assert!(!o.monitored);
        assert!(!o.reminder_due_hit);
        assert!(!o.escalation_due_hit);
        assert_eq!(o.progress_ratio, 0.0);
    }

    #[test]
    fn boundary_equal_to_threshold_does_not_fire() {
        // Monday 9:00 + exactly 4 business hours = Monday 13:00.
        let r = raw(OrderStatus::PendingAppointment, dt(2026, 7, 27, 9, 0));
        let now = dt(2026, 7, 27, 13, 0);
        let o = classify(&r, now, &SlaThresholds::default(), &BusinessHoursConfig::default());
        assert_eq!(o.elapsed_business_hours, 4.0);
        assert!(!o.reminder_due_hit, "strict > required, == must not fire");
    }

    #[test]
    fn just_past_threshold_fires() {
        let r = raw(OrderStatus::PendingAppointment, dt(2026, 7, 27, 9, 0));
        let now = dt(2026, 7, 27, 13, 1);
        let o = classify(&r, now, &SlaThresholds::default(), &BusinessHoursConfig::default());
        assert!(o.reminder_due_hit);
        assert!(!o.escalation_due_hit);
    }

    #[test]
    fn escalation_hit_sets_level_and_overdue_hours() {
        let r = raw(OrderStatus::PendingAppointment, dt(2026, 7, 27, 9, 0));
        let now = dt(2026, 7, 27, 19, 0); // 10h elapsed, escalation threshold 8h
        let o = classify(&r, now, &SlaThresholds::default(), &BusinessHoursConfig::default());
        assert!(o.escalation_due_hit);
        assert_eq!(o.escalation_level, 1);
        assert_eq!(o.overdue_hours, 2.0);
        assert_eq!(o.progress_ratio, 1.0);
    }

    #[test]
    fn approaching_escalation_requires_80_percent_progress_without_hit() {
        // escalation threshold 8h, 80% = 6.4h elapsed.
        let r = raw(OrderStatus::PendingAppointment, dt(2026, 7, 27, 9, 0));
        let now = dt(2026, 7, 27, 15, 24); // 6.4h
        let o = classify(&r, now, &SlaThresholds::default(), &BusinessHoursConfig::default());
        assert!(!o.escalation_due_hit);
        assert!(o.approaching_escalation);
    }

    #[test]
    fn derivation_is_deterministic() {
        let r = raw(OrderStatus::TemporarilyNotVisiting, dt(2026, 7, 20, 9, 0));
        let now = dt(2026, 7, 27, 9, 0);
        let thresholds = SlaThresholds::default();
        let bh = BusinessHoursConfig::default();
        let o1 = classify(&r, now, &thresholds, &bh);
        let o2 = classify(&r, now, &thresholds, &bh);
        assert_eq!(o1.elapsed_business_hours, o2.elapsed_business_hours);
        assert_eq!(o1.escalation_level, o2.escalation_level);
        assert_eq!(o1.progress_ratio, o2.progress_ratio);
    }
}
