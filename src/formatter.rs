//! Message formatter (C6): pure, deterministic, no I/O. Renders a
//! reminder/escalation message by enumerating the due opportunities up to a
//! configured display cap, rather than filling one fixed template.

use chrono::NaiveDateTime;

use crate::db::models::opportunity::Opportunity;

/// `Xd Yh` coarse elapsed-time formatting, using the configured
/// `work_hours_per_day = work_end_hour - work_start_hour`.
pub fn format_elapsed(business_hours: f64, work_hours_per_day: u32) -> String {
    if work_hours_per_day == 0 {
        return format!("{business_hours:.1}h");
    }
    let total_hours = business_hours.floor() as i64;
    let days = total_hours / work_hours_per_day as i64;
    let hours = total_hours % work_hours_per_day as i64;
    if days > 0 {
        format!("{days}d {hours}h")
    } else {
        format!("{hours}h")
    }
}

fn format_create_time(t: NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

/// Render a reminder message enumerating up to `display_cap` opportunities.
/// `opportunities` must already be the full due set for the org; this
/// function truncates, it does not select.
pub fn render_reminder_message(
    org_name: &str,
    opportunities: &[Opportunity],
    display_cap: usize,
    work_hours_per_day: u32,
) -> String {
    let total = opportunities.len();
    let mut out = format!("SLA Reminder — {org_name} ({total} opportunit{} due)\n", if total == 1 { "y" } else { "ies" });

    for o in opportunities.iter().take(display_cap) {
        out.push_str(&format!(
            "- #{order} | {elapsed} elapsed | {customer} | {address} | supervisor: {supervisor} | created {created} | status: {status}\n",
            order = o.order_num,
            elapsed = format_elapsed(o.elapsed_business_hours, work_hours_per_day),
            customer = o.customer_name,
            address = o.address,
            supervisor = o.supervisor_name,
            created = format_create_time(o.create_time),
            status = o.order_status.as_str(),
        ));
    }

    if total > display_cap {
        out.push_str(&format!("... {} more\n", total - display_cap));
    }

    out
}

/// Render an escalation message for `org_name`. `total` is the full count of
/// escalation-eligible opportunities the caller gathered (possibly larger
/// than `opportunities.len()` if the caller already truncated); the
/// truncation line is driven by `total`, never inferred from slice length, so
/// the formatter never silently elides entries without reporting it.
pub fn render_escalation_message(
    org_name: &str,
    opportunities: &[Opportunity],
    total: usize,
    display_cap: usize,
    work_hours_per_day: u32,
) -> String {
    let mut out = format!("ESCALATION — {org_name} ({total} overdue opportunities)\n");

    for o in opportunities.iter().take(display_cap) {
        out.push_str(&format!(
            "- #{order} | {elapsed} elapsed ({overdue} over threshold) | {customer} | {address} | supervisor: {supervisor} | status: {status}\n",
            order = o.order_num,
            elapsed = format_elapsed(o.elapsed_business_hours, work_hours_per_day),
            overdue = format_elapsed(o.overdue_hours, work_hours_per_day),
            customer = o.customer_name,
            address = o.address,
            supervisor = o.supervisor_name,
            status = o.order_status.as_str(),
        ));
    }

    if total > display_cap {
        out.push_str(&format!("{} more\n", total - display_cap));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::opportunity::OrderStatus;
    use chrono::NaiveDate;

    fn opp(order_num: &str, elapsed: f64, overdue: f64) -> Opportunity {
        Opportunity {
            order_num: order_num.to_string(),
            customer_name: "Acme".to_string(),
            address: "1 Main St".to_string(),
            supervisor_name: "J. Doe".to_string(),
            org_name: "north".to_string(),
            create_time: NaiveDate::from_ymd_opt(2026, 7, 20)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            order_status: OrderStatus::PendingAppointment,
            monitored: true,
            elapsed_business_hours: elapsed,
            reminder_due_hit: true,
            escalation_due_hit: overdue > 0.0,
            approaching_escalation: false,
            overdue_hours: overdue,
            escalation_level: if overdue > 0.0 { 1 } else { 0 },
            progress_ratio: 1.0,
            escalation_threshold_hours: 8.0,
        }
    }

    #[test]
    fn elapsed_formats_as_days_and_hours() {
        assert_eq!(format_elapsed(5.0, 10), "5h");
        assert_eq!(format_elapsed(14.0, 10), "1d 4h");
        assert_eq!(format_elapsed(0.0, 10), "0h");
    }

    #[test]
    fn reminder_message_lists_all_when_under_cap() {
        let opps = vec![opp("O-1", 5.0, 0.0), opp("O-2", 6.0, 0.0)];
        let msg = render_reminder_message("north", &opps, 5, 10);
        assert!(msg.contains("O-1"));
        assert!(msg.contains("O-2"));
        assert!(!msg.contains("more"));
    }

    #[test]
    fn escalation_message_truncates_with_more_line() {
        let opps: Vec<Opportunity> = (0..6).map(|i| opp(&format!("O-{i}"), 10.0, 2.0)).collect();
        let msg = render_escalation_message("north", &opps, 6, 5, 10);
        let listed = (0..5).filter(|i| msg.contains(&format!("O-{i}"))).count();
        assert_eq!(listed, 5);
        assert!(msg.contains("1 more"));
    }

    #[test]
    fn formatter_is_deterministic() {
        let opps = vec![opp("O-1", 5.0, 0.0)];
        let a = render_reminder_message("north", &opps, 5, 10);
        let b = render_reminder_message("north", &opps, 5, 10);
        assert_eq!(a, b);
    }
}
