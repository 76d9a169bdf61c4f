//! Pure business-hours arithmetic (C1). No I/O, no config persistence —
//! callers pass in the `BusinessHoursConfig` snapshot for the current tick.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Working-hours window and working weekdays. Weekday numbers follow the
/// spec's convention: 1 = Monday ... 7 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHoursConfig {
    pub work_start_hour: u32,
    pub work_end_hour: u32,
    pub work_days: HashSet<u8>,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            work_start_hour: 9,
            work_end_hour: 19,
            work_days: [1, 2, 3, 4, 5].into_iter().collect(),
        }
    }
}

impl From<&crate::db::models::system_config::SystemConfigSnapshot> for BusinessHoursConfig {
    fn from(snapshot: &crate::db::models::system_config::SystemConfigSnapshot) -> Self {
        Self {
            work_start_hour: snapshot.work_start_hour,
            work_end_hour: snapshot.work_end_hour,
            work_days: snapshot.work_days.iter().map(|d| *d as u8).collect(),
        }
    }
}

impl BusinessHoursConfig {
    /// `workHoursPerDay = workEnd - workStart`, used by the message formatter's
    /// `Xd Yh` conversion.
    pub fn work_hours_per_day(&self) -> u32 {
        self.work_end_hour.saturating_sub(self.work_start_hour)
    }
}

fn weekday_number(date: NaiveDate) -> u8 {
    // chrono's `weekday()` is Mon-based (Mon=0); here weekdays are numbered Mon=1.
    date.weekday().num_days_from_monday() as u8 + 1
}

impl BusinessHoursConfig {
    /// True iff `t`'s weekday is a working day and its time-of-day falls in
    /// `[work_start_hour, work_end_hour)`.
    pub fn is_business_time(&self, t: NaiveDateTime) -> bool {
        if !self.work_days.contains(&weekday_number(t.date())) {
            return false;
        }
        let hour = t.hour();
        hour >= self.work_start_hour && hour < self.work_end_hour
    }

    /// Smallest `t' >= t`, truncated to the minute, such that `is_business_time(t')`.
    /// If `t` already falls inside a business window, returns `t` truncated to the minute.
    pub fn next_business_start(&self, t: NaiveDateTime) -> NaiveDateTime {
        let t = truncate_to_minute(t);
        let mut cursor_date = t.date();
        loop {
            if self.work_days.contains(&weekday_number(cursor_date)) {
                let window_start = cursor_date
                    .and_time(NaiveTime::from_hms_opt(self.work_start_hour, 0, 0).unwrap());
                let window_end =
                    cursor_date.and_time(NaiveTime::from_hms_opt(self.work_end_hour, 0, 0).unwrap());

                if cursor_date == t.date() && t >= window_start && t < window_end {
                    return t;
                }
                if cursor_date == t.date() && t < window_start {
                    return window_start;
                }
            }
            cursor_date = cursor_date.succ_opt().expect("date overflow");
        }
    }

    /// Sum of minutes lying inside business windows in `[a, b)`, divided by 60.
    /// Returns `0.0` if `a >= b`.
    pub fn business_hours_between(&self, a: NaiveDateTime, b: NaiveDateTime) -> f64 {
        let a = truncate_to_minute(a);
        let b = truncate_to_minute(b);
        if a >= b {
            return 0.0;
        }

        let mut total_minutes: i64 = 0;
        let mut day = a.date();
        while day <= b.date() {
            if self.work_days.contains(&weekday_number(day)) {
                let window_start =
                    day.and_time(NaiveTime::from_hms_opt(self.work_start_hour, 0, 0).unwrap());
                let window_end =
                    day.and_time(NaiveTime::from_hms_opt(self.work_end_hour, 0, 0).unwrap());

                let start = window_start.max(a);
                let end = window_end.min(b);
                if start < end {
                    total_minutes += (end - start).num_minutes();
                }
            }
            day = day.succ_opt().expect("date overflow");
        }

        total_minutes as f64 / 60.0
    }
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t - Duration::seconds(t.second() as i64) - Duration::nanoseconds(t.nanosecond() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cfg() -> BusinessHoursConfig {
        BusinessHoursConfig::default()
    }

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn same_instant_is_zero() {
        let t = dt(2026, 7, 27, 10, 0);
        assert_eq!(cfg().business_hours_between(t, t), 0.0);
    }

    #[test]
    fn a_greater_than_b_is_zero() {
        let a = dt(2026, 7, 27, 12, 0);
        let b = dt(2026, 7, 27, 10, 0);
        assert_eq!(cfg().business_hours_between(a, b), 0.0);
    }

    #[test]
    fn additivity_across_midpoint() {
        let a = dt(2026, 7, 27, 9, 0);
        let mid = dt(2026, 7, 28, 11, 0);
        let c = dt(2026, 7, 29, 15, 0);
        let c1 = cfg();
        let total = c1.business_hours_between(a, c);
        let split = c1.business_hours_between(a, mid) + c1.business_hours_between(mid, c);
        assert!((total - split).abs() < 1e-9);
    }

    #[test]
    fn single_day_within_window() {
        // Monday 2026-07-27, 9:00 to 13:30 -> 4.5 business hours.
        let a = dt(2026, 7, 27, 9, 0);
        let b = dt(2026, 7, 27, 13, 30);
        assert_eq!(cfg().business_hours_between(a, b), 4.5);
    }

    #[test]
    fn weekend_day_contributes_zero() {
        // Saturday 2026-07-25.
        let a = dt(2026, 7, 25, 9, 0);
        let b = dt(2026, 7, 25, 18, 0);
        assert_eq!(cfg().business_hours_between(a, b), 0.0);
    }

    #[test]
    fn spans_weekend_skips_non_working_days() {
        // Friday 17:00 to Monday 11:00: Friday 17:00-19:00 (2h) + Monday 9:00-11:00 (2h) = 4h.
        let fri = dt(2026, 7, 24, 17, 0);
        let mon = dt(2026, 7, 27, 11, 0);
        assert_eq!(cfg().business_hours_between(fri, mon), 4.0);
    }

    #[test]
    fn interval_starting_outside_and_ending_inside_window_returns_intersection_only() {
        // Monday 5:00 (before window) to Monday 11:00 -> only 9:00-11:00 counts.
        let a = dt(2026, 7, 27, 5, 0);
        let b = dt(2026, 7, 27, 11, 0);
        assert_eq!(cfg().business_hours_between(a, b), 2.0);
    }

    #[test]
    fn is_business_time_boundaries() {
        let c = cfg();
        assert!(c.is_business_time(dt(2026, 7, 27, 9, 0)));
        assert!(!c.is_business_time(dt(2026, 7, 27, 19, 0)));
        assert!(!c.is_business_time(dt(2026, 7, 27, 8, 59)));
        assert!(!c.is_business_time(dt(2026, 7, 25, 10, 0)));
    }

    #[test]
    fn next_business_start_inside_window_is_identity() {
        let t = dt(2026, 7, 27, 10, 30);
        assert_eq!(cfg().next_business_start(t), t);
    }

    #[test]
    fn next_business_start_before_window_same_day() {
        let t = dt(2026, 7, 27, 3, 0);
        assert_eq!(cfg().next_business_start(t), dt(2026, 7, 27, 9, 0));
    }

    #[test]
    fn next_business_start_after_window_rolls_to_next_working_day() {
        // Friday 20:00 -> Monday 9:00.
        let t = dt(2026, 7, 24, 20, 0);
        assert_eq!(cfg().next_business_start(t), dt(2026, 7, 27, 9, 0));
    }
}
