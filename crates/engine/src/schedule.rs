//! Digest trigger schedule.
//!
//! Five fixed wall-clock triggers, minute resolution, UTC:
//! hourly on the hour; daily at 10:00; weekly Monday 10:00; monthly on the
//! 1st at 10:00; staff digest daily at 09:30. The trigger table is built by
//! [`default_triggers`] and handed to the scheduler at construction, so the
//! schedule is explicit configuration rather than process-wide state.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};

use courier_common::types::{DigestInterval, DigestJobKind};

/// One of the fixed periodic triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Staff,
}

impl Trigger {
    /// Whether this trigger fires in the wall-clock minute containing `t`.
    ///
    /// The scheduler ticks once per minute and calls this with the
    /// minute-truncated time, so a trigger fires at most once per matching
    /// minute.
    pub fn matches_minute(&self, t: DateTime<Utc>) -> bool {
        match self {
            Trigger::Hourly => t.minute() == 0,
            Trigger::Daily => t.hour() == 10 && t.minute() == 0,
            Trigger::Weekly => {
                t.weekday() == Weekday::Mon && t.hour() == 10 && t.minute() == 0
            }
            Trigger::Monthly => t.day() == 1 && t.hour() == 10 && t.minute() == 0,
            Trigger::Staff => t.hour() == 9 && t.minute() == 30,
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Hourly => write!(f, "hourly"),
            Trigger::Daily => write!(f, "daily"),
            Trigger::Weekly => write!(f, "weekly"),
            Trigger::Monthly => write!(f, "monthly"),
            Trigger::Staff => write!(f, "staff"),
        }
    }
}

/// Which users a trigger addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Users whose digest preference matches, and who have at least one
    /// unread notification.
    Preference(DigestInterval),
    /// All staff users, regardless of preference or unread count.
    Staff,
}

/// A trigger plus everything the enqueued jobs need to carry.
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    pub trigger: Trigger,
    pub audience: Audience,
    pub subject: String,
    /// The interval the digest covers.
    pub window: Duration,
    pub kind: DigestJobKind,
}

/// The production trigger table.
pub fn default_triggers() -> Vec<TriggerSpec> {
    vec![
        TriggerSpec {
            trigger: Trigger::Hourly,
            audience: Audience::Preference(DigestInterval::Hourly),
            subject: "Hourly Digest".to_string(),
            window: Duration::hours(1),
            kind: DigestJobKind::Activity,
        },
        TriggerSpec {
            trigger: Trigger::Daily,
            audience: Audience::Preference(DigestInterval::Daily),
            subject: "Daily Digest".to_string(),
            window: Duration::days(1),
            kind: DigestJobKind::Activity,
        },
        TriggerSpec {
            trigger: Trigger::Weekly,
            audience: Audience::Preference(DigestInterval::Weekly),
            subject: "Weekly Digest".to_string(),
            window: Duration::weeks(1),
            kind: DigestJobKind::Activity,
        },
        TriggerSpec {
            trigger: Trigger::Monthly,
            audience: Audience::Preference(DigestInterval::Monthly),
            subject: "Monthly Digest".to_string(),
            window: Duration::days(30),
            kind: DigestJobKind::Activity,
        },
        TriggerSpec {
            trigger: Trigger::Staff,
            audience: Audience::Staff,
            subject: "Daily Staff Digest".to_string(),
            window: Duration::days(1),
            kind: DigestJobKind::Staff,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_hourly_fires_on_the_hour() {
        assert!(Trigger::Hourly.matches_minute(at(2026, 3, 4, 17, 0)));
        assert!(!Trigger::Hourly.matches_minute(at(2026, 3, 4, 17, 1)));
        assert!(!Trigger::Hourly.matches_minute(at(2026, 3, 4, 17, 59)));
    }

    #[test]
    fn test_daily_fires_at_ten() {
        assert!(Trigger::Daily.matches_minute(at(2026, 3, 4, 10, 0)));
        assert!(!Trigger::Daily.matches_minute(at(2026, 3, 4, 9, 0)));
        assert!(!Trigger::Daily.matches_minute(at(2026, 3, 4, 10, 30)));
    }

    #[test]
    fn test_weekly_fires_monday_ten() {
        // 2026-03-02 is a Monday
        assert!(Trigger::Weekly.matches_minute(at(2026, 3, 2, 10, 0)));
        // Tuesday at the same time does not fire
        assert!(!Trigger::Weekly.matches_minute(at(2026, 3, 3, 10, 0)));
        // Monday at a different hour does not fire
        assert!(!Trigger::Weekly.matches_minute(at(2026, 3, 2, 11, 0)));
    }

    #[test]
    fn test_monthly_fires_first_of_month_ten() {
        assert!(Trigger::Monthly.matches_minute(at(2026, 3, 1, 10, 0)));
        assert!(!Trigger::Monthly.matches_minute(at(2026, 3, 2, 10, 0)));
        assert!(!Trigger::Monthly.matches_minute(at(2026, 3, 1, 10, 1)));
    }

    #[test]
    fn test_staff_fires_daily_nine_thirty() {
        assert!(Trigger::Staff.matches_minute(at(2026, 3, 4, 9, 30)));
        assert!(!Trigger::Staff.matches_minute(at(2026, 3, 4, 9, 29)));
        assert!(!Trigger::Staff.matches_minute(at(2026, 3, 4, 10, 30)));
    }

    #[test]
    fn test_default_table_covers_all_triggers() {
        let triggers = default_triggers();
        assert_eq!(triggers.len(), 5);

        // Each preference interval other than `none` is addressed by exactly
        // one trigger.
        for interval in [
            DigestInterval::Hourly,
            DigestInterval::Daily,
            DigestInterval::Weekly,
            DigestInterval::Monthly,
        ] {
            let count = triggers
                .iter()
                .filter(|s| s.audience == Audience::Preference(interval))
                .count();
            assert_eq!(count, 1, "interval {interval} should have one trigger");
        }

        let staff: Vec<_> = triggers
            .iter()
            .filter(|s| s.audience == Audience::Staff)
            .collect();
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].kind, DigestJobKind::Staff);
    }

    #[test]
    fn test_only_expected_triggers_fire_at_ten_on_the_first() {
        // Monthly 1st 10:00 also satisfies hourly and daily; weekly only if
        // it happens to be a Monday. 2026-06-01 is a Monday, 2026-03-01 is a
        // Sunday.
        let sunday_first = at(2026, 3, 1, 10, 0);
        let fired: Vec<Trigger> = default_triggers()
            .iter()
            .map(|s| s.trigger)
            .filter(|t| t.matches_minute(sunday_first))
            .collect();
        assert_eq!(fired, vec![Trigger::Hourly, Trigger::Daily, Trigger::Monthly]);
    }
}
