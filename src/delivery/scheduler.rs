//! Send-now / defer / expire decisions.
//!
//! Quiet hours are a `[start, end)` window of local wall-clock time in the
//! user's timezone; `end < start` wraps past midnight and `start == end` is an
//! empty window. Exit instants that fall on a DST transition resolve to the
//! earliest matching instant still after `now` (fall back) or to the first
//! valid local minute after the gap (spring forward).

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::notification::{Notification, Priority};
use crate::preference::{NotificationPreferences, QuietHours};

/// Upper bound on how far a DST gap is searched, in minutes.
const MAX_GAP_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    SendNow,
    Defer(DateTime<Utc>),
    Expire,
}

pub fn schedule(notification: &Notification, prefs: &NotificationPreferences, now: DateTime<Utc>) -> Decision {
    if notification.is_expired_at(now) {
        return Decision::Expire;
    }

    if let Some(at) = notification.scheduled_for {
        if now < at {
            return Decision::Defer(at);
        }
    }

    if notification.priority == Priority::Urgent {
        return Decision::SendNow;
    }

    match quiet_hours_exit(&prefs.quiet_hours(), now) {
        Some(until) => Decision::Defer(until),
        None => Decision::SendNow,
    }
}

/// When `now` falls inside the quiet-hours window, the instant it ends.
pub fn quiet_hours_exit(quiet_hours: &QuietHours, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !quiet_hours.enabled || quiet_hours.start == quiet_hours.end {
        return None;
    }

    let local = now.with_timezone(&quiet_hours.timezone);
    let time = local.time();
    let (start, end) = (quiet_hours.start, quiet_hours.end);

    let inside = if start < end {
        time >= start && time < end
    } else {
        time >= start || time < end
    };
    if !inside {
        return None;
    }

    let today = local.date_naive();
    let exit_date = if time < end { today } else { today.succ_opt()? };

    Some(local_to_utc(&quiet_hours.timezone, exit_date.and_time(end), now))
}

fn local_to_utc(tz: &Tz, local: NaiveDateTime, now: DateTime<Utc>) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, latest) => {
            let earliest = earliest.with_timezone(&Utc);
            if earliest > now {
                earliest
            } else {
                latest.with_timezone(&Utc)
            }
        }
        LocalResult::None => {
            for minutes in 1..=MAX_GAP_MINUTES {
                if let Some(at) = tz.from_local_datetime(&(local + Duration::minutes(minutes))).earliest() {
                    return at.with_timezone(&Utc);
                }
            }
            // No zone has a day-long gap; treat the wall time as UTC.
            Utc.from_utc_datetime(&local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Channel, NewNotification, NotificationType};
    use chrono::NaiveTime;
    use uuid::Uuid;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn notification(priority: Priority) -> Notification {
        NewNotification {
            user_id: Uuid::new_v4(),
            notification_type: NotificationType::PriceDrop,
            title: "Price drop".into(),
            body: "An item on your wishlist is cheaper".into(),
            payload: None,
            channels: vec![Channel::Push],
            priority,
            expires_at: None,
            scheduled_for: None,
            batch_id: None,
            template_id: None,
        }
        .into_notification(Uuid::new_v4(), at("2024-01-01T00:00:00Z"))
    }

    fn prefs_with_quiet_hours(start: NaiveTime, end: NaiveTime, timezone: &str) -> NotificationPreferences {
        let mut prefs = NotificationPreferences::defaults(Uuid::new_v4());
        prefs.quiet_hours_enabled = true;
        prefs.quiet_hours_start = start;
        prefs.quiet_hours_end = end;
        prefs.timezone = timezone.to_string();
        prefs
    }

    #[test]
    fn test_overnight_window_defers_until_morning() {
        let prefs = prefs_with_quiet_hours(hm(22, 0), hm(8, 0), "UTC");
        let n = notification(Priority::Normal);

        assert_eq!(
            schedule(&n, &prefs, at("2024-05-10T23:30:00Z")),
            Decision::Defer(at("2024-05-11T08:00:00Z"))
        );
        assert_eq!(
            schedule(&n, &prefs, at("2024-05-11T07:59:00Z")),
            Decision::Defer(at("2024-05-11T08:00:00Z"))
        );
        assert_eq!(
            schedule(&n, &prefs, at("2024-05-10T22:00:00Z")),
            Decision::Defer(at("2024-05-11T08:00:00Z"))
        );
        assert_eq!(schedule(&n, &prefs, at("2024-05-11T09:00:00Z")), Decision::SendNow);
        // End is exclusive.
        assert_eq!(schedule(&n, &prefs, at("2024-05-11T08:00:00Z")), Decision::SendNow);
    }

    #[test]
    fn test_daytime_window() {
        let prefs = prefs_with_quiet_hours(hm(13, 0), hm(15, 0), "UTC");
        let n = notification(Priority::Low);

        assert_eq!(
            schedule(&n, &prefs, at("2024-05-10T14:00:00Z")),
            Decision::Defer(at("2024-05-10T15:00:00Z"))
        );
        assert_eq!(schedule(&n, &prefs, at("2024-05-10T12:59:00Z")), Decision::SendNow);
        assert_eq!(schedule(&n, &prefs, at("2024-05-10T23:00:00Z")), Decision::SendNow);
    }

    #[test]
    fn test_window_in_user_timezone() {
        // 23:30 EST == 04:30 UTC next day.
        let prefs = prefs_with_quiet_hours(hm(22, 0), hm(8, 0), "America/New_York");
        let n = notification(Priority::High);

        assert_eq!(
            schedule(&n, &prefs, at("2024-01-16T04:30:00Z")),
            Decision::Defer(at("2024-01-16T13:00:00Z"))
        );
        // 09:00 EST
        assert_eq!(schedule(&n, &prefs, at("2024-01-16T14:00:00Z")), Decision::SendNow);
    }

    #[test]
    fn test_urgent_bypasses_quiet_hours() {
        let prefs = prefs_with_quiet_hours(hm(22, 0), hm(8, 0), "UTC");
        let n = notification(Priority::Urgent);
        assert_eq!(schedule(&n, &prefs, at("2024-05-10T23:30:00Z")), Decision::SendNow);
    }

    #[test]
    fn test_disabled_or_empty_window_sends() {
        let mut prefs = prefs_with_quiet_hours(hm(22, 0), hm(8, 0), "UTC");
        prefs.quiet_hours_enabled = false;
        let n = notification(Priority::Normal);
        assert_eq!(schedule(&n, &prefs, at("2024-05-10T23:30:00Z")), Decision::SendNow);

        let prefs = prefs_with_quiet_hours(hm(8, 0), hm(8, 0), "UTC");
        assert_eq!(schedule(&n, &prefs, at("2024-05-10T08:00:00Z")), Decision::SendNow);
    }

    #[test]
    fn test_expiry_overrides_everything() {
        let prefs = prefs_with_quiet_hours(hm(22, 0), hm(8, 0), "UTC");
        let mut n = notification(Priority::Urgent);
        n.expires_at = Some(at("2024-05-10T12:00:00Z"));
        n.scheduled_for = Some(at("2024-05-11T12:00:00Z"));
        n.retry_count = 2;

        assert_eq!(schedule(&n, &prefs, at("2024-05-10T12:00:01Z")), Decision::Expire);
        // Not yet past expiry.
        assert_eq!(
            schedule(&n, &prefs, at("2024-05-10T11:00:00Z")),
            Decision::Defer(at("2024-05-11T12:00:00Z"))
        );
    }

    #[test]
    fn test_future_schedule_defers_even_when_urgent() {
        let prefs = NotificationPreferences::defaults(Uuid::new_v4());
        let mut n = notification(Priority::Urgent);
        n.scheduled_for = Some(at("2024-05-10T12:00:00Z"));

        assert_eq!(
            schedule(&n, &prefs, at("2024-05-10T11:00:00Z")),
            Decision::Defer(at("2024-05-10T12:00:00Z"))
        );
        assert_eq!(schedule(&n, &prefs, at("2024-05-10T12:00:00Z")), Decision::SendNow);
    }

    #[test]
    fn test_exit_inside_spring_forward_gap() {
        // New York skips 02:00-03:00 local on 2024-03-10.
        let quiet_hours = QuietHours {
            enabled: true,
            start: hm(22, 0),
            end: hm(2, 30),
            timezone: chrono_tz::America::New_York,
        };
        // 00:00 EST
        let exit = quiet_hours_exit(&quiet_hours, at("2024-03-10T05:00:00Z"));
        // First valid local time is 03:00 EDT.
        assert_eq!(exit, Some(at("2024-03-10T07:00:00Z")));
    }

    #[test]
    fn test_exit_on_fall_back_ambiguity() {
        // New York repeats 01:00-02:00 local on 2024-11-03.
        let quiet_hours = QuietHours {
            enabled: true,
            start: hm(22, 0),
            end: hm(1, 30),
            timezone: chrono_tz::America::New_York,
        };

        // 00:00 EDT: the first 01:30 (EDT) is still ahead.
        assert_eq!(
            quiet_hours_exit(&quiet_hours, at("2024-11-03T04:00:00Z")),
            Some(at("2024-11-03T05:30:00Z"))
        );
        // 01:10 EST, after the repeat began: only the second 01:30 (EST) is ahead.
        assert_eq!(
            quiet_hours_exit(&quiet_hours, at("2024-11-03T06:10:00Z")),
            Some(at("2024-11-03T06:30:00Z"))
        );
    }
}
