//! Recurrence rules deciding whether an assignment still needs doing.
//!
//! All calendar arithmetic happens in the family timezone: a `daily` chore
//! resets at local midnight and a `weekly` chore at local midnight on Sunday.
//! Completion instants are stored in UTC and converted before comparing.

use chorechart_shared::domain::Recurrence;
use chrono::{
    DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};

/// Local midnight starting the week (Sunday) that contains `now`.
pub fn week_start<Tz: TimeZone>(now: &DateTime<Tz>) -> NaiveDateTime {
    let today = now.date_naive();
    let back = Days::new(u64::from(today.weekday().num_days_from_sunday()));
    let sunday = today.checked_sub_days(back).unwrap_or(today);
    sunday.and_time(NaiveTime::MIN)
}

/// Calendar date of `at` as seen in `tz`.
pub fn local_date<Tz: TimeZone>(at: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

/// Whether an assignment with the given completion history is open at `now`.
pub fn is_open<Tz: TimeZone>(
    recurrence: Recurrence,
    completions: &[DateTime<Utc>],
    now: &DateTime<Tz>,
) -> bool {
    let tz = now.timezone();
    match recurrence {
        Recurrence::OneTime => completions.is_empty(),
        Recurrence::Daily => {
            let today = now.date_naive();
            !completions.iter().any(|c| local_date(c, &tz) == today)
        }
        Recurrence::Weekly => {
            let start = week_start(now);
            !completions
                .iter()
                .any(|c| c.with_timezone(&tz).naive_local() >= start)
        }
    }
}

/// Interprets a stored naive timestamp as UTC.
pub fn utc(ts: NaiveDateTime) -> DateTime<Utc> {
    ts.and_utc()
}

/// Stored timestamp rendered for the wire (RFC 3339, UTC, whole seconds).
pub fn rfc3339(ts: NaiveDateTime) -> String {
    ts.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chrono_tz::America::New_York;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    // Wednesday
    fn wednesday_noon() -> DateTime<Utc> {
        at(2025, 6, 11, 12, 0, 0)
    }

    #[test]
    fn week_starts_on_sunday_midnight() {
        let start = week_start(&wednesday_noon());
        assert_eq!(start, at(2025, 6, 8, 0, 0, 0).naive_utc());
        let sunday = at(2025, 6, 8, 10, 0, 0);
        assert_eq!(week_start(&sunday), at(2025, 6, 8, 0, 0, 0).naive_utc());
        let saturday = at(2025, 6, 14, 23, 59, 59);
        assert_eq!(week_start(&saturday), at(2025, 6, 8, 0, 0, 0).naive_utc());
    }

    #[test]
    fn nothing_completed_means_open() {
        let now = wednesday_noon();
        for r in [Recurrence::Daily, Recurrence::Weekly, Recurrence::OneTime] {
            assert!(is_open(r, &[], &now), "{r} should be open");
        }
    }

    #[test]
    fn daily_completed_today_is_closed() {
        let now = wednesday_noon();
        let done = [at(2025, 6, 11, 7, 30, 0)];
        assert!(!is_open(Recurrence::Daily, &done, &now));
    }

    #[test]
    fn daily_completed_yesterday_is_open() {
        let now = wednesday_noon();
        let done = [at(2025, 6, 10, 23, 59, 59)];
        assert!(is_open(Recurrence::Daily, &done, &now));
    }

    #[test]
    fn daily_uses_local_calendar_day() {
        // 01:00 EDT on the 11th; the completion was 23:00 EDT on the 10th
        let now = at(2025, 6, 11, 5, 0, 0).with_timezone(&New_York);
        let done = [at(2025, 6, 11, 3, 0, 0)];
        assert!(is_open(Recurrence::Daily, &done, &now));
        // Same instants read in UTC fall on the same day
        assert!(!is_open(Recurrence::Daily, &done, &at(2025, 6, 11, 5, 0, 0)));
    }

    #[test]
    fn weekly_completed_eight_days_ago_is_open() {
        let now = wednesday_noon();
        let done = [now - Duration::days(8)];
        assert!(is_open(Recurrence::Weekly, &done, &now));
    }

    #[test]
    fn weekly_completed_this_week_is_closed() {
        let now = wednesday_noon();
        let done = [at(2025, 6, 9, 16, 0, 0)];
        assert!(!is_open(Recurrence::Weekly, &done, &now));
    }

    #[test]
    fn weekly_completion_exactly_at_week_start_counts() {
        let now = wednesday_noon();
        assert!(!is_open(
            Recurrence::Weekly,
            &[at(2025, 6, 8, 0, 0, 0)],
            &now
        ));
        assert!(is_open(
            Recurrence::Weekly,
            &[at(2025, 6, 7, 23, 59, 59)],
            &now
        ));
    }

    #[test]
    fn one_time_stays_closed_forever() {
        let now = wednesday_noon();
        let done = [now - Duration::days(400)];
        assert!(!is_open(Recurrence::OneTime, &done, &now));
        let much_later = now + Duration::days(3650);
        assert!(!is_open(Recurrence::OneTime, &done, &much_later));
    }
}
