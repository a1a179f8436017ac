//! Derived numbers for profile and admin views: streaks, weekly progress,
//! per-day history, analytics windows and the completions CSV.

use std::collections::{BTreeMap, HashMap, HashSet};

use chorechart_shared::domain::{Recurrence, Timeframe};
use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::schedule;
use crate::storage::models::CompletedChore;

const STREAK_LOOKBACK_DAYS: u64 = 30;

/// Consecutive local days with at least one completion, counting back from
/// today. A today without completions does not break the streak.
pub fn streak_days<Tz: TimeZone>(completions: &[CompletedChore], now: &DateTime<Tz>) -> u32 {
    let tz = now.timezone();
    let days: HashSet<NaiveDate> = completions
        .iter()
        .map(|c| schedule::local_date(&schedule::utc(c.completed_at), &tz))
        .collect();
    let today = now.date_naive();
    let mut streak = 0;
    for back in 0..STREAK_LOOKBACK_DAYS {
        let Some(day) = today.checked_sub_days(Days::new(back)) else {
            break;
        };
        if days.contains(&day) {
            streak += 1;
        } else if back > 0 {
            break;
        }
    }
    streak
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyProgress {
    pub completed: u32,
    pub points: i32,
    pub expected: u32,
    /// Percentage; may exceed 100 when chores are done more than expected.
    pub rate: u32,
}

/// Progress since the start of the current local week for a user whose
/// assignments have the given recurrences.
pub fn weekly_progress<Tz: TimeZone>(
    completions: &[CompletedChore],
    assigned: &[Recurrence],
    now: &DateTime<Tz>,
) -> WeeklyProgress {
    let tz = now.timezone();
    let start = schedule::week_start(now);
    let this_week: Vec<&CompletedChore> = completions
        .iter()
        .filter(|c| schedule::utc(c.completed_at).with_timezone(&tz).naive_local() >= start)
        .collect();

    let days_elapsed = now.weekday().num_days_from_sunday() + 1;
    let daily = count_of(assigned, Recurrence::Daily);
    let weekly = count_of(assigned, Recurrence::Weekly);
    let expected = daily * days_elapsed + weekly;
    let completed = this_week.len() as u32;
    let rate = if expected == 0 {
        100
    } else {
        percent(completed, expected)
    };
    WeeklyProgress {
        completed,
        points: this_week.iter().map(|c| c.points_earned).sum(),
        expected,
        rate,
    }
}

/// Lower bound for history views: the last 7 / 30 / 365 days.
pub fn history_since(timeframe: Timeframe, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match timeframe {
        Timeframe::All => None,
        Timeframe::Week => Some(now - Duration::days(7)),
        Timeframe::Month => Some(now - Duration::days(30)),
        Timeframe::Year => Some(now - Duration::days(365)),
    }
}

/// Lower bound for analytics: local midnight one week, one calendar month or
/// one year before today.
pub fn analytics_since<Tz: TimeZone>(timeframe: Timeframe, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let day = match timeframe {
        Timeframe::All => return None,
        Timeframe::Week => today.checked_sub_days(Days::new(7)),
        Timeframe::Month => today.checked_sub_months(Months::new(1)),
        Timeframe::Year => today.checked_sub_months(Months::new(12)),
    }?;
    now.timezone()
        .from_local_datetime(&day.and_time(NaiveTime::MIN))
        .earliest()
        .map(|d| d.with_timezone(&Utc))
}

/// Groups completions by local calendar day, newest day first, with the
/// points earned on each day.
pub fn group_by_day<Tz: TimeZone>(
    completions: Vec<CompletedChore>,
    tz: &Tz,
) -> Vec<(NaiveDate, i32, Vec<CompletedChore>)> {
    let mut days: BTreeMap<NaiveDate, Vec<CompletedChore>> = BTreeMap::new();
    for c in completions {
        let day = schedule::local_date(&schedule::utc(c.completed_at), tz);
        days.entry(day).or_default().push(c);
    }
    days.into_iter()
        .rev()
        .map(|(day, mut items)| {
            items.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
            let points = items.iter().map(|c| c.points_earned).sum();
            (day, points, items)
        })
        .collect()
}

/// Completions an assignee is expected to make over an analytics window.
/// `All` is measured like a year.
pub fn expected_completions(timeframe: Timeframe, daily: u32, weekly: u32) -> u32 {
    match timeframe {
        Timeframe::Week => daily * 7 + weekly,
        Timeframe::Month => daily * 30 + weekly * 4,
        Timeframe::Year | Timeframe::All => daily * 365 + weekly * 52,
    }
}

/// Rate for the analytics view, capped at 100 and 0 when nothing is expected.
pub fn capped_rate(actual: u32, expected: u32) -> u32 {
    if expected == 0 {
        0
    } else {
        percent(actual, expected).min(100)
    }
}

/// Completions per recurrence category. Completions of chores that no
/// longer exist are not counted.
pub fn completions_by_recurrence(
    completions: &[CompletedChore],
    recurrence_of: &HashMap<String, Recurrence>,
) -> Vec<(Recurrence, u32)> {
    let mut counts: Vec<(Recurrence, u32)> = vec![
        (Recurrence::Daily, 0),
        (Recurrence::Weekly, 0),
        (Recurrence::OneTime, 0),
    ];
    for c in completions {
        if let Some(r) = recurrence_of.get(&c.chore_instance_id)
            && let Some(slot) = counts.iter_mut().find(|(k, _)| k == r)
        {
            slot.1 += 1;
        }
    }
    counts.retain(|(_, n)| *n > 0);
    counts
}

/// Renders `User,Chore,Completed At,Points` rows.
pub fn completions_csv(
    completions: &[CompletedChore],
    user_names: &HashMap<String, String>,
    chore_titles: &HashMap<String, String>,
) -> Result<Vec<u8>, csv::Error> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["User", "Chore", "Completed At", "Points"])?;
    for c in completions {
        let user = user_names
            .get(&c.user_id)
            .map(String::as_str)
            .unwrap_or("Unknown");
        let chore = chore_titles
            .get(&c.chore_instance_id)
            .map(String::as_str)
            .unwrap_or("Unknown");
        let at = schedule::rfc3339(c.completed_at);
        let points = c.points_earned.to_string();
        w.write_record([user, chore, at.as_str(), points.as_str()])?;
    }
    w.into_inner().map_err(|e| e.into_error().into())
}

fn count_of(assigned: &[Recurrence], kind: Recurrence) -> u32 {
    assigned.iter().filter(|r| **r == kind).count() as u32
}

fn percent(part: u32, whole: u32) -> u32 {
    (f64::from(part) * 100.0 / f64::from(whole)).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().naive_utc()
    }

    fn done(chore: &str, user: &str, at: NaiveDateTime, points: i32) -> CompletedChore {
        CompletedChore {
            id: format!("{chore}-{user}-{at}"),
            chore_instance_id: chore.into(),
            user_id: user.into(),
            completed_at: at,
            points_earned: points,
            created_at: at,
            updated_at: at,
        }
    }

    // Wednesday 2025-06-11 18:00 UTC
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 11, 18, 0, 0).unwrap()
    }

    #[test]
    fn streak_counts_back_and_tolerates_empty_today() {
        let history = vec![
            done("a", "u", ts(2025, 6, 10, 9), 5),
            done("a", "u", ts(2025, 6, 9, 9), 5),
            done("b", "u", ts(2025, 6, 9, 12), 5),
            // gap on the 8th
            done("a", "u", ts(2025, 6, 7, 9), 5),
        ];
        assert_eq!(streak_days(&history, &now()), 2);

        let mut with_today = history.clone();
        with_today.push(done("a", "u", ts(2025, 6, 11, 8), 5));
        assert_eq!(streak_days(&with_today, &now()), 3);

        assert_eq!(streak_days(&[], &now()), 0);
    }

    #[test]
    fn streak_breaks_when_yesterday_is_missing() {
        let history = vec![done("a", "u", ts(2025, 6, 9, 9), 5)];
        assert_eq!(streak_days(&history, &now()), 0);
    }

    #[test]
    fn weekly_progress_counts_since_sunday() {
        let history = vec![
            done("a", "u", ts(2025, 6, 7, 9), 10), // last Saturday
            done("a", "u", ts(2025, 6, 8, 9), 10),
            done("a", "u", ts(2025, 6, 10, 9), 10),
            done("w", "u", ts(2025, 6, 11, 9), 25),
        ];
        let assigned = [Recurrence::Daily, Recurrence::Weekly, Recurrence::OneTime];
        let p = weekly_progress(&history, &assigned, &now());
        assert_eq!(p.completed, 3);
        assert_eq!(p.points, 45);
        // Wednesday: 4 days elapsed for the daily chore plus one weekly
        assert_eq!(p.expected, 5);
        assert_eq!(p.rate, 60);
    }

    #[test]
    fn weekly_progress_without_expectations_is_full() {
        let p = weekly_progress(&[], &[Recurrence::OneTime], &now());
        assert_eq!(p.expected, 0);
        assert_eq!(p.rate, 100);
    }

    #[test]
    fn history_windows() {
        assert_eq!(history_since(Timeframe::All, now()), None);
        assert_eq!(
            history_since(Timeframe::Week, now()),
            Some(Utc.with_ymd_and_hms(2025, 6, 4, 18, 0, 0).unwrap())
        );
        assert_eq!(
            history_since(Timeframe::Month, now()),
            Some(Utc.with_ymd_and_hms(2025, 5, 12, 18, 0, 0).unwrap())
        );
    }

    #[test]
    fn analytics_windows_start_at_local_midnight() {
        assert_eq!(
            analytics_since(Timeframe::Week, &now()),
            Some(Utc.with_ymd_and_hms(2025, 6, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(
            analytics_since(Timeframe::Month, &now()),
            Some(Utc.with_ymd_and_hms(2025, 5, 11, 0, 0, 0).unwrap())
        );
        assert_eq!(
            analytics_since(Timeframe::Year, &now()),
            Some(Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap())
        );
        let warsaw = now().with_timezone(&chrono_tz::Europe::Warsaw);
        assert_eq!(
            analytics_since(Timeframe::Week, &warsaw),
            Some(Utc.with_ymd_and_hms(2025, 6, 3, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn groups_history_by_local_day_newest_first() {
        let history = vec![
            done("a", "u", ts(2025, 6, 10, 9), 5),
            done("b", "u", ts(2025, 6, 11, 2), 10),
            done("c", "u", ts(2025, 6, 11, 8), 3),
        ];
        let days = group_by_day(history.clone(), &Utc);
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].0, NaiveDate::from_ymd_opt(2025, 6, 11).unwrap());
        assert_eq!(days[0].1, 13);
        assert_eq!(days[0].2[0].chore_instance_id, "c");
        assert_eq!(days[1].1, 5);

        // 02:00 UTC on the 11th is still the 10th in New York
        let ny = group_by_day(history, &chrono_tz::America::New_York);
        assert_eq!(ny[0].1, 3);
        assert_eq!(ny[1].1, 15);
    }

    #[test]
    fn expected_and_capped_rates() {
        assert_eq!(expected_completions(Timeframe::Week, 2, 1), 15);
        assert_eq!(expected_completions(Timeframe::Month, 1, 1), 34);
        assert_eq!(expected_completions(Timeframe::Year, 1, 1), 417);
        assert_eq!(capped_rate(3, 0), 0);
        assert_eq!(capped_rate(2, 3), 67);
        assert_eq!(capped_rate(30, 15), 100);
    }

    #[test]
    fn recurrence_counts_skip_deleted_chores() {
        let recurrence_of = HashMap::from([
            ("a".to_string(), Recurrence::Daily),
            ("w".to_string(), Recurrence::Weekly),
        ]);
        let history = vec![
            done("a", "u", ts(2025, 6, 10, 9), 5),
            done("a", "v", ts(2025, 6, 10, 9), 5),
            done("w", "u", ts(2025, 6, 10, 9), 5),
            done("gone", "u", ts(2025, 6, 10, 9), 5),
        ];
        assert_eq!(
            completions_by_recurrence(&history, &recurrence_of),
            vec![(Recurrence::Daily, 2), (Recurrence::Weekly, 1)]
        );
    }

    #[test]
    fn csv_has_header_and_unknown_fallbacks() {
        let names = HashMap::from([("u".to_string(), "Emma".to_string())]);
        let titles = HashMap::from([("a".to_string(), "Make bed, tidy".to_string())]);
        let rows = vec![
            done("a", "u", ts(2025, 6, 10, 9), 5),
            done("gone", "ghost", ts(2025, 6, 9, 9), 7),
        ];
        let out = String::from_utf8(completions_csv(&rows, &names, &titles).unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "User,Chore,Completed At,Points");
        assert_eq!(lines[1], "Emma,\"Make bed, tidy\",2025-06-10T09:00:00Z,5");
        assert_eq!(lines[2], "Unknown,Unknown,2025-06-09T09:00:00Z,7");
    }
}
