use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;
use crate::domain::{RedemptionStatus, Timeframe};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn timeframe_param(tf: Timeframe) -> &'static str {
    match tf {
        Timeframe::All => "all",
        Timeframe::Week => "week",
        Timeframe::Month => "month",
        Timeframe::Year => "year",
    }
}

fn user_scoped(base: &str, user_id: &str, suffix: &str) -> String {
    base_join(
        base,
        &format!("{}/users/{}/{}", API_V1_PREFIX, enc(user_id), suffix),
    )
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn auth_logout(base: &str) -> String {
    base_join(base, &format!("{}/auth/logout", API_V1_PREFIX))
}
pub fn me(base: &str) -> String {
    base_join(base, &format!("{}/me", API_V1_PREFIX))
}
pub fn users(base: &str) -> String {
    base_join(base, &format!("{}/users", API_V1_PREFIX))
}
pub fn user(base: &str, user_id: &str) -> String {
    base_join(base, &format!("{}/users/{}", API_V1_PREFIX, enc(user_id)))
}
pub fn user_chores(base: &str, user_id: &str, only_open: bool) -> String {
    let url = user_scoped(base, user_id, "chores");
    if only_open {
        format!("{url}?open=true")
    } else {
        url
    }
}
pub fn user_chore_complete(base: &str, user_id: &str, chore_id: &str) -> String {
    user_scoped(base, user_id, &format!("chores/{}/complete", enc(chore_id)))
}
pub fn user_completions(base: &str, user_id: &str, timeframe: Timeframe) -> String {
    format!(
        "{}?timeframe={}",
        user_scoped(base, user_id, "completions"),
        timeframe_param(timeframe)
    )
}
pub fn user_history(base: &str, user_id: &str, timeframe: Timeframe) -> String {
    format!(
        "{}?timeframe={}",
        user_scoped(base, user_id, "history"),
        timeframe_param(timeframe)
    )
}
pub fn user_stats(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "stats")
}
pub fn user_redemptions(base: &str, user_id: &str) -> String {
    user_scoped(base, user_id, "redemptions")
}
pub fn chores(base: &str) -> String {
    base_join(base, &format!("{}/chores", API_V1_PREFIX))
}
pub fn chore(base: &str, chore_id: &str) -> String {
    base_join(base, &format!("{}/chores/{}", API_V1_PREFIX, enc(chore_id)))
}
pub fn assignments(base: &str) -> String {
    base_join(base, &format!("{}/assignments", API_V1_PREFIX))
}
pub fn completion(base: &str, completion_id: &str) -> String {
    base_join(
        base,
        &format!("{}/completions/{}", API_V1_PREFIX, enc(completion_id)),
    )
}
pub fn rewards(base: &str) -> String {
    base_join(base, &format!("{}/rewards", API_V1_PREFIX))
}
pub fn reward(base: &str, reward_id: &str) -> String {
    base_join(base, &format!("{}/rewards/{}", API_V1_PREFIX, enc(reward_id)))
}
pub fn redemptions(base: &str, status: Option<RedemptionStatus>) -> String {
    let url = base_join(base, &format!("{}/redemptions", API_V1_PREFIX));
    match status {
        Some(s) => format!("{url}?status={}", s.as_str()),
        None => url,
    }
}
pub fn redemption_approve(base: &str, redemption_id: &str) -> String {
    base_join(
        base,
        &format!("{}/redemptions/{}/approve", API_V1_PREFIX, enc(redemption_id)),
    )
}
pub fn redemption_deny(base: &str, redemption_id: &str) -> String {
    base_join(
        base,
        &format!("{}/redemptions/{}/deny", API_V1_PREFIX, enc(redemption_id)),
    )
}
pub fn analytics(base: &str, timeframe: Timeframe) -> String {
    base_join(
        base,
        &format!(
            "{}/reports/analytics?timeframe={}",
            API_V1_PREFIX,
            timeframe_param(timeframe)
        ),
    )
}
pub fn completions_csv(base: &str, timeframe: Timeframe) -> String {
    base_join(
        base,
        &format!(
            "{}/reports/completions.csv?timeframe={}",
            API_V1_PREFIX,
            timeframe_param(timeframe)
        ),
    )
}

pub fn version(base: &str) -> String {
    base_join(base, "/api/version")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_double_slashes_and_encodes_ids() {
        assert_eq!(
            auth_login("http://localhost:5151/"),
            "http://localhost:5151/api/v1/auth/login"
        );
        assert_eq!(
            user_chore_complete("http://h", "al ex", "c/1"),
            "http://h/api/v1/users/al%20ex/chores/c%2F1/complete"
        );
        assert_eq!(
            redemptions("http://h", Some(RedemptionStatus::Pending)),
            "http://h/api/v1/redemptions?status=pending"
        );
        assert_eq!(
            user_history("http://h", "emma", Timeframe::Month),
            "http://h/api/v1/users/emma/history?timeframe=month"
        );
    }
}
