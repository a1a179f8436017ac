use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chorechart_shared::api;
use chorechart_shared::auth::Role;
use chorechart_shared::domain::{Recurrence, Timeframe};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use super::chores::{chore_titles, completion_dto};
use super::users::require_user;
use super::{ApiQuery, AppError, AppState};
use crate::stats;

fn timeframe_label(tf: Timeframe) -> &'static str {
    match tf {
        Timeframe::All => "all",
        Timeframe::Week => "week",
        Timeframe::Month => "month",
        Timeframe::Year => "year",
    }
}

pub async fn api_user_completions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<api::TimeframeQuery>,
) -> Result<Json<Vec<api::CompletionDto>>, AppError> {
    require_user(&state, &id).await?;
    let since = stats::history_since(q.timeframe.unwrap_or_default(), Utc::now());
    let rows = state
        .store
        .list_completions(Some(&id), since.map(|d| d.naive_utc()), None)
        .await?;
    let titles = chore_titles(&state).await?;
    Ok(Json(
        rows.into_iter()
            .map(|c| {
                let title = titles.get(&c.chore_instance_id).cloned();
                completion_dto(c, title)
            })
            .collect(),
    ))
}

pub async fn api_user_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<api::TimeframeQuery>,
) -> Result<Json<Vec<api::HistoryDayDto>>, AppError> {
    require_user(&state, &id).await?;
    let since = stats::history_since(q.timeframe.unwrap_or_default(), Utc::now());
    let rows = state
        .store
        .list_completions(Some(&id), since.map(|d| d.naive_utc()), None)
        .await?;
    let titles = chore_titles(&state).await?;
    let days = stats::group_by_day(rows, &state.config.timezone)
        .into_iter()
        .map(|(date, points, items)| api::HistoryDayDto {
            date: date.format("%Y-%m-%d").to_string(),
            points,
            completions: items
                .into_iter()
                .map(|c| {
                    let title = titles.get(&c.chore_instance_id).cloned();
                    completion_dto(c, title)
                })
                .collect(),
        })
        .collect();
    Ok(Json(days))
}

pub async fn api_user_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::UserStatsDto>, AppError> {
    let user = require_user(&state, &id).await?;
    let now_utc = Utc::now();
    let now = now_utc.with_timezone(&state.config.timezone);
    // Enough history for the streak window and the current week
    let since = (now_utc - Duration::days(31)).naive_utc();
    let recent = state
        .store
        .list_completions(Some(&id), Some(since), None)
        .await?;
    let assigned = state
        .store
        .list_assignments(Some(&id))
        .await?
        .into_iter()
        .map(|r| r.chore.recurrence())
        .collect::<Result<Vec<_>, _>>()?;

    let progress = stats::weekly_progress(&recent, &assigned, &now);
    Ok(Json(api::UserStatsDto {
        user_id: user.id,
        points: user.points,
        streak_days: stats::streak_days(&recent, &now),
        completed_this_week: progress.completed,
        points_this_week: progress.points,
        expected_this_week: progress.expected,
        completion_rate: progress.rate,
    }))
}

pub async fn api_analytics(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<api::TimeframeQuery>,
) -> Result<Json<api::AnalyticsDto>, AppError> {
    let timeframe = q.timeframe.unwrap_or_default();
    let now_utc = Utc::now();
    let now = now_utc.with_timezone(&state.config.timezone);
    let since = stats::analytics_since(timeframe, &now);
    let completions = state
        .store
        .list_completions(None, since.map(|d| d.naive_utc()), None)
        .await?;

    let recurrence_of: HashMap<String, Recurrence> = state
        .store
        .list_chores()
        .await?
        .into_iter()
        .map(|(c, _)| c.recurrence().map(|r| (c.id, r)))
        .collect::<Result<_, _>>()?;

    let mut assigned: HashMap<String, (u32, u32)> = HashMap::new();
    for row in state.store.list_assignments(None).await? {
        let slot = assigned.entry(row.assignment.user_id.clone()).or_default();
        match row.chore.recurrence()? {
            Recurrence::Daily => slot.0 += 1,
            Recurrence::Weekly => slot.1 += 1,
            Recurrence::OneTime => {}
        }
    }

    let mut points_by_user = Vec::new();
    let mut completion_rates = Vec::new();
    for user in state.store.list_users().await? {
        if user.role()? != Role::Child {
            continue;
        }
        let mine: Vec<_> = completions.iter().filter(|c| c.user_id == user.id).collect();
        let (daily, weekly) = assigned.get(&user.id).copied().unwrap_or_default();
        let expected = stats::expected_completions(timeframe, daily, weekly);
        let actual = mine.len() as u32;
        completion_rates.push(api::CompletionRateDto {
            user_id: user.id.clone(),
            name: user.name.clone(),
            expected,
            actual,
            rate: stats::capped_rate(actual, expected),
        });
        points_by_user.push(api::UserPointsDto {
            points: mine.iter().map(|c| c.points_earned).sum(),
            user_id: user.id,
            name: user.name,
            avatar: user.avatar,
        });
    }

    let completions_by_recurrence = stats::completions_by_recurrence(&completions, &recurrence_of)
        .into_iter()
        .map(|(recurrence, completions)| api::RecurrenceCountDto {
            recurrence,
            completions,
        })
        .collect();

    Ok(Json(api::AnalyticsDto {
        timeframe,
        from: since
            .unwrap_or(DateTime::UNIX_EPOCH)
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        to: now_utc.to_rfc3339_opts(SecondsFormat::Secs, true),
        points_by_user,
        completions_by_recurrence,
        completion_rates,
    }))
}

pub async fn api_completions_csv(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<api::TimeframeQuery>,
) -> Result<Response, AppError> {
    let timeframe = q.timeframe.unwrap_or_default();
    let now = Utc::now().with_timezone(&state.config.timezone);
    let since = stats::analytics_since(timeframe, &now);
    let completions = state
        .store
        .list_completions(None, since.map(|d| d.naive_utc()), None)
        .await?;
    let names: HashMap<String, String> = state
        .store
        .list_users()
        .await?
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();
    let titles = chore_titles(&state).await?;
    let body = stats::completions_csv(&completions, &names, &titles).map_err(AppError::internal)?;
    let filename = format!(
        "chore-data-{}-{}.csv",
        timeframe_label(timeframe),
        now.format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}
