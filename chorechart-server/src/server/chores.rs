use std::collections::HashMap;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use chorechart_shared::api;
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::info;

use super::auth::AuthCtx;
use super::users::require_user;
use super::{ApiJson, ApiQuery, AppError, AppState};
use crate::schedule::{self, rfc3339};
use crate::storage::AssignmentRow;
use crate::storage::models::{ChoreDraft, ChoreInstance, ChorePatch, CompletedChore};

pub(super) fn chore_dto(c: ChoreInstance, assigned_to: Vec<String>) -> Result<api::ChoreDto, AppError> {
    let recurrence = c.recurrence().map_err(AppError::internal)?;
    Ok(api::ChoreDto {
        id: c.id,
        title: c.title,
        description: c.description,
        point_value: c.point_value,
        recurrence,
        due_date: c.due_date.map(rfc3339),
        assigned_to,
        created_at: rfc3339(c.created_at),
        updated_at: rfc3339(c.updated_at),
    })
}

pub(super) fn completion_dto(c: CompletedChore, chore_title: Option<String>) -> api::CompletionDto {
    api::CompletionDto {
        id: c.id,
        chore_instance_id: c.chore_instance_id,
        chore_title,
        user_id: c.user_id,
        completed_at: rfc3339(c.completed_at),
        points_earned: c.points_earned,
    }
}

/// Chore id to title, for labelling completions.
pub(super) async fn chore_titles(state: &AppState) -> Result<HashMap<String, String>, AppError> {
    Ok(state
        .store
        .list_chores()
        .await?
        .into_iter()
        .map(|(c, _)| (c.id, c.title))
        .collect())
}

fn assignment_dto(row: AssignmentRow, now: &DateTime<chrono_tz::Tz>) -> Result<api::AssignmentDto, AppError> {
    let recurrence = row.chore.recurrence().map_err(AppError::internal)?;
    let history: Vec<DateTime<Utc>> = row.completions.iter().copied().map(schedule::utc).collect();
    let open = schedule::is_open(recurrence, &history, now);
    Ok(api::AssignmentDto {
        id: row.assignment.id,
        user_id: row.assignment.user_id,
        chore_instance_id: row.chore.id,
        title: row.chore.title,
        description: row.chore.description,
        point_value: row.chore.point_value,
        recurrence,
        due_date: row.chore.due_date.map(rfc3339),
        open,
        last_completed_at: row.completions.iter().max().copied().map(rfc3339),
    })
}

fn parse_due_date(raw: Option<&str>) -> Result<Option<NaiveDateTime>, AppError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|d| d.naive_utc())
            .map_err(|e| AppError::bad_request(format!("invalid due_date: {e}")))
    })
    .transpose()
}

fn check_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        Err(AppError::bad_request("title is required"))
    } else {
        Ok(())
    }
}

fn check_point_value(points: i32) -> Result<(), AppError> {
    if points <= 0 {
        Err(AppError::bad_request("point_value must be positive"))
    } else {
        Ok(())
    }
}

pub async fn api_list_chores(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::ChoreDto>>, AppError> {
    let rows = state.store.list_chores().await?;
    let items = rows
        .into_iter()
        .map(|(c, users)| chore_dto(c, users))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub async fn api_get_chore(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::ChoreDto>, AppError> {
    let (c, users) = state
        .store
        .get_chore(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("chore not found: {id}")))?;
    Ok(Json(chore_dto(c, users)?))
}

pub async fn api_create_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    ApiJson(body): ApiJson<api::CreateChoreReq>,
) -> Result<(StatusCode, Json<api::ChoreDto>), AppError> {
    check_title(&body.title)?;
    check_point_value(body.point_value)?;
    if body.assigned_to.is_empty() {
        return Err(AppError::bad_request("assign the chore to at least one user"));
    }
    let draft = ChoreDraft {
        title: body.title.trim().to_string(),
        description: body.description,
        point_value: body.point_value,
        recurrence: body.recurrence,
        due_date: parse_due_date(body.due_date.as_deref())?,
    };
    let (c, users) = state.store.create_chore(draft, body.assigned_to).await?;
    info!(
        by = %auth.user_id,
        chore_id = %c.id,
        assignees = users.len(),
        "chore created"
    );
    Ok((StatusCode::CREATED, Json(chore_dto(c, users)?)))
}

pub async fn api_update_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<api::UpdateChoreReq>,
) -> Result<Json<api::ChoreDto>, AppError> {
    if let Some(t) = &body.title {
        check_title(t)?;
    }
    if let Some(p) = body.point_value {
        check_point_value(p)?;
    }
    if matches!(&body.assigned_to, Some(a) if a.is_empty()) {
        return Err(AppError::bad_request("assign the chore to at least one user"));
    }
    let patch = ChorePatch {
        title: body.title.map(|t| t.trim().to_string()),
        description: body.description,
        point_value: body.point_value,
        recurrence: body.recurrence,
        due_date: parse_due_date(body.due_date.as_deref())?,
    };
    let (c, users) = state.store.update_chore(&id, patch, body.assigned_to).await?;
    info!(by = %auth.user_id, chore_id = %c.id, "chore updated");
    Ok(Json(chore_dto(c, users)?))
}

pub async fn api_delete_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_chore(&id).await? {
        return Err(AppError::not_found(format!("chore not found: {id}")));
    }
    info!(by = %auth.user_id, chore_id = %id, "chore deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn api_user_chores(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<api::OpenQuery>,
) -> Result<Json<Vec<api::AssignmentDto>>, AppError> {
    require_user(&state, &id).await?;
    let now = Utc::now().with_timezone(&state.config.timezone);
    let rows = state.store.list_assignments(Some(&id)).await?;
    let mut items = rows
        .into_iter()
        .map(|r| assignment_dto(r, &now))
        .collect::<Result<Vec<_>, _>>()?;
    if q.open.unwrap_or(false) {
        items.retain(|a| a.open);
    }
    Ok(Json(items))
}

pub async fn api_list_assignments(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::AssignmentDto>>, AppError> {
    let now = Utc::now().with_timezone(&state.config.timezone);
    let rows = state.store.list_assignments(None).await?;
    let items = rows
        .into_iter()
        .map(|r| assignment_dto(r, &now))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub async fn api_complete_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((id, chore_id)): Path<(String, String)>,
) -> Result<Json<api::CompleteResp>, AppError> {
    let (completion, points) = state
        .store
        .complete_chore(&id, &chore_id, state.config.timezone, Utc::now())
        .await?;
    info!(
        by = %auth.user_id,
        user_id = %id,
        chore_id = %chore_id,
        points_earned = completion.points_earned,
        balance = points,
        "chore completed"
    );
    let title = state.store.get_chore(&chore_id).await?.map(|(c, _)| c.title);
    Ok(Json(api::CompleteResp {
        completion: completion_dto(completion, title),
        points,
    }))
}

pub async fn api_delete_completion(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let (removed, balance) = state.store.delete_completion(&id).await?;
    info!(
        by = %auth.user_id,
        completion_id = %id,
        user_id = %removed.user_id,
        points_removed = removed.points_earned,
        balance,
        "completion deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
