use std::collections::HashMap;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use chorechart_shared::api;
use chorechart_shared::domain::{DEFAULT_REWARD_ICON, RedemptionStatus};
use chrono::Utc;
use tracing::info;

use super::auth::AuthCtx;
use super::users::require_user;
use super::{ApiJson, ApiQuery, AppError, AppState};
use crate::schedule::rfc3339;
use crate::storage::models::{RedeemedReward, Reward, RewardPatch};

fn reward_dto(r: Reward) -> api::RewardDto {
    api::RewardDto {
        id: r.id,
        title: r.title,
        description: r.description,
        icon: r.icon,
        point_cost: r.point_cost,
        created_at: rfc3339(r.created_at),
        updated_at: rfc3339(r.updated_at),
    }
}

fn redemption_dto(
    r: RedeemedReward,
    titles: &HashMap<String, String>,
) -> Result<api::RedemptionDto, AppError> {
    let status = r.status().map_err(AppError::internal)?;
    Ok(api::RedemptionDto {
        reward_title: titles.get(&r.reward_id).cloned(),
        id: r.id,
        reward_id: r.reward_id,
        user_id: r.user_id,
        redeemed_at: rfc3339(r.redeemed_at),
        status,
        points_spent: r.points_spent,
        updated_at: rfc3339(r.updated_at),
    })
}

async fn reward_titles(state: &AppState) -> Result<HashMap<String, String>, AppError> {
    Ok(state
        .store
        .list_rewards()
        .await?
        .into_iter()
        .map(|r| (r.id, r.title))
        .collect())
}

async fn redemption_list(
    state: &AppState,
    rows: Vec<RedeemedReward>,
) -> Result<Vec<api::RedemptionDto>, AppError> {
    let titles = reward_titles(state).await?;
    rows.into_iter()
        .map(|r| redemption_dto(r, &titles))
        .collect()
}

pub async fn api_list_rewards(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    let rows = state.store.list_rewards().await?;
    Ok(Json(rows.into_iter().map(reward_dto).collect()))
}

pub async fn api_create_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    ApiJson(body): ApiJson<api::CreateRewardReq>,
) -> Result<(StatusCode, Json<api::RewardDto>), AppError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }
    if body.point_cost <= 0 {
        return Err(AppError::bad_request("point_cost must be positive"));
    }
    let icon = body
        .icon
        .as_deref()
        .filter(|i| !i.trim().is_empty())
        .unwrap_or(DEFAULT_REWARD_ICON);
    let reward = state
        .store
        .create_reward(title, body.description.as_deref(), icon, body.point_cost)
        .await?;
    info!(by = %auth.user_id, reward_id = %reward.id, cost = reward.point_cost, "reward created");
    Ok((StatusCode::CREATED, Json(reward_dto(reward))))
}

pub async fn api_update_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<api::UpdateRewardReq>,
) -> Result<Json<api::RewardDto>, AppError> {
    if matches!(&body.title, Some(t) if t.trim().is_empty()) {
        return Err(AppError::bad_request("title cannot be empty"));
    }
    if matches!(body.point_cost, Some(c) if c <= 0) {
        return Err(AppError::bad_request("point_cost must be positive"));
    }
    let patch = RewardPatch {
        title: body.title.map(|t| t.trim().to_string()),
        description: body.description,
        icon: body.icon,
        point_cost: body.point_cost,
    };
    let reward = state.store.update_reward(&id, patch).await?;
    info!(by = %auth.user_id, reward_id = %reward.id, "reward updated");
    Ok(Json(reward_dto(reward)))
}

pub async fn api_delete_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_reward(&id).await? {
        return Err(AppError::not_found(format!("reward not found: {id}")));
    }
    info!(by = %auth.user_id, reward_id = %id, "reward deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn api_user_redemptions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<api::RedemptionDto>>, AppError> {
    require_user(&state, &id).await?;
    let rows = state.store.list_redemptions(Some(&id), None).await?;
    Ok(Json(redemption_list(&state, rows).await?))
}

pub async fn api_redeem(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<api::RedeemReq>,
) -> Result<(StatusCode, Json<api::RedemptionResp>), AppError> {
    let (redemption, points) = state
        .store
        .redeem_reward(&id, &body.reward_id, Utc::now())
        .await?;
    info!(
        by = %auth.user_id,
        user_id = %id,
        reward_id = %body.reward_id,
        points_spent = redemption.points_spent,
        balance = points,
        "reward redeemed"
    );
    let titles = reward_titles(&state).await?;
    Ok((
        StatusCode::CREATED,
        Json(api::RedemptionResp {
            redemption: redemption_dto(redemption, &titles)?,
            points,
        }),
    ))
}

pub async fn api_list_redemptions(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<api::StatusQuery>,
) -> Result<Json<Vec<api::RedemptionDto>>, AppError> {
    let rows = state.store.list_redemptions(None, q.status).await?;
    Ok(Json(redemption_list(&state, rows).await?))
}

async fn decide(
    state: AppState,
    auth: AuthCtx,
    id: String,
    decision: RedemptionStatus,
) -> Result<Json<api::RedemptionResp>, AppError> {
    let (redemption, points) = state
        .store
        .decide_redemption(&id, decision, Utc::now())
        .await?;
    info!(
        by = %auth.user_id,
        redemption_id = %id,
        user_id = %redemption.user_id,
        decision = %decision,
        balance = points,
        "redemption decided"
    );
    let titles = reward_titles(&state).await?;
    Ok(Json(api::RedemptionResp {
        redemption: redemption_dto(redemption, &titles)?,
        points,
    }))
}

pub async fn api_approve_redemption(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::RedemptionResp>, AppError> {
    decide(state, auth, id, RedemptionStatus::Approved).await
}

pub async fn api_deny_redemption(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::RedemptionResp>, AppError> {
    decide(state, auth, id, RedemptionStatus::Denied).await
}
