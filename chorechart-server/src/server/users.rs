use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use bcrypt::{DEFAULT_COST, hash};
use chorechart_shared::api;
use chorechart_shared::auth::Role;
use tracing::info;

use super::auth::AuthCtx;
use super::{ApiJson, AppError, AppState};
use crate::schedule::rfc3339;
use crate::storage::models::{User, UserPatch};

pub(super) fn user_dto(u: User) -> Result<api::UserDto, AppError> {
    let role = u.role().map_err(AppError::internal)?;
    Ok(api::UserDto {
        id: u.id,
        name: u.name,
        avatar: u.avatar,
        points: u.points,
        role,
        created_at: rfc3339(u.created_at),
        updated_at: rfc3339(u.updated_at),
    })
}

fn hash_password(password: &str) -> Result<String, AppError> {
    if password.is_empty() {
        return Err(AppError::bad_request("password cannot be empty"));
    }
    hash(password, DEFAULT_COST).map_err(AppError::internal)
}

pub(super) async fn require_user(state: &AppState, id: &str) -> Result<User, AppError> {
    state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("user not found: {id}")))
}

pub async fn api_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::UserDto>, AppError> {
    let user = require_user(&state, &auth.user_id).await?;
    Ok(Json(user_dto(user)?))
}

pub async fn api_list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<api::UserDto>>, AppError> {
    let rows = state.store.list_users().await?;
    let items = rows
        .into_iter()
        .map(user_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub async fn api_get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<api::UserDto>, AppError> {
    let user = require_user(&state, &id).await?;
    Ok(Json(user_dto(user)?))
}

pub async fn api_create_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    ApiJson(body): ApiJson<api::CreateUserReq>,
) -> Result<(StatusCode, Json<api::UserDto>), AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name is required"));
    }
    let points = body.points.unwrap_or(0);
    if points < 0 {
        return Err(AppError::bad_request("points cannot be negative"));
    }
    let password_hash = body.password.as_deref().map(hash_password).transpose()?;
    let user = state
        .store
        .create_user(
            body.id.as_deref(),
            name,
            body.avatar.as_deref().unwrap_or_default(),
            body.role.unwrap_or(Role::Child),
            points,
            password_hash.as_deref(),
        )
        .await?;
    info!(by = %auth.user_id, user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user_dto(user)?)))
}

pub async fn api_update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<api::UpdateUserReq>,
) -> Result<Json<api::UserDto>, AppError> {
    if matches!(&body.name, Some(n) if n.trim().is_empty()) {
        return Err(AppError::bad_request("name cannot be empty"));
    }
    if matches!(body.points, Some(p) if p < 0) {
        return Err(AppError::bad_request("points cannot be negative"));
    }
    let patch = UserPatch {
        name: body.name.map(|n| n.trim().to_string()),
        avatar: body.avatar,
        role: body.role,
        points: body.points,
        password_hash: body.password.as_deref().map(hash_password).transpose()?,
    };
    let user = state.store.update_user(&id, patch).await?;
    info!(
        by = %auth.user_id,
        user_id = %user.id,
        points = user.points,
        "user updated"
    );
    Ok(Json(user_dto(user)?))
}
