use axum::extract::{Extension, State};
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use bcrypt::verify;
use chorechart_shared::api;
use chorechart_shared::auth::Role;
use chorechart_shared::jwt::{self, JwtClaims};
use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use super::users::user_dto;
use super::{ApiJson, AppError, AppState};

/// How many days of inactivity before a session is considered expired.
const SESSION_IDLE_DAYS: i64 = 14;
/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub user_id: String,
    pub role: Role,
    pub jti: String,
}

impl AuthCtx {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let Some(token) = header_str.strip_prefix("Bearer ") else {
        return unauthorized();
    };

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    let cutoff = Utc::now() - Duration::days(SESSION_IDLE_DAYS);
    match state
        .store
        .touch_session_with_cutoff(&claims.jti, cutoff.naive_utc())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                jti = %claims.jti,
                user_id = %claims.sub,
                cutoff = %cutoff,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            return unauthorized();
        }
        Err(e) => {
            error!(jti = %claims.jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::internal(e));
        }
    }

    // Role changes and removed users invalidate outstanding tokens
    let user = state
        .store
        .get_user(&claims.sub)
        .await
        .map_err(AppError::internal)?;
    let stored_role = match user {
        Some(u) => u.role().map_err(AppError::internal)?,
        None => {
            warn!(user_id = %claims.sub, "auth: token for unknown user");
            return unauthorized();
        }
    };
    if stored_role != claims.role {
        warn!(
            user_id = %claims.sub,
            token_role = %claims.role,
            stored_role = %stored_role,
            "auth: role mismatch"
        );
        return unauthorized();
    }

    req.extensions_mut().insert(AuthCtx {
        user_id: claims.sub,
        role: claims.role,
        jti: claims.jti,
    });
    Ok(next.run(req).await)
}

pub async fn issue_jwt_for_user(
    state: &AppState,
    user_id: &str,
    role: Role,
) -> Result<String, AppError> {
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        jti: jti.clone(),
        exp,
        role,
    };

    state
        .store
        .create_session(&jti, user_id)
        .await
        .map_err(|e| {
            error!(user_id, error=%e, "login: create_session failed");
            AppError::internal(e)
        })?;
    jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(user_id, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })
}

pub async fn api_auth_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state
        .store
        .get_user(&body.username)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| {
            warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    let Some(hash) = user.password_hash.as_deref() else {
        warn!(username=%body.username, "login: user has no password");
        return Err(AppError::unauthorized());
    };
    if !verify(&body.password, hash).map_err(|e| {
        error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    let role = user.role().map_err(AppError::internal)?;
    let token = issue_jwt_for_user(&state, &user.id, role).await?;
    info!(user_id = %user.id, role = %role, "login: issued token");
    Ok(Json(api::AuthResp {
        token,
        user: user_dto(user)?,
    }))
}

pub async fn api_auth_logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .delete_session(&auth.jti)
        .await
        .map_err(AppError::internal)?;
    info!(user_id = %auth.user_id, "logout: session removed");
    Ok(StatusCode::NO_CONTENT)
}
