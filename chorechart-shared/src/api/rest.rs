//! Minimal REST client helpers for consumers (scripts, kiosk displays).
//! Feature-gated by `rest-client` to avoid pulling reqwest into the server.

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

static HTTP_CLIENT: Lazy<Result<reqwest::Client, String>> = Lazy::new(|| {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        // Bound request duration
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| e.to_string())
});

fn mk_client() -> Result<reqwest::Client, RestError> {
    (*HTTP_CLIENT).clone().map_err(RestError::Http)
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn get_json<T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: &str,
) -> Result<T, RestError> {
    let client = mk_client()?;
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn post_json<B: serde::Serialize, T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: &str,
    body: Option<&B>,
) -> Result<T, RestError> {
    let client = mk_client()?;
    let mut req = client.post(url).bearer_auth(bearer);
    if let Some(b) = body {
        req = req.json(b);
    }
    let res = req
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn login(base: &str, req: &AuthReq) -> Result<AuthResp, RestError> {
    let client = mk_client()?;
    let url = ep::auth_login(base);
    let res = client
        .post(url)
        .json(req)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn server_version(base: &str) -> Result<VersionDto, RestError> {
    let client = mk_client()?;
    let res = client
        .get(ep::version(base))
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn me(base: &str, bearer: &str) -> Result<UserDto, RestError> {
    get_json(ep::me(base), bearer).await
}

pub async fn list_users(base: &str, bearer: &str) -> Result<Vec<UserDto>, RestError> {
    get_json(ep::users(base), bearer).await
}

pub async fn list_chores(base: &str, bearer: &str) -> Result<Vec<ChoreDto>, RestError> {
    get_json(ep::chores(base), bearer).await
}

pub async fn create_chore(
    base: &str,
    bearer: &str,
    req: &CreateChoreReq,
) -> Result<ChoreDto, RestError> {
    post_json(ep::chores(base), bearer, Some(req)).await
}

pub async fn user_chores(
    base: &str,
    user_id: &str,
    bearer: &str,
    only_open: bool,
) -> Result<Vec<AssignmentDto>, RestError> {
    get_json(ep::user_chores(base, user_id, only_open), bearer).await
}

pub async fn complete_chore(
    base: &str,
    user_id: &str,
    chore_id: &str,
    bearer: &str,
) -> Result<CompleteResp, RestError> {
    post_json::<(), _>(ep::user_chore_complete(base, user_id, chore_id), bearer, None).await
}

pub async fn user_stats(base: &str, user_id: &str, bearer: &str) -> Result<UserStatsDto, RestError> {
    get_json(ep::user_stats(base, user_id), bearer).await
}

pub async fn list_rewards(base: &str, bearer: &str) -> Result<Vec<RewardDto>, RestError> {
    get_json(ep::rewards(base), bearer).await
}

pub async fn redeem_reward(
    base: &str,
    user_id: &str,
    reward_id: &str,
    bearer: &str,
) -> Result<RedemptionResp, RestError> {
    let body = RedeemReq {
        reward_id: reward_id.to_string(),
    };
    post_json(ep::user_redemptions(base, user_id), bearer, Some(&body)).await
}

pub async fn pending_redemptions(
    base: &str,
    bearer: &str,
) -> Result<Vec<RedemptionDto>, RestError> {
    get_json(
        ep::redemptions(base, Some(crate::domain::RedemptionStatus::Pending)),
        bearer,
    )
    .await
}

pub async fn approve_redemption(
    base: &str,
    redemption_id: &str,
    bearer: &str,
) -> Result<RedemptionResp, RestError> {
    post_json::<(), _>(ep::redemption_approve(base, redemption_id), bearer, None).await
}

pub async fn deny_redemption(
    base: &str,
    redemption_id: &str,
    bearer: &str,
) -> Result<RedemptionResp, RestError> {
    post_json::<(), _>(ep::redemption_deny(base, redemption_id), bearer, None).await
}
