mod acl;
pub mod auth;
mod chores;
mod config;
mod reports;
mod rewards;
mod users;

use std::sync::Arc;

use crate::server::auth::AuthCtx;
use crate::storage::{Store, StorageError};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    http::{Method, StatusCode, header},
    routing::{delete, get, post, put},
};
use chorechart_shared::api;
pub use config::{AppConfig, ConfigError, JWT_SECRET_ENV};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Store,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/api/v1/auth/logout", post(auth::api_auth_logout))
        .route("/api/v1/me", get(users::api_me))
        .route(
            "/api/v1/users",
            get(users::api_list_users).post(users::api_create_user),
        )
        .route(
            "/api/v1/users/{id}",
            get(users::api_get_user).put(users::api_update_user),
        )
        .route("/api/v1/users/{id}/chores", get(chores::api_user_chores))
        .route(
            "/api/v1/users/{id}/chores/{chore_id}/complete",
            post(chores::api_complete_chore),
        )
        .route(
            "/api/v1/users/{id}/completions",
            get(reports::api_user_completions),
        )
        .route("/api/v1/users/{id}/history", get(reports::api_user_history))
        .route("/api/v1/users/{id}/stats", get(reports::api_user_stats))
        .route(
            "/api/v1/users/{id}/redemptions",
            get(rewards::api_user_redemptions).post(rewards::api_redeem),
        )
        .route(
            "/api/v1/chores",
            get(chores::api_list_chores).post(chores::api_create_chore),
        )
        .route(
            "/api/v1/chores/{id}",
            get(chores::api_get_chore)
                .put(chores::api_update_chore)
                .delete(chores::api_delete_chore),
        )
        .route("/api/v1/assignments", get(chores::api_list_assignments))
        .route(
            "/api/v1/completions/{id}",
            delete(chores::api_delete_completion),
        )
        .route(
            "/api/v1/rewards",
            get(rewards::api_list_rewards).post(rewards::api_create_reward),
        )
        .route(
            "/api/v1/rewards/{id}",
            put(rewards::api_update_reward).delete(rewards::api_delete_reward),
        )
        .route("/api/v1/redemptions", get(rewards::api_list_redemptions))
        .route(
            "/api/v1/redemptions/{id}/approve",
            post(rewards::api_approve_redemption),
        )
        .route(
            "/api/v1/redemptions/{id}/deny",
            post(rewards::api_deny_redemption),
        )
        .route("/api/v1/reports/analytics", get(reports::api_analytics))
        .route(
            "/api/v1/reports/completions.csv",
            get(reports::api_completions_csv),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            user_id = tracing::field::Empty,
            role = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/version", get(api_version))
        .route("/api/v1/auth/login", post(auth::api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn api_version() -> Json<api::VersionDto> {
    Json(api::VersionDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("user_id", tracing::field::display(&auth.user_id));
        span.record("role", tracing::field::display(&auth.role));
    }
    Ok(next.run(req).await)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// JSON body extractor; malformed bodies become `AppError::BadRequest`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
struct ApiJson<T>(T);

/// Query string extractor with the same error shape as [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
struct ApiQuery<T>(T);

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            StorageError::NotFound(m) => AppError::NotFound(m),
            StorageError::Conflict(m) => AppError::Conflict(m),
            e @ StorageError::InsufficientPoints { .. } => AppError::Conflict(e.to_string()),
            other => AppError::internal(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request rejected");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use chorechart_shared::auth::Role;
    use chorechart_shared::domain::UserSeed;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn app(dir: &tempfile::TempDir) -> Router {
        let db = dir.path().join("router.db");
        let store = Store::connect_sqlite(db.to_str().unwrap()).await.unwrap();
        let config = AppConfig {
            jwt_secret: "router-test-secret-0123".into(),
            timezone: chrono_tz::Tz::UTC,
            dev_cors_origin: None,
            listen_port: None,
            users: vec![UserSeed {
                id: "mom".into(),
                name: "Mom".into(),
                avatar: String::new(),
                role: Role::Admin,
                password_hash: Some(bcrypt::hash("pw", 4).unwrap()),
                points: None,
            }],
            chores: vec![],
            rewards: vec![],
        };
        store
            .seed_from_config(&config.users, &config.chores, &config.rewards)
            .await
            .unwrap();
        router(AppState::new(config, store))
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(resp: AxumResponse) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn admin_token(app: &Router) -> String {
        let resp = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                r#"{"username":"mom","password":"pw"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        json_body(resp).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn responses_carry_security_headers_and_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(&dir)
            .await
            .oneshot(
                Request::get("/healthz")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let h = resp.headers();
        assert_eq!(h["x-request-id"], "abc-123");
        assert_eq!(h["x-content-type-options"], "nosniff");
        assert_eq!(h["x-frame-options"], "DENY");
        assert!(h["cache-control"].to_str().unwrap().contains("no-store"));
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn private_routes_reject_missing_token_with_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let resp = app(&dir)
            .await
            .oneshot(Request::get("/api/v1/rewards").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(resp.headers().contains_key("x-request-id"));
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"], "unauthorized");
    }

    #[test]
    fn storage_errors_map_to_client_statuses() {
        let insufficient = AppError::from(StorageError::InsufficientPoints {
            balance: 5,
            cost: 20,
        });
        match insufficient {
            AppError::Conflict(m) => assert!(m.contains("insufficient points")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            AppError::from(StorageError::InvalidInput("x".into())),
            AppError::BadRequest(_)
        ));
        assert!(matches!(
            AppError::from(StorageError::NotFound("x".into())),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests_with_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let resp = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                r#"{"username":"mom"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].as_str().unwrap().contains("password"));

        let token = admin_token(&app).await;
        let bad_chores = [
            (
                r#"{"title":"Sweep","point_value":"ten","recurrence":"daily","assigned_to":["mom"]}"#,
                "point_value",
            ),
            (
                r#"{"point_value":5,"recurrence":"daily","assigned_to":["mom"]}"#,
                "title",
            ),
            (
                r#"{"title":"Sweep","point_value":5,"recurrence":"monthly","assigned_to":["mom"]}"#,
                "recurrence",
            ),
            ("not json", "JSON"),
        ];
        for (body, mentions) in bad_chores {
            let resp = app
                .clone()
                .oneshot(json_request(Method::POST, "/api/v1/chores", Some(&token), body))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body}");
            let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
            assert!(content_type.starts_with("application/json"));
            let err = json_body(resp).await;
            assert!(
                err["error"].as_str().unwrap().contains(mentions),
                "{err:?} should mention {mentions}"
            );
        }
    }

    #[tokio::test]
    async fn bad_query_values_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;
        let token = admin_token(&app).await;
        for uri in [
            "/api/v1/reports/analytics?timeframe=decade",
            "/api/v1/redemptions?status=lost",
            "/api/v1/users/mom/chores?open=maybe",
        ] {
            let resp = app
                .clone()
                .oneshot(
                    Request::get(uri)
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert!(json_body(resp).await["error"].is_string());
        }
    }
}
