use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use chorechart_shared::auth::Role;
use percent_encoding::percent_decode_str;

pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };

    let segs = segmented(&path);
    let api_prefix = ["api", "v1"];
    if !segs.as_slice().starts_with(&api_prefix) {
        tracing::warn!(?segs, "ACL: path outside api scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[api_prefix.len()..];

    let decision = match auth.role {
        Role::Admin => allow_admin(&method, rest),
        Role::Child => allow_child(&method, rest, auth),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            user_id = %auth.user_id,
            role = %auth.role,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

fn allow_admin(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    let get = *method == Method::GET;
    let post = *method == Method::POST;
    let put = *method == Method::PUT;
    let delete = *method == Method::DELETE;
    match rest {
        ["auth", "logout"] if post => Ok(()),
        ["me"] if get => Ok(()),
        ["users"] if get || post => Ok(()),
        ["users", _] if get || put => Ok(()),
        ["users", _, "chores"] if get => Ok(()),
        ["users", _, "chores", _, "complete"] if post => Ok(()),
        ["users", _, "completions" | "history" | "stats"] if get => Ok(()),
        ["users", _, "redemptions"] if get || post => Ok(()),
        ["chores"] if get || post => Ok(()),
        ["chores", _] if get || put || delete => Ok(()),
        ["assignments"] if get => Ok(()),
        ["completions", _] if delete => Ok(()),
        ["rewards"] if get || post => Ok(()),
        ["rewards", _] if put || delete => Ok(()),
        ["redemptions"] if get => Ok(()),
        ["redemptions", _, "approve" | "deny"] if post => Ok(()),
        ["reports", "analytics" | "completions.csv"] if get => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn allow_child(method: &Method, rest: &[&str], auth: &AuthCtx) -> Result<(), AppError> {
    let get = *method == Method::GET;
    let post = *method == Method::POST;
    match rest {
        ["auth", "logout"] if post => Ok(()),
        ["me"] if get => Ok(()),
        ["users"] if get => Ok(()),
        ["chores"] if get => Ok(()),
        ["chores", _] if get => Ok(()),
        ["rewards"] if get => Ok(()),
        ["users", user] if get => ensure_self(auth, user),
        ["users", user, "chores"] if get => ensure_self(auth, user),
        ["users", user, "chores", _, "complete"] if post => ensure_self(auth, user),
        ["users", user, "completions" | "history" | "stats"] if get => ensure_self(auth, user),
        ["users", user, "redemptions"] if get || post => ensure_self(auth, user),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn ensure_self(auth: &AuthCtx, seg: &str) -> Result<(), AppError> {
    let provided = percent_decode_str(seg).decode_utf8_lossy();
    if auth.user_id == provided {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
