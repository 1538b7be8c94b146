use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::Response,
};
use serde_json::json;

use super::extract::{CurrentUser, ValidatedJson};
use super::guards::{cookie, CSRF_COOKIE};
use super::response::{created, ok};
use super::AppState;
use crate::models::users::{
    ChangePassword, ForgotPassword, LoginRequest, NewUser, ResetPasswordRequest, UpdateProfile,
    UserProfile, VerifyEmail,
};
use crate::services::ServiceError;

/// Hands out a csrf token, reusing the caller's secret cookie when present.
pub async fn csrf_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ServiceError> {
    let auth = &state.services.auth;
    let existing = cookie(&headers, CSRF_COOKIE).filter(|secret| !secret.is_empty());

    let secret = match existing {
        Some(secret) => secret.to_string(),
        None => auth.new_csrf_secret(),
    };

    let mut response = ok("Csrf token issued", json!({ "token": auth.csrf_token(&secret) }));
    if existing.is_none() {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict",
            CSRF_COOKIE, secret
        );
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| ServiceError::Internal(format!("invalid cookie: {}", e)))?;
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(new): ValidatedJson<NewUser>,
) -> Result<Response, ServiceError> {
    let session = state.services.users.register(new).await?;
    Ok(created("Registration successful", session))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Response, ServiceError> {
    let session = state.services.users.login(request).await?;
    Ok(ok("Login successful", session))
}

pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<VerifyEmail>,
) -> Result<Response, ServiceError> {
    let user = state.services.users.verify_email(request).await?;
    Ok(ok("Email verified", user))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ServiceError> {
    state.services.users.resend_verification(&user).await?;
    Ok(ok("Verification email sent", ()))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ForgotPassword>,
) -> Result<Response, ServiceError> {
    state.services.users.forgot_password(request).await?;
    Ok(ok(
        "If the account exists, a reset link has been sent",
        (),
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> Result<Response, ServiceError> {
    state.services.users.reset_password(request).await?;
    Ok(ok("Password has been reset", ()))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Response {
    ok("Profile fetched", UserProfile::from(&user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(update): ValidatedJson<UpdateProfile>,
) -> Result<Response, ServiceError> {
    let profile = state.services.users.update_profile(&user, update).await?;
    Ok(ok("Profile updated", profile))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(request): ValidatedJson<ChangePassword>,
) -> Result<Response, ServiceError> {
    state.services.users.change_password(&user, request).await?;
    Ok(ok("Password changed", ()))
}
