//! Login (password, then one-time code), logout and profile.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::error::ApiError;
use super::extract::{ApiJson, AuthUser};
use super::otp_routes::dispatch;
use super::state::AppState;
use crate::auth::password::verify_password;
use crate::storage::OtpPurpose;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginVerifyRequest {
    pub email: String,
    pub code: String,
}

/// `POST /api/login`: check the password, then send a login code.
#[instrument(skip_all, fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("Invalid credentials".into()))?;

    if !verify_password(&req.password, &user.password_hash)? {
        warn!("Password check failed");
        return Err(ApiError::Unauthenticated("Invalid credentials".into()));
    }

    let challenge = state
        .otp
        .issue(&user.email, OtpPurpose::Login)
        .await?
        .into_dispatchable()?;

    let email_sent = dispatch(&state, &challenge).await;
    let policy = state.otp.policy();

    Ok(Json(json!({
        "success": true,
        "message": "Password verified. A verification code has been sent to your email.",
        "email": user.email,
        "email_sent": email_sent,
        "expires_in_secs": policy.expiry_secs,
        "resend_in_secs": policy.resend_cooldown_secs,
    })))
}

/// `POST /api/login/verify`: exchange a login code for a bearer token.
#[instrument(skip_all, fields(email = %req.email))]
pub async fn verify_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginVerifyRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .otp
        .verify(&req.email, OtpPurpose::Login, &req.code)
        .await?;

    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    let issued = state.jwt.issue_access_token(&user)?;

    info!(user_id = user.id, "Login completed");
    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": issued.token,
        "token_type": "Bearer",
        "expires_at": issued.expires_at,
        "expires_in_secs": state.jwt.access_ttl_secs(),
        "user": user,
    })))
}

/// `POST /api/logout`: revoke the presented token.
pub async fn logout(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    state
        .db
        .revoke_token(&user.claims.jti, user.claims.exp)
        .await?;
    info!(user_id = user.id, "Logged out");
    Ok(Json(json!({ "success": true, "message": "Logged out" })))
}

/// `GET /api/me`
pub async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let user = state.db.get_user(user.id).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}
