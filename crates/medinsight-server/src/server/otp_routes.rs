//! Generic one-time code endpoints for step-up purposes.
//!
//! Login codes are never issued, re-sent or verified here: they exist only
//! after `POST /api/login` has checked the password.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{instrument, warn};

use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery};
use super::state::AppState;
use crate::identity::IdentityDirectory;
use crate::notify::Message;
use crate::storage::{OtpChallenge, OtpPurpose};

#[derive(Debug, Deserialize)]
pub struct OtpTarget {
    pub email: String,
    pub purpose: OtpPurpose,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub purpose: OtpPurpose,
    pub code: String,
}

fn step_up_only(purpose: OtpPurpose) -> Result<OtpPurpose, ApiError> {
    match purpose {
        OtpPurpose::Login => Err(ApiError::Forbidden(
            "Login codes are only issued by /api/login".into(),
        )),
        OtpPurpose::PasswordReset | OtpPurpose::AccessRequest => Ok(purpose),
    }
}

/// Mail a challenge's code. Failure is logged and reported, never fatal.
pub(super) async fn dispatch(state: &AppState, challenge: &OtpChallenge) -> bool {
    let message = Message::otp_code(
        challenge.purpose.as_str(),
        &challenge.code,
        state.otp.policy().expiry_secs,
    );
    match state.notifier.send(&challenge.identity, &message).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Verification code could not be sent");
            false
        }
    }
}

/// `POST /api/otp/send`
#[instrument(skip_all, fields(email = %req.email))]
pub async fn send(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OtpTarget>,
) -> Result<Json<Value>, ApiError> {
    let purpose = step_up_only(req.purpose)?;
    if state.db.find_by_email(&req.email).await?.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let challenge = state
        .otp
        .issue(&req.email, purpose)
        .await?
        .into_dispatchable()?;
    let email_sent = dispatch(&state, &challenge).await;

    Ok(Json(json!({
        "success": true,
        "message": "Verification code sent",
        "email_sent": email_sent,
        "expires_in_secs": state.otp.policy().expiry_secs,
    })))
}

/// `POST /api/otp/verify`
#[instrument(skip_all, fields(email = %req.email))]
pub async fn verify(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OtpVerifyRequest>,
) -> Result<Json<Value>, ApiError> {
    let purpose = step_up_only(req.purpose)?;
    state.otp.verify(&req.email, purpose, &req.code).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Verification code accepted",
    })))
}

/// `POST /api/otp/resend`
#[instrument(skip_all, fields(email = %req.email))]
pub async fn resend(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OtpTarget>,
) -> Result<Json<Value>, ApiError> {
    let purpose = step_up_only(req.purpose)?;
    let challenge = state.otp.resend(&req.email, purpose).await?;
    let email_sent = dispatch(&state, &challenge).await;

    Ok(Json(json!({
        "success": true,
        "message": "A new verification code has been sent",
        "email_sent": email_sent,
        "resend_in_secs": state.otp.policy().resend_cooldown_secs,
    })))
}

/// `GET /api/otp/status?email=..&purpose=..`
///
/// Read-only, so login challenges may be inspected for a resend countdown.
pub async fn status(
    State(state): State<AppState>,
    ApiQuery(req): ApiQuery<OtpTarget>,
) -> Result<Json<Value>, ApiError> {
    let view = state.otp.status(&req.email, req.purpose).await?;
    Ok(Json(json!({ "success": true, "status": view })))
}
