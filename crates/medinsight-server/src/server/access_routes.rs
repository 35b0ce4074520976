//! Access request workflow: doctors request and redeem, admins decide.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use super::error::ApiError;
use super::extract::{ApiJson, ApiPath, ApiQuery, AuthUser};
use super::state::AppState;
use crate::access::{CodeChoice, Notice};
use crate::storage::{AccessKind, GrantFilter, GrantStatus, Role};

#[derive(Debug, Deserialize)]
pub struct AccessRequestBody {
    pub patient_id: i64,
    pub access_type: AccessKind,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    #[serde(default)]
    pub access_code: Option<String>,
    pub duration_minutes: i64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    pub access_code: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<GrantStatus>,
    pub patient_id: Option<i64>,
}

/// `POST /api/access-requests`
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn request(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(body): ApiJson<AccessRequestBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require(Role::Doctor)?;
    let grant = state
        .access
        .request(user.id, body.patient_id, body.access_type, body.reason.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Access request submitted",
            "request": grant,
        })),
    ))
}

/// `GET /api/access-requests/mine`
pub async fn mine(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    user.require(Role::Doctor)?;
    let requests = state.access.list_for_requester(user.id).await?;
    Ok(Json(json!({ "success": true, "requests": requests })))
}

/// `GET /api/access-requests?status=..&patient_id=..`
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    user.require(Role::Admin)?;
    let requests = state
        .access
        .list(GrantFilter {
            status: q.status,
            subject_id: q.patient_id,
            requester_id: None,
        })
        .await?;
    Ok(Json(json!({ "success": true, "requests": requests })))
}

/// `POST /api/access-requests/{id}/approve`
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn approve(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<ApproveBody>,
) -> Result<Json<Value>, ApiError> {
    user.require(Role::Admin)?;
    let approval = state
        .access
        .approve(id, CodeChoice::from_optional(body.access_code), body.duration_minutes)
        .await?;

    let mut response = json!({
        "success": true,
        "message": "Access request approved",
        "request": approval.grant,
        "access_code": approval.code,
        "email_sent": approval.notice.delivered(),
    });
    if let Notice::Failed {
        reason,
        manual_notice,
    } = approval.notice
    {
        response["email_error"] = Value::String(reason);
        response["manual_notice"] = Value::String(manual_notice);
    }
    Ok(Json(response))
}

/// `POST /api/access-requests/{id}/reject`
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    user.require(Role::Admin)?;
    let grant = state.access.reject(id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Access request rejected",
        "request": grant,
    })))
}

/// `POST /api/patients/{id}/access`: redeem an access code.
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn redeem(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(patient_id): ApiPath<i64>,
    ApiJson(body): ApiJson<RedeemBody>,
) -> Result<Json<Value>, ApiError> {
    user.require(Role::Doctor)?;
    let view = state
        .access
        .redeem(user.id, patient_id, &body.access_code)
        .await?;
    Ok(Json(json!({ "success": true, "record": view })))
}
