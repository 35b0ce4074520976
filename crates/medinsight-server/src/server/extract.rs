//! Bearer-token authentication for handlers.

use axum::extract::{FromRequest, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use super::state::AppState;
use crate::auth::Claims;
use crate::storage::Role;

/// JSON body; a malformed body is rejected as `invalid_input`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string, rejected like [`ApiJson`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters, rejected like [`ApiJson`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// The caller behind a valid, unrevoked bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
    pub claims: Claims,
}

impl AuthUser {
    /// Admit only callers holding `role`.
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        match (self.role, role) {
            (Role::Admin, Role::Admin) | (Role::Doctor, Role::Doctor) => Ok(()),
            (Role::Admin, Role::Doctor) => Err(ApiError::Forbidden(
                "This action is only available to doctors".into(),
            )),
            (Role::Doctor, Role::Admin) => Err(ApiError::Forbidden(
                "This action is only available to administrators".into(),
            )),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthenticated("Missing authorization header".into()))?;

        let claims = state
            .jwt
            .validate(token)
            .map_err(|_| ApiError::Unauthenticated("Invalid or expired token".into()))?;

        if state.db.is_token_revoked(&claims.jti).await? {
            return Err(ApiError::Unauthenticated("Token has been revoked".into()));
        }

        let id = claims
            .user_id()
            .map_err(|_| ApiError::Unauthenticated("Invalid token subject".into()))?;

        Ok(Self {
            id,
            role: claims.role,
            claims,
        })
    }
}
