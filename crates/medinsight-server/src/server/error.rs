//! Mapping of engine failures onto HTTP responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use tracing::error;

use crate::access::AccessError;
use crate::auth::AuthError;
use crate::otp::OtpError;
use crate::storage::DatabaseError;

/// Every handler failure. Rendered as
/// `{ "success": false, "error": <kind>, "message": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{0}")]
    Internal(String),
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Map<String, Value>) {
        let mut extra = Map::new();
        let (status, kind) = match self {
            Self::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_input"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            Self::Otp(e) => {
                let status = match e {
                    OtpError::RateLimited { remaining_secs } => {
                        extra.insert("remaining_seconds".into(), json!(remaining_secs));
                        StatusCode::TOO_MANY_REQUESTS
                    }
                    OtpError::NotFound => StatusCode::NOT_FOUND,
                    OtpError::InvalidCode { attempts_remaining } => {
                        extra.insert("attempts_remaining".into(), json!(attempts_remaining));
                        StatusCode::BAD_REQUEST
                    }
                    OtpError::TooManyAttempts => {
                        extra.insert("attempts_remaining".into(), json!(0));
                        StatusCode::BAD_REQUEST
                    }
                    OtpError::Expired => StatusCode::BAD_REQUEST,
                    OtpError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    OtpError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.kind())
            }
            Self::Access(e) => {
                let status = match e {
                    AccessError::NotFound(_) => StatusCode::NOT_FOUND,
                    AccessError::Conflict => StatusCode::CONFLICT,
                    AccessError::InvalidState(_) => StatusCode::BAD_REQUEST,
                    AccessError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    AccessError::AccessDenied | AccessError::Forbidden(_) => StatusCode::FORBIDDEN,
                    AccessError::Crypto(_) | AccessError::Storage(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.kind())
            }
        };
        (status, kind, extra)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, mut body) = self.parts();

        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        body.insert("success".into(), Value::Bool(false));
        body.insert("error".into(), Value::String(kind.into()));
        body.insert("message".into(), Value::String(message));

        (status, Json(Value::Object(body))).into_response()
    }
}
