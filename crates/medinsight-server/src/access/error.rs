use medinsight_crypto::CryptoError;

use crate::storage::{DatabaseError, GrantStatus};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("An access request for this patient is already pending")]
    Conflict,

    #[error("Access request already processed (status: {})", .0.as_str())]
    InvalidState(GrantStatus),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Deliberately uninformative: wrong code, expired, wrong requester and
    /// not-yet-approved all look the same.
    #[error("Access denied")]
    AccessDenied,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Record decryption failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    Storage(DatabaseError),
}

impl From<DatabaseError> for AccessError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

impl AccessError {
    /// Short, stable kind tag for API bodies.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidInput(_) => "invalid_input",
            Self::AccessDenied => "access_denied",
            Self::Forbidden(_) => "forbidden",
            Self::Crypto(_) => "crypto",
            Self::Storage(_) => "storage",
        }
    }
}
