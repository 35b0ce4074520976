use crate::storage::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    /// A code was sent recently; the caller may retry after the remainder.
    #[error("Please wait {remaining_secs} seconds before requesting a new code")]
    RateLimited { remaining_secs: i64 },

    #[error("No active verification code found")]
    NotFound,

    #[error("Verification code has expired")]
    Expired,

    #[error("Too many verification attempts")]
    TooManyAttempts,

    #[error("Invalid verification code")]
    InvalidCode { attempts_remaining: i64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl OtpError {
    /// Short, stable kind tag for metrics and API bodies.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::TooManyAttempts => "too_many_attempts",
            Self::InvalidCode { .. } => "invalid_code",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "storage",
        }
    }
}
