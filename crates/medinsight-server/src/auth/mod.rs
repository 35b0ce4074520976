//! Bearer credentials and password hashing for `MedInsight` staff.

pub mod claims;
pub mod jwt;
pub mod password;

pub use claims::Claims;
pub use jwt::{IssuedToken, JwtManager};

/// Errors from credential handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Password hash error: {0}")]
    PasswordHash(String),

    #[error("Token subject is not a user id: {0}")]
    BadSubject(String),
}
