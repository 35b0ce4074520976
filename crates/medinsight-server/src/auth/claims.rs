//! JWT claims carried by `MedInsight` bearer tokens.

use serde::{Deserialize, Serialize};

use crate::storage::Role;

use super::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Unique per token; logout revokes by this id.
    pub jti: String,
    /// User id, as a decimal string.
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub
            .parse()
            .map_err(|_| AuthError::BadSubject(self.sub.clone()))
    }
}
