//! Staff identity lookup used by the login flow and grant notifications.

use async_trait::async_trait;
use serde::Serialize;

use crate::storage::{DatabaseError, MedDatabase, Role, User};

/// The part of a staff account the engines need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            display_name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, DatabaseError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, DatabaseError>;
}

#[async_trait]
impl IdentityDirectory for MedDatabase {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, DatabaseError> {
        Ok(self.get_user_by_email(email).await?.as_ref().map(Identity::from))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, DatabaseError> {
        match self.get_user(id).await {
            Ok(user) => Ok(Some(Identity::from(&user))),
            Err(DatabaseError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
