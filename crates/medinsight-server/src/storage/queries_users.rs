//! User and bearer-token revocation queries.

use medinsight_core::db::unix_timestamp;

use super::db::{DatabaseError, MedDatabase};
use super::models::{Role, User};

/// Emails are compared case-insensitively; they are stored lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl MedDatabase {
    /// Create a new staff user.
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
        department: Option<&str>,
    ) -> Result<User, DatabaseError> {
        let now = unix_timestamp();

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, email, password_hash, role, department, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(name)
        .bind(normalize_email(email))
        .bind(password_hash)
        .bind(role)
        .bind(department)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(user)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Look up a user by email. Unknown addresses are `Ok(None)`.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(self.pool())
            .await?;

        Ok(user)
    }

    /// Record a bearer token as revoked until its natural expiry.
    pub async fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO revoked_tokens (jti, expires_at, revoked_at) VALUES (?, ?, ?)
             ON CONFLICT(jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn is_token_revoked(&self, jti: &str) -> Result<bool, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT jti FROM revoked_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.is_some())
    }

    /// Drop revocation entries whose tokens would have expired anyway.
    pub async fn purge_revoked_tokens(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
