//! One-time code challenge queries.
//!
//! Every write that depends on a previously read row is conditional on the
//! row's `version` (or `verified` flag), so concurrent writers cannot
//! interleave partial updates.

use super::db::{DatabaseError, MedDatabase};
use super::models::{OtpChallenge, OtpPurpose};

/// Values written when a challenge is created or regenerated.
#[derive(Debug, Clone, Copy)]
pub struct ChallengeWindow<'a> {
    pub code: &'a str,
    pub now: i64,
    pub expires_at: i64,
    pub resend_allowed_at: i64,
}

impl MedDatabase {
    /// Delete challenges whose deadline has passed.
    pub async fn delete_expired_challenges(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM otp_challenges WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }

    /// The open (unverified) challenge for a pair, if any.
    pub async fn find_unverified_challenge(
        &self,
        identity: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, DatabaseError> {
        let row = sqlx::query_as::<_, OtpChallenge>(
            "SELECT * FROM otp_challenges WHERE identity = ? AND purpose = ? AND verified = 0",
        )
        .bind(identity)
        .bind(purpose)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// The open challenge for a pair, else the most recent verified one.
    pub async fn find_latest_challenge(
        &self,
        identity: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpChallenge>, DatabaseError> {
        let row = sqlx::query_as::<_, OtpChallenge>(
            "SELECT * FROM otp_challenges WHERE identity = ? AND purpose = ?
             ORDER BY verified ASC, id DESC LIMIT 1",
        )
        .bind(identity)
        .bind(purpose)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Insert a fresh challenge. Fails with `UniqueViolation` when an open
    /// challenge for the pair already exists.
    pub async fn insert_challenge(
        &self,
        identity: &str,
        purpose: OtpPurpose,
        window: ChallengeWindow<'_>,
    ) -> Result<OtpChallenge, DatabaseError> {
        let row = sqlx::query_as::<_, OtpChallenge>(
            "INSERT INTO otp_challenges
                (identity, purpose, code, expires_at, last_sent_at, resend_allowed_at,
                 attempts, verified, version, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, ?)
             RETURNING *",
        )
        .bind(identity)
        .bind(purpose)
        .bind(window.code)
        .bind(window.expires_at)
        .bind(window.now)
        .bind(window.resend_allowed_at)
        .bind(window.now)
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    /// Regenerate a challenge in place if it is still at `version`.
    ///
    /// Resets attempts and the verified flag. Returns `None` when another
    /// writer got there first.
    pub async fn regenerate_challenge(
        &self,
        id: i64,
        version: i64,
        window: ChallengeWindow<'_>,
    ) -> Result<Option<OtpChallenge>, DatabaseError> {
        let row = sqlx::query_as::<_, OtpChallenge>(
            "UPDATE otp_challenges
             SET code = ?, expires_at = ?, last_sent_at = ?, resend_allowed_at = ?,
                 attempts = 0, verified = 0, version = version + 1
             WHERE id = ? AND version = ?
             RETURNING *",
        )
        .bind(window.code)
        .bind(window.expires_at)
        .bind(window.now)
        .bind(window.resend_allowed_at)
        .bind(id)
        .bind(version)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Count one verification attempt against an open challenge and return
    /// the updated row. `None` if the challenge is gone or already verified.
    pub async fn record_attempt(&self, id: i64) -> Result<Option<OtpChallenge>, DatabaseError> {
        let row = sqlx::query_as::<_, OtpChallenge>(
            "UPDATE otp_challenges SET attempts = attempts + 1, version = version + 1
             WHERE id = ? AND verified = 0
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Mark an open challenge verified. Only one caller can win.
    pub async fn mark_verified(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE otp_challenges SET verified = 1, version = version + 1
             WHERE id = ? AND verified = 0",
        )
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
