//! Access grant queries.
//!
//! Transitions out of `pending` are conditional updates; the partial unique
//! index on `(requester_id, subject_id) WHERE status = 'pending'` rejects
//! a second open request for the same pair.

use super::db::{DatabaseError, MedDatabase};
use super::models::{AccessGrant, AccessKind, GrantFilter};

impl MedDatabase {
    /// Create a pending grant. Fails with `UniqueViolation` when one is
    /// already pending for the pair.
    pub async fn insert_grant(
        &self,
        requester_id: i64,
        subject_id: i64,
        kind: AccessKind,
        reason: Option<&str>,
        now: i64,
    ) -> Result<AccessGrant, DatabaseError> {
        let row = sqlx::query_as::<_, AccessGrant>(
            "INSERT INTO access_grants
                (requester_id, subject_id, access_kind, reason, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?)
             RETURNING *",
        )
        .bind(requester_id)
        .bind(subject_id)
        .bind(kind)
        .bind(reason)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    pub async fn get_grant(&self, id: i64) -> Result<AccessGrant, DatabaseError> {
        sqlx::query_as::<_, AccessGrant>("SELECT * FROM access_grants WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Access grant {id}")))
    }

    /// Move a pending grant to `approved`. `None` if it was not pending.
    pub async fn approve_grant(
        &self,
        id: i64,
        code: &str,
        expires_at: i64,
        now: i64,
    ) -> Result<Option<AccessGrant>, DatabaseError> {
        let row = sqlx::query_as::<_, AccessGrant>(
            "UPDATE access_grants
             SET status = 'approved', code = ?, expires_at = ?, decided_at = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'
             RETURNING *",
        )
        .bind(code)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Move a pending grant to `rejected`. `None` if it was not pending.
    pub async fn reject_grant(
        &self,
        id: i64,
        now: i64,
    ) -> Result<Option<AccessGrant>, DatabaseError> {
        let row = sqlx::query_as::<_, AccessGrant>(
            "UPDATE access_grants
             SET status = 'rejected', decided_at = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'
             RETURNING *",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Approved, unexpired grants for a requester on a subject, newest first.
    pub async fn find_redeemable_grants(
        &self,
        requester_id: i64,
        subject_id: i64,
        now: i64,
    ) -> Result<Vec<AccessGrant>, DatabaseError> {
        let rows = sqlx::query_as::<_, AccessGrant>(
            "SELECT * FROM access_grants
             WHERE requester_id = ? AND subject_id = ? AND status = 'approved'
               AND code IS NOT NULL AND expires_at > ?
             ORDER BY id DESC",
        )
        .bind(requester_id)
        .bind(subject_id)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// List grants matching a filter, newest first.
    pub async fn list_grants(&self, filter: GrantFilter) -> Result<Vec<AccessGrant>, DatabaseError> {
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query_as::<_, AccessGrant>(
            "SELECT * FROM access_grants
             WHERE (? IS NULL OR status = ?)
               AND (? IS NULL OR subject_id = ?)
               AND (? IS NULL OR requester_id = ?)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(status)
        .bind(status)
        .bind(filter.subject_id)
        .bind(filter.subject_id)
        .bind(filter.requester_id)
        .bind(filter.requester_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}
