//! Data models for `MedInsight` storage.

use serde::{Deserialize, Serialize};

/// Staff role. Every authorization decision matches on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Doctor => "doctor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a one-time code is being used to prove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    PasswordReset,
    AccessRequest,
}

impl OtpPurpose {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PasswordReset => "password_reset",
            Self::AccessRequest => "access_request",
        }
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of access a doctor asks for on a patient record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccessKind {
    View,
    Edit,
}

impl AccessKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
        }
    }
}

/// Stored grant state. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum GrantStatus {
    Pending,
    Approved,
    Rejected,
}

impl GrantStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub department: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A medical record row. The diagnosis is only present as ciphertext.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MedicalRecord {
    pub id: i64,
    pub patient_id: i64,
    pub author_id: i64,
    pub diagnosis_ciphertext: Vec<u8>,
    pub diagnosis_nonce: Vec<u8>,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub medications: Option<String>,
    pub created_at: i64,
}

/// One-time code challenge bound to an (identity, purpose) pair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OtpChallenge {
    pub id: i64,
    pub identity: String,
    pub purpose: OtpPurpose,
    #[serde(skip_serializing, default)]
    pub code: String,
    pub expires_at: i64,
    pub last_sent_at: i64,
    pub resend_allowed_at: i64,
    pub attempts: i64,
    pub verified: bool,
    /// Bumped on every write; regeneration is a compare-and-swap on it.
    pub version: i64,
    pub created_at: i64,
}

impl OtpChallenge {
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Seconds until a resend is allowed, zero once the cooldown is over.
    pub fn cooldown_remaining_at(&self, now: i64) -> i64 {
        (self.resend_allowed_at - now).max(0)
    }
}

/// Doctor-to-patient access grant.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessGrant {
    pub id: i64,
    pub requester_id: i64,
    pub subject_id: i64,
    pub access_kind: AccessKind,
    pub reason: Option<String>,
    pub status: GrantStatus,
    #[serde(skip_serializing, default)]
    pub code: Option<String>,
    pub expires_at: Option<i64>,
    pub decided_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl AccessGrant {
    /// Derived read-time condition; never written back.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.status == GrantStatus::Approved && self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Fields for a new patient row.
#[derive(Debug, Clone, Default)]
pub struct NewPatient<'a> {
    pub name: &'a str,
    pub birth_date: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub address: Option<&'a str>,
}

/// Fields for a new medical record; the diagnosis must already be sealed.
#[derive(Debug, Clone)]
pub struct NewMedicalRecord<'a> {
    pub patient_id: i64,
    pub author_id: i64,
    pub diagnosis: &'a medinsight_crypto::SealedRecord,
    pub notes: Option<&'a str>,
    pub symptoms: Option<&'a str>,
    pub treatment: Option<&'a str>,
    pub medications: Option<&'a str>,
}

/// Filter for grant listings. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantFilter {
    pub status: Option<GrantStatus>,
    pub subject_id: Option<i64>,
    pub requester_id: Option<i64>,
}
