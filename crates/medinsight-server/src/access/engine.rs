use std::sync::Arc;

use medinsight_core::SharedClock;
use medinsight_core::config::AccessPolicy;
use medinsight_crypto::{RecordCipher, SealedRecord, constant_time_str_eq, generate_access_code};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::error::AccessError;
use crate::identity::IdentityDirectory;
use crate::notify::{Message, Notifier};
use crate::records::RecordStore;
use crate::storage::{
    AccessGrant, AccessKind, DatabaseError, GrantFilter, GrantStatus, MedDatabase, MedicalRecord,
    Patient, Role,
};
use crate::telemetry;

/// Longest code an approver may hand out.
const MAX_SUPPLIED_CODE_LEN: usize = 64;

/// Where the access code for an approval comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeChoice {
    Supplied(String),
    /// Random uppercase alphanumeric code of the configured length.
    Generate,
}

impl CodeChoice {
    /// `None` or a blank string means "generate one".
    pub fn from_optional(code: Option<String>) -> Self {
        match code {
            Some(c) if !c.trim().is_empty() => Self::Supplied(c),
            _ => Self::Generate,
        }
    }
}

/// Outcome of telling the requester about an approval. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Notice {
    Delivered { to: String },
    Failed { reason: String, manual_notice: String },
}

impl Notice {
    pub const fn delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// A committed approval plus the separate notification outcome.
#[derive(Debug, Clone)]
pub struct Approval {
    pub grant: AccessGrant,
    pub code: String,
    pub notice: Notice,
}

/// A grant as listed, with the read-time expiry flag.
#[derive(Debug, Clone, Serialize)]
pub struct GrantView {
    #[serde(flatten)]
    pub grant: AccessGrant,
    pub expired: bool,
}

/// One decrypted medical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordEntry {
    pub id: i64,
    pub author_id: i64,
    pub diagnosis: String,
    pub notes: Option<String>,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub medications: Option<String>,
    pub created_at: i64,
}

/// What a successful redemption unlocks.
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub patient: Patient,
    pub latest: Option<RecordEntry>,
    /// Newest first.
    pub history: Vec<RecordEntry>,
    pub access_kind: AccessKind,
    pub access_granted_at: Option<i64>,
    pub access_expires_at: Option<i64>,
}

/// Request / approve / reject / redeem state machine for access grants.
#[derive(Clone)]
pub struct AccessEngine {
    db: MedDatabase,
    clock: SharedClock,
    policy: AccessPolicy,
    cipher: Arc<RecordCipher>,
    records: Arc<dyn RecordStore>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl AccessEngine {
    pub fn new(
        db: MedDatabase,
        clock: SharedClock,
        policy: AccessPolicy,
        cipher: Arc<RecordCipher>,
        records: Arc<dyn RecordStore>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            clock,
            policy,
            cipher,
            records,
            directory,
            notifier,
        }
    }

    /// Open a pending request from a doctor for a patient.
    #[instrument(skip(self, reason))]
    pub async fn request(
        &self,
        requester_id: i64,
        subject_id: i64,
        kind: AccessKind,
        reason: Option<&str>,
    ) -> Result<AccessGrant, AccessError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if reason.is_some_and(|r| r.chars().count() > self.policy.max_reason_len) {
            return Err(AccessError::InvalidInput(format!(
                "reason must be at most {} characters",
                self.policy.max_reason_len
            )));
        }

        let requester = self
            .directory
            .find_by_id(requester_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("User {requester_id}")))?;
        match requester.role {
            Role::Doctor => {}
            Role::Admin => {
                return Err(AccessError::Forbidden(
                    "only doctors can request record access".into(),
                ));
            }
        }

        if self.records.patient(subject_id).await?.is_none() {
            return Err(AccessError::NotFound(format!("Patient {subject_id}")));
        }

        let now = self.clock.now();
        let grant = match self
            .db
            .insert_grant(requester_id, subject_id, kind, reason, now)
            .await
        {
            Ok(grant) => grant,
            Err(DatabaseError::UniqueViolation(_)) => return Err(AccessError::Conflict),
            Err(e) => return Err(e.into()),
        };

        info!(grant_id = grant.id, "Access requested");
        telemetry::grant_transition(GrantStatus::Pending);
        Ok(grant)
    }

    /// Approve a pending grant for `duration_minutes`, then notify the
    /// requester. The approval stands whether or not the notification
    /// goes through.
    #[instrument(skip(self, code))]
    pub async fn approve(
        &self,
        grant_id: i64,
        code: CodeChoice,
        duration_minutes: i64,
    ) -> Result<Approval, AccessError> {
        if duration_minutes < 1 {
            return Err(AccessError::InvalidInput(
                "duration_minutes must be at least 1".into(),
            ));
        }
        let duration_secs = duration_minutes
            .checked_mul(60)
            .ok_or_else(|| AccessError::InvalidInput("duration_minutes is too large".into()))?;

        let code = match code {
            CodeChoice::Supplied(c) => {
                let c = c.trim();
                if c.is_empty() || c.len() > MAX_SUPPLIED_CODE_LEN {
                    return Err(AccessError::InvalidInput(format!(
                        "access_code must be 1 to {MAX_SUPPLIED_CODE_LEN} characters"
                    )));
                }
                c.to_string()
            }
            CodeChoice::Generate => generate_access_code(self.policy.generated_code_len),
        };

        let current = self.db.get_grant(grant_id).await?;
        ensure_pending(&current)?;

        let now = self.clock.now();
        let expires_at = now
            .checked_add(duration_secs)
            .ok_or_else(|| AccessError::InvalidInput("duration_minutes is too large".into()))?;

        let Some(grant) = self
            .db
            .approve_grant(grant_id, &code, expires_at, now)
            .await?
        else {
            return Err(self.lost_race(grant_id).await);
        };

        info!(grant_id, expires_at, "Access approved");
        telemetry::grant_transition(GrantStatus::Approved);

        let notice = self.notify_requester(&grant, &code).await;
        Ok(Approval {
            grant,
            code,
            notice,
        })
    }

    #[instrument(skip(self))]
    pub async fn reject(&self, grant_id: i64) -> Result<AccessGrant, AccessError> {
        let current = self.db.get_grant(grant_id).await?;
        ensure_pending(&current)?;

        let Some(grant) = self.db.reject_grant(grant_id, self.clock.now()).await? else {
            return Err(self.lost_race(grant_id).await);
        };

        info!(grant_id, "Access rejected");
        telemetry::grant_transition(GrantStatus::Rejected);
        Ok(grant)
    }

    /// Unlock a patient's records with an access code.
    ///
    /// Succeeds only for an approved, unexpired grant held by `requester_id`
    /// whose code matches exactly. Every other case is `AccessDenied`.
    #[instrument(skip(self, code))]
    pub async fn redeem(
        &self,
        requester_id: i64,
        subject_id: i64,
        code: &str,
    ) -> Result<RecordView, AccessError> {
        let now = self.clock.now();
        let code = code.trim();

        let grant = self
            .db
            .find_redeemable_grants(requester_id, subject_id, now)
            .await?
            .into_iter()
            .find(|g| {
                g.code
                    .as_deref()
                    .is_some_and(|stored| constant_time_str_eq(stored, code))
            });

        let Some(grant) = grant else {
            warn!("Access code redemption denied");
            telemetry::grant_redeemed(false);
            return Err(AccessError::AccessDenied);
        };

        let patient = self
            .records
            .patient(subject_id)
            .await?
            .ok_or_else(|| AccessError::NotFound(format!("Patient {subject_id}")))?;

        let history = self
            .records
            .records_for_patient(subject_id)
            .await?
            .into_iter()
            .map(|r| self.open_record(r))
            .collect::<Result<Vec<_>, _>>()?;

        info!(grant_id = grant.id, records = history.len(), "Access code redeemed");
        telemetry::grant_redeemed(true);

        Ok(RecordView {
            patient,
            latest: history.first().cloned(),
            history,
            access_kind: grant.access_kind,
            access_granted_at: grant.decided_at,
            access_expires_at: grant.expires_at,
        })
    }

    /// Pending requests, optionally for one patient.
    pub async fn list_pending(&self, subject_id: Option<i64>) -> Result<Vec<GrantView>, AccessError> {
        self.list(GrantFilter {
            status: Some(GrantStatus::Pending),
            subject_id,
            requester_id: None,
        })
        .await
    }

    /// Everything a doctor has requested, newest first.
    pub async fn list_for_requester(&self, requester_id: i64) -> Result<Vec<GrantView>, AccessError> {
        self.list(GrantFilter {
            requester_id: Some(requester_id),
            ..GrantFilter::default()
        })
        .await
    }

    pub async fn list(&self, filter: GrantFilter) -> Result<Vec<GrantView>, AccessError> {
        let now = self.clock.now();
        Ok(self
            .db
            .list_grants(filter)
            .await?
            .into_iter()
            .map(|grant| GrantView {
                expired: grant.is_expired_at(now),
                grant,
            })
            .collect())
    }

    fn open_record(&self, record: MedicalRecord) -> Result<RecordEntry, AccessError> {
        let sealed = SealedRecord::from_parts(record.diagnosis_ciphertext, &record.diagnosis_nonce)?;
        Ok(RecordEntry {
            id: record.id,
            author_id: record.author_id,
            diagnosis: self.cipher.open(&sealed)?,
            notes: record.notes,
            symptoms: record.symptoms,
            treatment: record.treatment,
            medications: record.medications,
            created_at: record.created_at,
        })
    }

    /// The conditional update matched nothing: someone else decided first.
    async fn lost_race(&self, grant_id: i64) -> AccessError {
        match self.db.get_grant(grant_id).await {
            Ok(g) => AccessError::InvalidState(g.status),
            Err(e) => e.into(),
        }
    }

    async fn notify_requester(&self, grant: &AccessGrant, code: &str) -> Notice {
        let doctor = match self.directory.find_by_id(grant.requester_id).await {
            Ok(Some(doctor)) => doctor,
            Ok(None) => return failed_notice("requester account not found", "the doctor", code),
            Err(e) => return failed_notice(&e.to_string(), "the doctor", code),
        };

        let patient_name = match self.records.patient(grant.subject_id).await {
            Ok(Some(p)) => p.name,
            _ => format!("patient #{}", grant.subject_id),
        };

        let expires_at = grant.expires_at.unwrap_or_default();
        let message = Message::access_code(&doctor.display_name, &patient_name, code, expires_at);

        match self.notifier.send(&doctor.email, &message).await {
            Ok(()) => Notice::Delivered { to: doctor.email },
            Err(e) => {
                warn!(grant_id = grant.id, error = %e, "Access code notification failed");
                failed_notice(&e.to_string(), &doctor.display_name, code)
            }
        }
    }
}

fn ensure_pending(grant: &AccessGrant) -> Result<(), AccessError> {
    match grant.status {
        GrantStatus::Pending => Ok(()),
        GrantStatus::Approved | GrantStatus::Rejected => {
            Err(AccessError::InvalidState(grant.status))
        }
    }
}

fn failed_notice(reason: &str, doctor: &str, code: &str) -> Notice {
    Notice::Failed {
        reason: reason.to_string(),
        manual_notice: format!("Email could not be sent. Please give access code {code} to {doctor} manually."),
    }
}
