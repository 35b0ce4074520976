use medinsight_core::SharedClock;
use medinsight_core::config::OtpPolicy;
use medinsight_crypto::{constant_time_str_eq, generate_otp_code, is_well_formed_otp};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::error::OtpError;
use crate::storage::{
    ChallengeWindow, DatabaseError, MedDatabase, OtpChallenge, OtpPurpose, normalize_email,
};
use crate::telemetry;

/// Bound on compare-and-swap retries when another request touches the same
/// pair between our read and our write.
const MAX_CAS_RETRIES: usize = 3;

/// Result of [`OtpEngine::issue`].
#[derive(Debug, Clone)]
pub enum IssueOutcome {
    /// No open challenge existed; a new one was stored.
    Created(OtpChallenge),
    /// The open challenge was past its cooldown and got a fresh code.
    Regenerated(OtpChallenge),
    /// The open challenge is still cooling down and was left untouched.
    CoolingDown {
        challenge: OtpChallenge,
        remaining_secs: i64,
    },
}

impl IssueOutcome {
    /// The challenge to dispatch, or `RateLimited` while cooling down.
    pub fn into_dispatchable(self) -> Result<OtpChallenge, OtpError> {
        match self {
            Self::Created(c) | Self::Regenerated(c) => Ok(c),
            Self::CoolingDown { remaining_secs, .. } => {
                Err(OtpError::RateLimited { remaining_secs })
            }
        }
    }
}

/// A successfully verified challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub identity: String,
    pub purpose: OtpPurpose,
    pub verified_at: i64,
}

/// Read-only projection of the current challenge for a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    /// Unverified and not yet expired.
    pub has_active: bool,
    pub is_verified: bool,
    pub can_resend: bool,
    pub remaining_cooldown_secs: i64,
    pub attempts_remaining: i64,
    pub expires_in_secs: i64,
}

/// Issues, rate-limits and verifies one-time codes.
///
/// The engine never sends anything; callers dispatch the code carried by a
/// created or regenerated challenge.
#[derive(Clone)]
pub struct OtpEngine {
    db: MedDatabase,
    clock: SharedClock,
    policy: OtpPolicy,
}

impl OtpEngine {
    pub fn new(db: MedDatabase, clock: SharedClock, policy: OtpPolicy) -> Self {
        Self { db, clock, policy }
    }

    pub const fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    fn window<'a>(&self, code: &'a str, now: i64) -> ChallengeWindow<'a> {
        ChallengeWindow {
            code,
            now,
            expires_at: now + self.policy.expiry_secs,
            resend_allowed_at: now + self.policy.resend_cooldown_secs,
        }
    }

    /// Create, regenerate or return the open challenge for a pair.
    ///
    /// Expired rows for every identity are swept first.
    #[instrument(skip(self))]
    pub async fn issue(
        &self,
        identity: &str,
        purpose: OtpPurpose,
    ) -> Result<IssueOutcome, OtpError> {
        let identity = checked_identity(identity)?;
        self.sweep_expired().await?;

        for _ in 0..MAX_CAS_RETRIES {
            let now = self.clock.now();
            let existing = self.db.find_unverified_challenge(&identity, purpose).await?;

            let Some(existing) = existing else {
                let code = generate_otp_code();
                match self
                    .db
                    .insert_challenge(&identity, purpose, self.window(&code, now))
                    .await
                {
                    Ok(challenge) => {
                        info!(identity = %identity, challenge_id = challenge.id, "Challenge created");
                        telemetry::otp_issued(purpose);
                        return Ok(IssueOutcome::Created(challenge));
                    }
                    Err(DatabaseError::UniqueViolation(_)) => {
                        debug!(identity = %identity, "Lost insert race, re-reading challenge");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            if now < existing.resend_allowed_at {
                let remaining_secs = existing.cooldown_remaining_at(now);
                debug!(identity = %identity, remaining_secs, "Challenge still cooling down");
                return Ok(IssueOutcome::CoolingDown {
                    challenge: existing,
                    remaining_secs,
                });
            }

            let code = generate_otp_code();
            if let Some(challenge) = self
                .db
                .regenerate_challenge(existing.id, existing.version, self.window(&code, now))
                .await?
            {
                info!(identity = %identity, challenge_id = challenge.id, "Challenge regenerated");
                telemetry::otp_issued(purpose);
                return Ok(IssueOutcome::Regenerated(challenge));
            }
        }

        warn!(identity = %identity, "Challenge contention did not settle");
        Err(contention())
    }

    /// Regenerate the pair's challenge, which must already exist.
    ///
    /// Prefers the open challenge; otherwise the most recent verified one
    /// is reopened with a fresh code.
    #[instrument(skip(self))]
    pub async fn resend(&self, identity: &str, purpose: OtpPurpose) -> Result<OtpChallenge, OtpError> {
        let identity = checked_identity(identity)?;

        for _ in 0..MAX_CAS_RETRIES {
            let now = self.clock.now();
            let existing = self
                .db
                .find_latest_challenge(&identity, purpose)
                .await?
                .ok_or(OtpError::NotFound)?;

            if now < existing.resend_allowed_at {
                return Err(OtpError::RateLimited {
                    remaining_secs: existing.cooldown_remaining_at(now),
                });
            }

            let code = generate_otp_code();
            match self
                .db
                .regenerate_challenge(existing.id, existing.version, self.window(&code, now))
                .await
            {
                Ok(Some(challenge)) => {
                    info!(identity = %identity, challenge_id = challenge.id, "Challenge re-sent");
                    telemetry::otp_issued(purpose);
                    return Ok(challenge);
                }
                // Reopening a verified row while a newer open one appeared.
                Ok(None) | Err(DatabaseError::UniqueViolation(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        warn!(identity = %identity, "Challenge contention did not settle");
        Err(contention())
    }

    /// Check a submitted code against the open challenge for a pair.
    ///
    /// Every call against an existing challenge counts as an attempt, even
    /// when the challenge has expired or the code is right.
    #[instrument(skip(self, code))]
    pub async fn verify(
        &self,
        identity: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Verified, OtpError> {
        let identity = checked_identity(identity)?;
        let code = code.trim();
        if !is_well_formed_otp(code) {
            return Err(OtpError::InvalidInput("code must be six digits".into()));
        }

        let result = self.verify_inner(&identity, purpose, code).await;
        telemetry::otp_verified(
            purpose,
            match &result {
                Ok(_) => "verified",
                Err(e) => e.kind(),
            },
        );
        result
    }

    async fn verify_inner(
        &self,
        identity: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<Verified, OtpError> {
        let open = self
            .db
            .find_unverified_challenge(identity, purpose)
            .await?
            .ok_or(OtpError::NotFound)?;

        let challenge = self
            .db
            .record_attempt(open.id)
            .await?
            .ok_or(OtpError::NotFound)?;
        let now = self.clock.now();

        if challenge.is_expired_at(now) {
            debug!(identity, challenge_id = challenge.id, "Code expired");
            return Err(OtpError::Expired);
        }
        if challenge.attempts > self.policy.max_attempts {
            warn!(identity, challenge_id = challenge.id, "Attempt limit exceeded");
            return Err(OtpError::TooManyAttempts);
        }
        if !constant_time_str_eq(&challenge.code, code) {
            let attempts_remaining = (self.policy.max_attempts - challenge.attempts).max(0);
            debug!(identity, challenge_id = challenge.id, attempts_remaining, "Code mismatch");
            return Err(OtpError::InvalidCode { attempts_remaining });
        }

        if !self.db.mark_verified(challenge.id).await? {
            return Err(OtpError::NotFound);
        }

        info!(identity, challenge_id = challenge.id, "Challenge verified");
        Ok(Verified {
            identity: identity.to_string(),
            purpose,
            verified_at: now,
        })
    }

    /// Project the latest challenge for a pair without changing it.
    pub async fn status(&self, identity: &str, purpose: OtpPurpose) -> Result<StatusView, OtpError> {
        let identity = checked_identity(identity)?;
        let challenge = self
            .db
            .find_latest_challenge(&identity, purpose)
            .await?
            .ok_or(OtpError::NotFound)?;
        let now = self.clock.now();

        Ok(StatusView {
            has_active: !challenge.verified && !challenge.is_expired_at(now),
            is_verified: challenge.verified,
            can_resend: now >= challenge.resend_allowed_at,
            remaining_cooldown_secs: challenge.cooldown_remaining_at(now),
            attempts_remaining: (self.policy.max_attempts - challenge.attempts).max(0),
            expires_in_secs: (challenge.expires_at - now).max(0),
        })
    }

    /// Delete every challenge past its deadline.
    pub async fn sweep_expired(&self) -> Result<u64, OtpError> {
        let removed = self.db.delete_expired_challenges(self.clock.now()).await?;
        if removed > 0 {
            debug!(removed, "Swept expired challenges");
        }
        Ok(removed)
    }
}

fn checked_identity(identity: &str) -> Result<String, OtpError> {
    let identity = normalize_email(identity);
    if identity.is_empty() || !identity.contains('@') {
        return Err(OtpError::InvalidInput("a valid email address is required".into()));
    }
    Ok(identity)
}

fn contention() -> OtpError {
    OtpError::Storage(DatabaseError::Query(
        "challenge kept changing under concurrent requests".into(),
    ))
}
