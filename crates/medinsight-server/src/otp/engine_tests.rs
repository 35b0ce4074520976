use std::sync::Arc;

use medinsight_core::SharedClock;
use medinsight_core::clock::ManualClock;
use medinsight_core::config::OtpPolicy;

use super::*;
use crate::storage::{MedDatabase, OtpChallenge, OtpPurpose};

const START: i64 = 1_750_000_000;

trait OutcomeExt {
    fn challenge(&self) -> &OtpChallenge;
    fn needs_dispatch(&self) -> bool;
}

impl OutcomeExt for IssueOutcome {
    fn challenge(&self) -> &OtpChallenge {
        match self {
            Self::Created(c) | Self::Regenerated(c) | Self::CoolingDown { challenge: c, .. } => c,
        }
    }

    fn needs_dispatch(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Regenerated(_))
    }
}
const BOB: &str = "bob@x.com";

struct Harness {
    engine: OtpEngine,
    clock: Arc<ManualClock>,
    db: MedDatabase,
}

async fn harness() -> Harness {
    let db = MedDatabase::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let shared: SharedClock = clock.clone();
    Harness {
        engine: OtpEngine::new(db.clone(), shared, OtpPolicy::default()),
        clock,
        db,
    }
}

fn wrong_code(right: &str) -> String {
    let wrong = if right == "000000" { "000001" } else { "000000" };
    wrong.to_string()
}

// === issue ===

#[tokio::test]
async fn first_issue_creates_challenge() {
    let h = harness().await;
    let outcome = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();

    assert!(matches!(outcome, IssueOutcome::Created(_)));
    assert!(outcome.needs_dispatch());
    let c = outcome.challenge();
    assert_eq!(c.code.len(), 6);
    assert_eq!(c.expires_at, START + 180);
    assert_eq!(c.resend_allowed_at, START + 90);
    assert_eq!(c.attempts, 0);
    assert!(!c.verified);
}

#[tokio::test]
async fn issue_within_cooldown_returns_same_code() {
    let h = harness().await;
    let first = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();

    h.clock.advance(89);
    let second = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();

    match &second {
        IssueOutcome::CoolingDown {
            challenge,
            remaining_secs,
        } => {
            assert_eq!(challenge.code, first.challenge().code);
            assert_eq!(challenge.id, first.challenge().id);
            assert_eq!(*remaining_secs, 1);
        }
        other => panic!("expected CoolingDown, got {other:?}"),
    }
    assert!(!second.needs_dispatch());
    assert!(matches!(
        second.into_dispatchable(),
        Err(OtpError::RateLimited { remaining_secs: 1 })
    ));
}

#[tokio::test]
async fn issue_after_cooldown_regenerates_in_place() {
    let h = harness().await;
    let first = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
    let first_code = first.challenge().code.clone();

    // Burn an attempt so the reset is observable.
    let _ = h
        .engine
        .verify(BOB, OtpPurpose::Login, &wrong_code(&first_code))
        .await;

    h.clock.advance(90);
    let mut saw_new_code = false;
    let outcome = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
    let c = outcome.challenge();
    assert!(matches!(outcome, IssueOutcome::Regenerated(_)));
    assert_eq!(c.id, first.challenge().id);
    assert_eq!(c.attempts, 0);
    assert_eq!(c.expires_at, START + 90 + 180);
    assert_eq!(c.resend_allowed_at, START + 90 + 90);
    saw_new_code |= c.code != first_code;

    // A fresh random code collides with the old one one time in a million;
    // a couple more rounds make a false failure practically impossible.
    for _ in 0..3 {
        h.clock.advance(90);
        let again = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
        saw_new_code |= again.challenge().code != first_code;
    }
    assert!(saw_new_code);
}

#[tokio::test]
async fn purposes_are_independent() {
    let h = harness().await;
    let login = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
    let reset = h.engine.issue(BOB, OtpPurpose::PasswordReset).await.unwrap();

    assert!(matches!(reset, IssueOutcome::Created(_)));
    assert_ne!(login.challenge().id, reset.challenge().id);
}

#[tokio::test]
async fn identity_is_normalized() {
    let h = harness().await;
    let first = h.engine.issue("  Bob@X.com", OtpPurpose::Login).await.unwrap();
    assert_eq!(first.challenge().identity, BOB);

    let second = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
    assert!(matches!(second, IssueOutcome::CoolingDown { .. }));
}

#[tokio::test]
async fn issue_rejects_non_email_identity() {
    let h = harness().await;
    assert!(matches!(
        h.engine.issue("   ", OtpPurpose::Login).await,
        Err(OtpError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn issue_sweeps_expired_rows_for_any_identity() {
    let h = harness().await;
    h.engine.issue("alice@x.com", OtpPurpose::Login).await.unwrap();

    h.clock.advance(180);
    let outcome = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
    assert!(matches!(outcome, IssueOutcome::Created(_)));

    assert!(
        h.db
            .find_latest_challenge("alice@x.com", OtpPurpose::Login)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn issue_after_expiry_creates_fresh_row() {
    let h = harness().await;
    let first = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();

    h.clock.advance(200);
    let second = h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
    assert!(matches!(second, IssueOutcome::Created(_)));
    assert_ne!(second.challenge().id, first.challenge().id);
}

#[tokio::test]
async fn concurrent_issues_leave_one_open_challenge() {
    let h = harness().await;
    let (a, b) = tokio::join!(
        h.engine.issue(BOB, OtpPurpose::Login),
        h.engine.issue(BOB, OtpPurpose::Login)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.challenge().id, b.challenge().id);
    assert_eq!(a.challenge().code, b.challenge().code);
    assert_eq!(
        [a.needs_dispatch(), b.needs_dispatch()]
            .iter()
            .filter(|d| **d)
            .count(),
        1
    );
}

// === resend ===

#[tokio::test]
async fn resend_requires_existing_challenge() {
    let h = harness().await;
    assert!(matches!(
        h.engine.resend(BOB, OtpPurpose::Login).await,
        Err(OtpError::NotFound)
    ));
}

#[tokio::test]
async fn resend_respects_cooldown() {
    let h = harness().await;
    h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();

    h.clock.advance(30);
    assert!(matches!(
        h.engine.resend(BOB, OtpPurpose::Login).await,
        Err(OtpError::RateLimited { remaining_secs: 60 })
    ));

    h.clock.advance(60);
    let c = h.engine.resend(BOB, OtpPurpose::Login).await.unwrap();
    assert_eq!(c.attempts, 0);
    assert_eq!(c.resend_allowed_at, START + 90 + 90);
}

#[tokio::test]
async fn resend_reopens_verified_challenge() {
    let h = harness().await;
    let code = h
        .engine
        .issue(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .challenge()
        .code
        .clone();
    h.engine.verify(BOB, OtpPurpose::Login, &code).await.unwrap();

    h.clock.advance(90);
    let reopened = h.engine.resend(BOB, OtpPurpose::Login).await.unwrap();
    assert!(!reopened.verified);

    let status = h.engine.status(BOB, OtpPurpose::Login).await.unwrap();
    assert!(status.has_active);
    assert!(!status.is_verified);
}

// === verify ===

#[tokio::test]
async fn verify_with_correct_code_then_consumed() {
    let h = harness().await;
    let code = h
        .engine
        .issue(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .challenge()
        .code
        .clone();

    let ok = h.engine.verify(BOB, OtpPurpose::Login, &code).await.unwrap();
    assert_eq!(ok.identity, BOB);
    assert_eq!(ok.purpose, OtpPurpose::Login);
    assert_eq!(ok.verified_at, START);

    assert!(matches!(
        h.engine.verify(BOB, OtpPurpose::Login, &code).await,
        Err(OtpError::NotFound)
    ));
}

#[tokio::test]
async fn verify_without_challenge_is_not_found() {
    let h = harness().await;
    assert!(matches!(
        h.engine.verify(BOB, OtpPurpose::Login, "123456").await,
        Err(OtpError::NotFound)
    ));
}

#[tokio::test]
async fn wrong_codes_count_down_then_lock_out() {
    let h = harness().await;
    let code = h
        .engine
        .issue(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .challenge()
        .code
        .clone();
    let wrong = wrong_code(&code);

    for expected in [2, 1, 0] {
        match h.engine.verify(BOB, OtpPurpose::Login, &wrong).await {
            Err(OtpError::InvalidCode { attempts_remaining }) => {
                assert_eq!(attempts_remaining, expected);
            }
            other => panic!("expected InvalidCode, got {other:?}"),
        }
    }

    assert!(matches!(
        h.engine.verify(BOB, OtpPurpose::Login, &wrong).await,
        Err(OtpError::TooManyAttempts)
    ));
    // Locked out even with the right code.
    assert!(matches!(
        h.engine.verify(BOB, OtpPurpose::Login, &code).await,
        Err(OtpError::TooManyAttempts)
    ));

    let row = h
        .db
        .find_unverified_challenge(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.attempts, 5);
}

#[tokio::test]
async fn expired_code_is_refused_even_when_correct() {
    let h = harness().await;
    let code = h
        .engine
        .issue(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .challenge()
        .code
        .clone();

    h.clock.advance(180);
    assert!(matches!(
        h.engine.verify(BOB, OtpPurpose::Login, &code).await,
        Err(OtpError::Expired)
    ));

    let row = h
        .db
        .find_unverified_challenge(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.attempts, 1);
}

#[tokio::test]
async fn malformed_code_is_invalid_input_and_not_counted() {
    let h = harness().await;
    h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();

    for bad in ["12345", "abcdef", "1234567", ""] {
        assert!(matches!(
            h.engine.verify(BOB, OtpPurpose::Login, bad).await,
            Err(OtpError::InvalidInput(_))
        ));
    }

    let row = h
        .db
        .find_unverified_challenge(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.attempts, 0);
}

// === status ===

#[tokio::test]
async fn status_projects_cooldown_and_attempts() {
    let h = harness().await;
    assert!(matches!(
        h.engine.status(BOB, OtpPurpose::Login).await,
        Err(OtpError::NotFound)
    ));

    let code = h
        .engine
        .issue(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .challenge()
        .code
        .clone();
    let _ = h
        .engine
        .verify(BOB, OtpPurpose::Login, &wrong_code(&code))
        .await;
    h.clock.advance(30);

    let s = h.engine.status(BOB, OtpPurpose::Login).await.unwrap();
    assert_eq!(
        s,
        StatusView {
            has_active: true,
            is_verified: false,
            can_resend: false,
            remaining_cooldown_secs: 60,
            attempts_remaining: 2,
            expires_in_secs: 150,
        }
    );

    h.clock.advance(200);
    let s = h.engine.status(BOB, OtpPurpose::Login).await.unwrap();
    assert!(!s.has_active);
    assert!(s.can_resend);
    assert_eq!(s.remaining_cooldown_secs, 0);
    assert_eq!(s.expires_in_secs, 0);
}

#[tokio::test]
async fn status_does_not_mutate() {
    let h = harness().await;
    h.engine.issue(BOB, OtpPurpose::Login).await.unwrap();
    let before = h
        .db
        .find_unverified_challenge(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .unwrap();

    h.engine.status(BOB, OtpPurpose::Login).await.unwrap();
    let after = h
        .db
        .find_unverified_challenge(BOB, OtpPurpose::Login)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.version, after.version);
}
