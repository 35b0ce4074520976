//! Storage layer tests for `MedInsight`.

use medinsight_crypto::RecordCipher;

use super::db::{DatabaseError, MedDatabase};
use super::models::*;
use super::queries_otp::ChallengeWindow;

async fn test_db() -> MedDatabase {
    MedDatabase::open_in_memory().await.unwrap()
}

async fn seed_doctor_and_patient(db: &MedDatabase) -> (User, Patient) {
    let doctor = db
        .create_user("Dr. Rina", "rina@example.com", "hash", Role::Doctor, Some("Cardiology"))
        .await
        .unwrap();
    let patient = db
        .create_patient(&NewPatient {
            name: "Budi",
            ..NewPatient::default()
        })
        .await
        .unwrap();
    (doctor, patient)
}

fn window(code: &str, now: i64) -> ChallengeWindow<'_> {
    ChallengeWindow {
        code,
        now,
        expires_at: now + 180,
        resend_allowed_at: now + 90,
    }
}

// === File-backed database ===

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("medinsight.db");

    let db = MedDatabase::open(&path).await.unwrap();
    db.create_user("Dr. Rina", "rina@example.com", "hash", Role::Doctor, None)
        .await
        .unwrap();
    drop(db);

    let reopened = MedDatabase::open(&path).await.unwrap();
    let user = reopened
        .get_user_by_email("rina@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.role, Role::Doctor);
}

// === User tests ===

#[tokio::test]
async fn create_and_get_user() {
    let db = test_db().await;
    let user = db
        .create_user("Admin", "Admin@Example.com ", "hash123", Role::Admin, None)
        .await
        .unwrap();

    assert_eq!(user.email, "admin@example.com");
    assert_eq!(user.role, Role::Admin);

    let fetched = db.get_user(user.id).await.unwrap();
    assert_eq!(fetched.name, "Admin");
}

#[tokio::test]
async fn get_user_by_email_is_case_insensitive() {
    let db = test_db().await;
    db.create_user("Rina", "rina@example.com", "h", Role::Doctor, None)
        .await
        .unwrap();

    assert!(db.get_user_by_email("RINA@example.com").await.unwrap().is_some());
    assert!(db.get_user_by_email("nobody@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_email_is_unique_violation() {
    let db = test_db().await;
    db.create_user("A", "a@example.com", "h", Role::Doctor, None)
        .await
        .unwrap();
    let err = db
        .create_user("B", "A@example.com", "h", Role::Doctor, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::UniqueViolation(_)));
}

#[tokio::test]
async fn token_revocation_round() {
    let db = test_db().await;
    assert!(!db.is_token_revoked("jti-1").await.unwrap());

    db.revoke_token("jti-1", 2_000).await.unwrap();
    db.revoke_token("jti-1", 2_000).await.unwrap();
    assert!(db.is_token_revoked("jti-1").await.unwrap());

    assert_eq!(db.purge_revoked_tokens(1_999).await.unwrap(), 0);
    assert_eq!(db.purge_revoked_tokens(2_000).await.unwrap(), 1);
    assert!(!db.is_token_revoked("jti-1").await.unwrap());
}

// === Record tests ===

#[tokio::test]
async fn records_are_stored_sealed_and_listed_newest_first() {
    let db = test_db().await;
    let (doctor, patient) = seed_doctor_and_patient(&db).await;
    let cipher = RecordCipher::from_secret(b"storage-test").unwrap();

    for diagnosis in ["flu", "bronchitis"] {
        let sealed = cipher.seal(diagnosis).unwrap();
        db.add_medical_record(&NewMedicalRecord {
            patient_id: patient.id,
            author_id: doctor.id,
            diagnosis: &sealed,
            notes: None,
            symptoms: Some("cough"),
            treatment: None,
            medications: None,
        })
        .await
        .unwrap();
    }

    let records = db.list_medical_records(patient.id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].diagnosis_ciphertext, b"bronchitis");

    let sealed = medinsight_crypto::SealedRecord::from_parts(
        records[0].diagnosis_ciphertext.clone(),
        &records[0].diagnosis_nonce,
    )
    .unwrap();
    assert_eq!(cipher.open(&sealed).unwrap(), "bronchitis");
}

#[tokio::test]
async fn missing_patient_is_not_found() {
    let db = test_db().await;
    assert!(matches!(
        db.get_patient(404).await,
        Err(DatabaseError::NotFound(_))
    ));
}

// === OTP tests ===

#[tokio::test]
async fn only_one_open_challenge_per_pair() {
    let db = test_db().await;
    db.insert_challenge("bob@x.com", OtpPurpose::Login, window("111111", 1_000))
        .await
        .unwrap();

    let err = db
        .insert_challenge("bob@x.com", OtpPurpose::Login, window("222222", 1_001))
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::UniqueViolation(_)));

    // A different purpose is an independent pair.
    db.insert_challenge("bob@x.com", OtpPurpose::PasswordReset, window("333333", 1_001))
        .await
        .unwrap();
}

#[tokio::test]
async fn verified_challenge_frees_the_pair() {
    let db = test_db().await;
    let c = db
        .insert_challenge("bob@x.com", OtpPurpose::Login, window("111111", 1_000))
        .await
        .unwrap();
    assert!(db.mark_verified(c.id).await.unwrap());
    assert!(!db.mark_verified(c.id).await.unwrap());

    assert!(
        db.find_unverified_challenge("bob@x.com", OtpPurpose::Login)
            .await
            .unwrap()
            .is_none()
    );
    let latest = db
        .find_latest_challenge("bob@x.com", OtpPurpose::Login)
        .await
        .unwrap()
        .unwrap();
    assert!(latest.verified);

    db.insert_challenge("bob@x.com", OtpPurpose::Login, window("222222", 1_010))
        .await
        .unwrap();
    let latest = db
        .find_latest_challenge("bob@x.com", OtpPurpose::Login)
        .await
        .unwrap()
        .unwrap();
    assert!(!latest.verified);
    assert_eq!(latest.code, "222222");
}

#[tokio::test]
async fn regenerate_is_compare_and_swap() {
    let db = test_db().await;
    let c = db
        .insert_challenge("bob@x.com", OtpPurpose::Login, window("111111", 1_000))
        .await
        .unwrap();
    let bumped = db.record_attempt(c.id).await.unwrap().unwrap();
    assert_eq!(bumped.attempts, 1);

    // Stale version loses.
    assert!(
        db.regenerate_challenge(c.id, c.version, window("999999", 1_100))
            .await
            .unwrap()
            .is_none()
    );

    let fresh = db
        .regenerate_challenge(c.id, bumped.version, window("999999", 1_100))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.code, "999999");
    assert_eq!(fresh.attempts, 0);
    assert_eq!(fresh.expires_at, 1_280);
}

#[tokio::test]
async fn attempts_stop_counting_after_verification() {
    let db = test_db().await;
    let c = db
        .insert_challenge("bob@x.com", OtpPurpose::Login, window("111111", 1_000))
        .await
        .unwrap();
    db.mark_verified(c.id).await.unwrap();
    assert!(db.record_attempt(c.id).await.unwrap().is_none());
}

#[tokio::test]
async fn sweep_deletes_only_expired() {
    let db = test_db().await;
    db.insert_challenge("a@x.com", OtpPurpose::Login, window("111111", 1_000))
        .await
        .unwrap();
    db.insert_challenge("b@x.com", OtpPurpose::Login, window("222222", 1_100))
        .await
        .unwrap();

    assert_eq!(db.delete_expired_challenges(1_180).await.unwrap(), 1);
    assert!(
        db.find_unverified_challenge("b@x.com", OtpPurpose::Login)
            .await
            .unwrap()
            .is_some()
    );
}

// === Grant tests ===

#[tokio::test]
async fn one_pending_grant_per_pair() {
    let db = test_db().await;
    let (doctor, patient) = seed_doctor_and_patient(&db).await;

    let first = db
        .insert_grant(doctor.id, patient.id, AccessKind::View, Some("follow-up"), 1_000)
        .await
        .unwrap();
    assert_eq!(first.status, GrantStatus::Pending);

    let err = db
        .insert_grant(doctor.id, patient.id, AccessKind::Edit, None, 1_001)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::UniqueViolation(_)));

    db.reject_grant(first.id, 1_002).await.unwrap().unwrap();
    db.insert_grant(doctor.id, patient.id, AccessKind::Edit, None, 1_003)
        .await
        .unwrap();
}

#[tokio::test]
async fn transitions_only_from_pending() {
    let db = test_db().await;
    let (doctor, patient) = seed_doctor_and_patient(&db).await;
    let g = db
        .insert_grant(doctor.id, patient.id, AccessKind::View, None, 1_000)
        .await
        .unwrap();

    let approved = db.approve_grant(g.id, "AB12", 4_600, 1_000).await.unwrap().unwrap();
    assert_eq!(approved.status, GrantStatus::Approved);
    assert_eq!(approved.code.as_deref(), Some("AB12"));
    assert_eq!(approved.decided_at, Some(1_000));

    assert!(db.approve_grant(g.id, "ZZ99", 9_000, 1_001).await.unwrap().is_none());
    assert!(db.reject_grant(g.id, 1_001).await.unwrap().is_none());
    assert_eq!(db.get_grant(g.id).await.unwrap().code.as_deref(), Some("AB12"));
}

#[tokio::test]
async fn redeemable_grants_respect_expiry() {
    let db = test_db().await;
    let (doctor, patient) = seed_doctor_and_patient(&db).await;
    let g = db
        .insert_grant(doctor.id, patient.id, AccessKind::View, None, 1_000)
        .await
        .unwrap();
    db.approve_grant(g.id, "AB12", 4_600, 1_000).await.unwrap();

    assert_eq!(
        db.find_redeemable_grants(doctor.id, patient.id, 4_599)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(
        db.find_redeemable_grants(doctor.id, patient.id, 4_600)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn list_grants_filters() {
    let db = test_db().await;
    let (doctor, patient) = seed_doctor_and_patient(&db).await;
    let other = db
        .create_patient(&NewPatient {
            name: "Sari",
            ..NewPatient::default()
        })
        .await
        .unwrap();

    let g1 = db
        .insert_grant(doctor.id, patient.id, AccessKind::View, None, 1_000)
        .await
        .unwrap();
    db.insert_grant(doctor.id, other.id, AccessKind::Edit, None, 1_001)
        .await
        .unwrap();
    db.approve_grant(g1.id, "AB12", 5_000, 1_002).await.unwrap();

    let all = db.list_grants(GrantFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let pending = db
        .list_grants(GrantFilter {
            status: Some(GrantStatus::Pending),
            ..GrantFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].subject_id, other.id);

    let for_patient = db
        .list_grants(GrantFilter {
            subject_id: Some(patient.id),
            requester_id: Some(doctor.id),
            ..GrantFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(for_patient.len(), 1);
    assert_eq!(for_patient[0].id, g1.id);
}
