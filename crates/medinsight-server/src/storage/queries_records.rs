//! Patient and medical record queries.

use medinsight_core::db::unix_timestamp;

use super::db::{DatabaseError, MedDatabase};
use super::models::{MedicalRecord, NewMedicalRecord, NewPatient, Patient};

impl MedDatabase {
    pub async fn create_patient(&self, patient: &NewPatient<'_>) -> Result<Patient, DatabaseError> {
        let now = unix_timestamp();

        let row = sqlx::query_as::<_, Patient>(
            "INSERT INTO patients (name, birth_date, gender, phone, address, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(patient.name)
        .bind(patient.birth_date)
        .bind(patient.gender)
        .bind(patient.phone)
        .bind(patient.address)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    pub async fn get_patient(&self, id: i64) -> Result<Patient, DatabaseError> {
        sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Patient {id}")))
    }

    /// Store a medical record whose diagnosis is already sealed.
    pub async fn add_medical_record(
        &self,
        record: &NewMedicalRecord<'_>,
    ) -> Result<MedicalRecord, DatabaseError> {
        let row = sqlx::query_as::<_, MedicalRecord>(
            "INSERT INTO medical_records
                (patient_id, author_id, diagnosis_ciphertext, diagnosis_nonce,
                 notes, symptoms, treatment, medications, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(record.patient_id)
        .bind(record.author_id)
        .bind(record.diagnosis.ciphertext.as_slice())
        .bind(record.diagnosis.nonce.as_slice())
        .bind(record.notes)
        .bind(record.symptoms)
        .bind(record.treatment)
        .bind(record.medications)
        .bind(unix_timestamp())
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    /// All records for a patient, newest first.
    pub async fn list_medical_records(
        &self,
        patient_id: i64,
    ) -> Result<Vec<MedicalRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, MedicalRecord>(
            "SELECT * FROM medical_records WHERE patient_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(patient_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }
}
