//! Read access to patients and their encrypted records.
//!
//! Only the access engine consumes this, and only inside a successful
//! redemption.

use async_trait::async_trait;

use crate::storage::{DatabaseError, MedDatabase, MedicalRecord, Patient};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn patient(&self, id: i64) -> Result<Option<Patient>, DatabaseError>;

    /// Records for a patient, newest first. Diagnoses are still sealed.
    async fn records_for_patient(&self, id: i64) -> Result<Vec<MedicalRecord>, DatabaseError>;
}

#[async_trait]
impl RecordStore for MedDatabase {
    async fn patient(&self, id: i64) -> Result<Option<Patient>, DatabaseError> {
        match self.get_patient(id).await {
            Ok(p) => Ok(Some(p)),
            Err(DatabaseError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn records_for_patient(&self, id: i64) -> Result<Vec<MedicalRecord>, DatabaseError> {
        self.list_medical_records(id).await
    }
}
