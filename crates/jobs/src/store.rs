//! Job and patient record storage seams

use contracts::{JobError, JobId, Patient, PatientId};

use crate::SegmentationJob;

/// A stored job record that exists but could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct UnreadableRecord {
    /// Recovered from the record's name when it parses
    pub job_id: Option<JobId>,
    pub location: String,
    pub reason: String,
}

/// Result of scanning a job store
#[derive(Debug, Default)]
pub struct JobListing {
    /// Oldest first
    pub jobs: Vec<SegmentationJob>,
    pub unreadable: Vec<UnreadableRecord>,
}

/// Persistent job records
#[trait_variant::make(JobStore: Send)]
pub trait LocalJobStore {
    /// Insert or replace a job record
    async fn save(&self, job: &SegmentationJob) -> Result<(), JobError>;

    async fn load(&self, id: JobId) -> Result<Option<SegmentationJob>, JobError>;

    /// Every stored job, plus any record that failed to decode
    async fn list(&self) -> Result<JobListing, JobError>;
}

/// Patient registry with clinician assignments
#[trait_variant::make(PatientDirectory: Send)]
pub trait LocalPatientDirectory {
    async fn get_patient(&self, id: &PatientId) -> Result<Option<Patient>, JobError>;

    /// Insert or replace a patient
    async fn upsert_patient(&self, patient: Patient) -> Result<(), JobError>;

    async fn list_patients(&self) -> Result<Vec<Patient>, JobError>;
}
