//! In-memory stores

use std::collections::HashMap;

use contracts::{JobError, JobId, Patient, PatientId};
use tokio::sync::RwLock;

use crate::store::{JobListing, JobStore, PatientDirectory};
use crate::SegmentationJob;

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, SegmentationJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    async fn save(&self, job: &SegmentationJob) -> Result<(), JobError> {
        self.jobs.write().await.insert(job.id(), job.clone());
        Ok(())
    }

    async fn load(&self, id: JobId) -> Result<Option<SegmentationJob>, JobError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<JobListing, JobError> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| (job.created_at(), job.id()));
        Ok(JobListing {
            jobs,
            unreadable: Vec::new(),
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryPatientDirectory {
    patients: RwLock<HashMap<PatientId, Patient>>,
}

impl MemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patients(patients: impl IntoIterator<Item = Patient>) -> Self {
        Self {
            patients: RwLock::new(patients.into_iter().map(|p| (p.id.clone(), p)).collect()),
        }
    }
}

impl PatientDirectory for MemoryPatientDirectory {
    async fn get_patient(&self, id: &PatientId) -> Result<Option<Patient>, JobError> {
        Ok(self.patients.read().await.get(id).cloned())
    }

    async fn upsert_patient(&self, patient: Patient) -> Result<(), JobError> {
        self.patients.write().await.insert(patient.id.clone(), patient);
        Ok(())
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, JobError> {
        let mut patients: Vec<_> = self.patients.read().await.values().cloned().collect();
        patients.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(patients)
    }
}
