//! JobService - the job record interface
//!
//! Owns every state transition after creation. Ownership is resolved once,
//! at `create`, against the patient directory: a job can only exist if its
//! patient has an assigned clinician and the requested clinician matches.

use chrono::Utc;
use contracts::{
    ClinicianId, JobConfig, JobError, JobEvent, JobFailure, JobId, JobResult, JobStatus,
    PatientId, SeriesId,
};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::stats::{DoctorStatistics, StatisticsAggregator};
use crate::store::{JobStore, PatientDirectory};
use crate::SegmentationJob;

#[derive(Debug)]
pub struct JobService<S, P> {
    store: S,
    patients: P,
    events: Option<mpsc::Sender<JobEvent>>,
}

impl<S, P> JobService<S, P>
where
    S: JobStore + Sync,
    P: PatientDirectory + Sync,
{
    pub fn new(store: S, patients: P) -> Self {
        Self {
            store,
            patients,
            events: None,
        }
    }

    /// Publish a `JobEvent` on every transition
    pub fn with_events(mut self, events: mpsc::Sender<JobEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn patients(&self) -> &P {
        &self.patients
    }

    /// Create a `pending` job bound to one patient and one clinician
    #[instrument(name = "job_create", skip_all, fields(patient = %patient_id, clinician = %clinician_id))]
    pub async fn create(
        &self,
        patient_id: PatientId,
        clinician_id: ClinicianId,
        series_id: SeriesId,
        config: JobConfig,
    ) -> Result<JobId, JobError> {
        let patient = self
            .patients
            .get_patient(&patient_id)
            .await?
            .ok_or_else(|| JobError::UnknownPatient(patient_id.clone()))?;

        let assigned = patient
            .assigned_clinician
            .ok_or_else(|| JobError::OrphanJob(patient_id.clone()))?;

        if assigned != clinician_id {
            return Err(JobError::ClinicianMismatch {
                patient_id,
                requested: clinician_id,
                assigned,
            });
        }

        let job = SegmentationJob::new(patient_id, clinician_id, series_id, config);
        self.store.save(&job).await?;
        metrics::counter!("tumorseg_jobs_created_total").increment(1);
        info!(job_id = %job.id(), "job created");
        self.publish(&job);
        Ok(job.id())
    }

    pub async fn get_job(&self, id: JobId) -> Result<SegmentationJob, JobError> {
        self.store.load(id).await?.ok_or(JobError::NotFound(id))
    }

    pub async fn get_status(&self, id: JobId) -> Result<JobStatus, JobError> {
        Ok(self.get_job(id).await?.status())
    }

    /// Metrics and artifact references of a completed (or validated) job
    pub async fn get_result(&self, id: JobId) -> Result<JobResult, JobError> {
        let job = self.get_job(id).await?;
        match job.result() {
            Some(result) if job.status().has_result() => Ok(result.clone()),
            _ => Err(JobError::NotReady {
                job_id: id,
                status: job.status(),
            }),
        }
    }

    /// Clinician sign-off: `completed → validated`
    #[instrument(name = "job_validate", skip_all, fields(job_id = %id, clinician = %clinician_id))]
    pub async fn validate(&self, id: JobId, clinician_id: &ClinicianId) -> Result<(), JobError> {
        self.transition(id, |job| job.validate(clinician_id, Utc::now()))
            .await
    }

    /// `pending → processing`, called when a pipeline run starts
    pub async fn begin(&self, id: JobId) -> Result<SegmentationJob, JobError> {
        self.transition(id, |job| job.start(Utc::now())).await?;
        self.get_job(id).await
    }

    /// `processing → completed`
    pub async fn complete(&self, id: JobId, result: JobResult) -> Result<(), JobError> {
        self.transition(id, |job| job.complete(result, Utc::now()))
            .await
    }

    /// `processing → failed`
    pub async fn fail(&self, id: JobId, failure: JobFailure) -> Result<(), JobError> {
        self.transition(id, |job| job.fail(failure, Utc::now()))
            .await
    }

    /// Jobs, optionally filtered by status
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
    ) -> Result<Vec<SegmentationJob>, JobError> {
        let jobs = self.store.list().await?.jobs;
        Ok(match status {
            Some(status) => jobs.into_iter().filter(|j| j.status() == status).collect(),
            None => jobs,
        })
    }

    pub async fn get_statistics(&self, clinician: &ClinicianId) -> Result<DoctorStatistics, JobError> {
        StatisticsAggregator::new(&self.store, &self.patients)
            .get_statistics(clinician)
            .await
    }

    async fn transition<F>(&self, id: JobId, apply: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut SegmentationJob) -> Result<(), JobError>,
    {
        let mut job = self.get_job(id).await?;
        let from = job.status();
        apply(&mut job)?;
        self.store.save(&job).await?;
        info!(job_id = %id, from = %from, to = %job.status(), "job transition");
        self.publish(&job);
        Ok(())
    }

    fn publish(&self, job: &SegmentationJob) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(e) = events.try_send(job.event(Utc::now())) {
            warn!(job_id = %job.id(), error = %e, "job event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::{job_config, job_result};
    use crate::{MemoryJobStore, MemoryPatientDirectory};
    use contracts::{ErrorCategory, Patient};

    fn service() -> JobService<MemoryJobStore, MemoryPatientDirectory> {
        let patients = MemoryPatientDirectory::with_patients([
            Patient::new("p1", Some("dr-a".into())),
            Patient::new("orphan", None),
        ]);
        JobService::new(MemoryJobStore::new(), patients)
    }

    async fn create(service: &JobService<MemoryJobStore, MemoryPatientDirectory>) -> JobId {
        service
            .create("p1".into(), "dr-a".into(), "s1".into(), job_config())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_rejects_orphans() {
        let service = service();
        let err = service
            .create("orphan".into(), "dr-a".into(), "s1".into(), job_config())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::OrphanJob(_)));
        assert!(service.list_jobs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_patient_and_mismatch() {
        let service = service();
        let err = service
            .create("nobody".into(), "dr-a".into(), "s1".into(), job_config())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownPatient(_)));

        let err = service
            .create("p1".into(), "dr-b".into(), "s1".into(), job_config())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ClinicianMismatch { .. }));
        assert!(service.list_jobs(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_result_lifecycle() {
        let service = service();
        let id = create(&service).await;
        assert_eq!(service.get_status(id).await.unwrap(), JobStatus::Pending);
        assert!(matches!(
            service.get_result(id).await.unwrap_err(),
            JobError::NotReady {
                status: JobStatus::Pending,
                ..
            }
        ));

        service.begin(id).await.unwrap();
        let err = service.validate(id, &"dr-a".into()).await.unwrap_err();
        assert!(matches!(err, JobError::WrongState { .. }));

        service.complete(id, job_result(3.5)).await.unwrap();
        assert_eq!(
            service.get_result(id).await.unwrap().metrics.total_volume_cm3,
            3.5
        );

        let err = service.validate(id, &"dr-b".into()).await.unwrap_err();
        assert!(matches!(err, JobError::NotOwner { .. }));

        service.validate(id, &"dr-a".into()).await.unwrap();
        assert_eq!(service.get_status(id).await.unwrap(), JobStatus::Validated);
        assert!(service.get_result(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_job_has_no_result() {
        let service = service();
        let id = create(&service).await;
        service.begin(id).await.unwrap();
        service
            .fail(id, JobFailure::new(ErrorCategory::Inference, "backend down"))
            .await
            .unwrap();
        let job = service.get_job(id).await.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure().unwrap().category, ErrorCategory::Inference);
        assert!(service.get_result(id).await.is_err());
        assert_eq!(
            service
                .list_jobs(Some(JobStatus::Failed))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let service = service();
        let id = JobId::new();
        assert!(matches!(
            service.get_status(id).await.unwrap_err(),
            JobError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_events_follow_transitions() {
        let (tx, mut rx) = mpsc::channel(16);
        let service = service().with_events(tx);
        let id = create(&service).await;
        service.begin(id).await.unwrap();
        service.complete(id, job_result(1.0)).await.unwrap();

        let statuses: Vec<JobStatus> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|e| e.unwrap().status)
            .collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Pending, JobStatus::Processing, JobStatus::Completed]
        );
    }
}
