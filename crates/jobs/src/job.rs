//! SegmentationJob - lifecycle state machine
//!
//! ```text
//! pending → processing → completed → validated
//!                      ↘ failed
//! ```
//!
//! State is private; the only way to move a job is through the transition
//! methods, which reject anything not on the diagram.

use chrono::{DateTime, Utc};
use contracts::{
    ClinicianId, JobConfig, JobError, JobEvent, JobFailure, JobId, JobResult, JobStatus,
    PatientId, SeriesId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationJob {
    id: JobId,
    patient_id: PatientId,
    clinician_id: ClinicianId,
    series_id: SeriesId,
    config: JobConfig,
    status: JobStatus,
    created_at: DateTime<Utc>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    result: Option<JobResult>,
    #[serde(default)]
    failure: Option<JobFailure>,
}

impl SegmentationJob {
    /// New `pending` job. Ownership checks happen in `JobService::create`.
    pub fn new(
        patient_id: PatientId,
        clinician_id: ClinicianId,
        series_id: SeriesId,
        config: JobConfig,
    ) -> Self {
        Self {
            id: JobId::new(),
            patient_id,
            clinician_id,
            series_id,
            config,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            validated_at: None,
            result: None,
            failure: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    pub fn clinician_id(&self) -> &ClinicianId {
        &self.clinician_id
    }

    pub fn series_id(&self) -> &SeriesId {
        &self.series_id
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validated_at
    }

    /// Metrics and artifacts, present once completed
    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    fn require(&self, from: JobStatus, to: JobStatus) -> Result<(), JobError> {
        if self.status == from {
            Ok(())
        } else {
            Err(JobError::WrongState {
                job_id: self.id,
                from: self.status,
                to,
            })
        }
    }

    /// `pending → processing`
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), JobError> {
        self.require(JobStatus::Pending, JobStatus::Processing)?;
        self.status = JobStatus::Processing;
        self.started_at = Some(at);
        Ok(())
    }

    /// `processing → completed`
    pub fn complete(&mut self, result: JobResult, at: DateTime<Utc>) -> Result<(), JobError> {
        self.require(JobStatus::Processing, JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.finished_at = Some(at);
        Ok(())
    }

    /// `processing → failed`; no metrics are ever attached
    pub fn fail(&mut self, failure: JobFailure, at: DateTime<Utc>) -> Result<(), JobError> {
        self.require(JobStatus::Processing, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.failure = Some(failure);
        self.finished_at = Some(at);
        Ok(())
    }

    /// `completed → validated`, only by the assigned clinician
    pub fn validate(&mut self, clinician: &ClinicianId, at: DateTime<Utc>) -> Result<(), JobError> {
        if clinician != &self.clinician_id {
            return Err(JobError::NotOwner {
                job_id: self.id,
                clinician_id: clinician.clone(),
            });
        }
        self.require(JobStatus::Completed, JobStatus::Validated)?;
        self.status = JobStatus::Validated;
        self.validated_at = Some(at);
        Ok(())
    }

    /// Lifecycle event describing the current state
    pub fn event(&self, at: DateTime<Utc>) -> JobEvent {
        let detail = match self.status {
            JobStatus::Failed => self
                .failure
                .as_ref()
                .map(|f| format!("{}: {}", f.category, f.message)),
            JobStatus::Completed => self
                .result
                .as_ref()
                .map(|r| format!("total {:.3} cm3", r.metrics.total_volume_cm3)),
            _ => None,
        };
        JobEvent {
            job_id: self.id,
            patient_id: self.patient_id.clone(),
            clinician_id: self.clinician_id.clone(),
            status: self.status,
            at,
            detail,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{
        ArtifactRef, CombinationRule, Connectivity, ErrorCategory, SegmentationMetrics, Spacing,
        WindowSpec,
    };

    pub(crate) fn job_config() -> JobConfig {
        JobConfig {
            modalities: vec!["t1".into(), "flair".into()],
            window: WindowSpec::WholeVolume,
            combination: CombinationRule::Average,
            min_component_voxels: 0,
            connectivity: Connectivity::Face,
            classifier: "threshold".into(),
        }
    }

    pub(crate) fn job_result(total: f64) -> JobResult {
        JobResult {
            metrics: SegmentationMetrics {
                segments: Vec::new(),
                regions: Vec::new(),
                total_volume_cm3: total,
                voxel_volume_mm3: 1.0,
                shape: [4, 4, 4],
                spacing: Spacing::UNIT,
                method: "test".into(),
                classifier: "stub".into(),
                inference_units: 1,
                processed_at: Utc::now(),
            },
            artifacts: ArtifactRef {
                folder: "out/job".into(),
                mask: "out/job/segmentation.nii.gz".into(),
                metrics: "out/job/metrics.json".into(),
                summary: None,
            },
        }
    }

    fn job() -> SegmentationJob {
        SegmentationJob::new("p1".into(), "dr-a".into(), "s1".into(), job_config())
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        assert_eq!(job.status(), JobStatus::Pending);
        job.start(Utc::now()).unwrap();
        assert!(job.started_at().is_some());
        job.complete(job_result(1.0), Utc::now()).unwrap();
        assert!(job.result().is_some());
        job.validate(&"dr-a".into(), Utc::now()).unwrap();
        assert_eq!(job.status(), JobStatus::Validated);
        assert!(job.validated_at().is_some());
    }

    #[test]
    fn test_validate_while_processing() {
        let mut job = job();
        job.start(Utc::now()).unwrap();
        let err = job.validate(&"dr-a".into(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            JobError::WrongState {
                from: JobStatus::Processing,
                to: JobStatus::Validated,
                ..
            }
        ));
    }

    #[test]
    fn test_validate_by_other_clinician() {
        let mut job = job();
        job.start(Utc::now()).unwrap();
        job.complete(job_result(1.0), Utc::now()).unwrap();
        let err = job.validate(&"dr-b".into(), Utc::now()).unwrap_err();
        assert!(matches!(err, JobError::NotOwner { .. }));
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn test_no_shortcuts() {
        let mut job = job();
        assert!(job.complete(job_result(1.0), Utc::now()).is_err());
        assert!(job.validate(&"dr-a".into(), Utc::now()).is_err());

        job.start(Utc::now()).unwrap();
        assert!(job.start(Utc::now()).is_err());
        job.fail(
            JobFailure::new(ErrorCategory::Inference, "timeout"),
            Utc::now(),
        )
        .unwrap();
        assert!(job.result().is_none());
        assert!(job.validate(&"dr-a".into(), Utc::now()).is_err());
        assert!(job.complete(job_result(1.0), Utc::now()).is_err());

        let event = job.event(Utc::now());
        assert_eq!(event.status, JobStatus::Failed);
        assert_eq!(event.detail.as_deref(), Some("inference: timeout"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut job = job();
        job.start(Utc::now()).unwrap();
        let json = serde_json::to_string(&job).unwrap();
        let back: SegmentationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
