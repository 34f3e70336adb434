//! StatisticsAggregator - per-clinician summaries computed on read
//!
//! Ownership goes through the patient's current assignment. A job whose own
//! clinician reference disagrees with that assignment is reported as
//! excluded instead of being counted for either clinician. A record the
//! store cannot decode has no known owner, so it is reported as excluded to
//! every clinician rather than dropped.

use std::collections::BTreeMap;

use contracts::{ClinicianId, InvariantViolation, JobError, JobId, JobStatus, TissueClass};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::store::{JobStore, PatientDirectory};

/// Volume spread of one class over the jobs where it is present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassVolumeStats {
    pub jobs: u64,
    pub mean_cm3: f64,
    pub min_cm3: f64,
    pub max_cm3: f64,
}

/// Job left out of the statistics pending reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedJob {
    /// `None` for a record whose id could not be recovered
    pub job_id: Option<JobId>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorStatistics {
    pub clinician_id: ClinicianId,
    /// Every status, zero when absent
    pub counts_by_status: BTreeMap<JobStatus, u64>,
    pub total_jobs: u64,
    /// Over completed + validated jobs
    pub per_class: BTreeMap<TissueClass, ClassVolumeStats>,
    pub mean_total_volume_cm3: Option<f64>,
    pub excluded: Vec<ExcludedJob>,
}

#[derive(Default)]
struct VolumeAccumulator {
    jobs: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl VolumeAccumulator {
    fn push(&mut self, value: f64) {
        if self.jobs == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.jobs += 1;
        self.sum += value;
    }

    fn finish(&self) -> ClassVolumeStats {
        ClassVolumeStats {
            jobs: self.jobs,
            mean_cm3: self.sum / self.jobs as f64,
            min_cm3: self.min,
            max_cm3: self.max,
        }
    }
}

/// Read-only view over a job store and patient directory
pub struct StatisticsAggregator<'a, S, P> {
    store: &'a S,
    patients: &'a P,
}

impl<'a, S, P> StatisticsAggregator<'a, S, P>
where
    S: JobStore + Sync,
    P: PatientDirectory + Sync,
{
    pub fn new(store: &'a S, patients: &'a P) -> Self {
        Self { store, patients }
    }

    #[instrument(name = "statistics", skip(self), fields(clinician = %clinician))]
    pub async fn get_statistics(
        &self,
        clinician: &ClinicianId,
    ) -> Result<DoctorStatistics, JobError> {
        let assignments: BTreeMap<_, _> = self
            .patients
            .list_patients()
            .await?
            .into_iter()
            .filter_map(|p| p.assigned_clinician.map(|c| (p.id, c)))
            .collect();

        let mut counts_by_status: BTreeMap<JobStatus, u64> =
            JobStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        let mut total_jobs = 0;
        let mut per_class: BTreeMap<TissueClass, VolumeAccumulator> = BTreeMap::new();
        let mut totals = VolumeAccumulator::default();
        let mut excluded = Vec::new();

        let listing = self.store.list().await?;
        for record in listing.unreadable {
            error!(
                record = %record.location,
                reason = %record.reason,
                "job record excluded from statistics"
            );
            metrics::counter!("tumorseg_unreadable_job_records_total").increment(1);
            excluded.push(ExcludedJob {
                job_id: record.job_id,
                reason: format!("unreadable record {}: {}", record.location, record.reason),
            });
        }

        for job in listing.jobs {
            let Some(owner) = assignments.get(job.patient_id()) else {
                continue;
            };
            if owner != clinician {
                continue;
            }
            if job.clinician_id() != owner {
                let violation = InvariantViolation::OwnershipMismatch {
                    job_id: job.id(),
                    job_clinician: job.clinician_id().clone(),
                    patient_clinician: owner.clone(),
                };
                error!(error = %violation, "job excluded from statistics");
                metrics::counter!("tumorseg_ownership_mismatch_total").increment(1);
                excluded.push(ExcludedJob {
                    job_id: Some(job.id()),
                    reason: violation.to_string(),
                });
                continue;
            }

            total_jobs += 1;
            *counts_by_status.entry(job.status()).or_insert(0) += 1;

            if let (true, Some(result)) = (job.status().has_result(), job.result()) {
                totals.push(result.metrics.total_volume_cm3);
                for segment in &result.metrics.segments {
                    per_class
                        .entry(segment.class)
                        .or_default()
                        .push(segment.volume_cm3);
                }
            }
        }

        Ok(DoctorStatistics {
            clinician_id: clinician.clone(),
            counts_by_status,
            total_jobs,
            per_class: per_class
                .iter()
                .map(|(class, acc)| (*class, acc.finish()))
                .collect(),
            mean_total_volume_cm3: (totals.jobs > 0).then(|| totals.finish().mean_cm3),
            excluded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::{job_config, job_result};
    use crate::{FileJobStore, JobService, MemoryJobStore, MemoryPatientDirectory, SegmentationJob};
    use chrono::Utc;
    use contracts::{ErrorCategory, JobFailure, JobResult, Patient, TumorSegment};

    fn result_with(class: TissueClass, volume: f64) -> JobResult {
        let mut result = job_result(volume);
        result.metrics.segments.push(TumorSegment {
            class,
            class_id: class.id(),
            name: class.display_name().into(),
            voxel_count: 1,
            volume_cm3: volume,
            component_count: 1,
            largest_component_voxels: 1,
        });
        result
    }

    async fn completed_job(
        service: &JobService<MemoryJobStore, MemoryPatientDirectory>,
        patient: &str,
        clinician: &str,
        result: JobResult,
    ) -> JobId {
        let id = service
            .create(patient.into(), clinician.into(), "s".into(), job_config())
            .await
            .unwrap();
        service.begin(id).await.unwrap();
        service.complete(id, result).await.unwrap();
        id
    }

    fn service() -> JobService<MemoryJobStore, MemoryPatientDirectory> {
        JobService::new(
            MemoryJobStore::new(),
            MemoryPatientDirectory::with_patients([
                Patient::new("p1", Some("dr-x".into())),
                Patient::new("p2", Some("dr-x".into())),
                Patient::new("p3", Some("dr-y".into())),
            ]),
        )
    }

    #[tokio::test]
    async fn test_average_over_owned_jobs() {
        let service = service();
        completed_job(&service, "p1", "dr-x", result_with(TissueClass::NecroticCore, 2.0)).await;
        completed_job(&service, "p2", "dr-x", result_with(TissueClass::NecroticCore, 4.0)).await;
        completed_job(&service, "p3", "dr-y", result_with(TissueClass::NecroticCore, 100.0)).await;

        let stats = service.get_statistics(&"dr-x".into()).await.unwrap();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.counts_by_status[&JobStatus::Completed], 2);
        assert_eq!(stats.counts_by_status[&JobStatus::Failed], 0);
        let necrotic = &stats.per_class[&TissueClass::NecroticCore];
        assert_eq!(necrotic.mean_cm3, 3.0);
        assert_eq!(necrotic.jobs, 2);
        assert_eq!(necrotic.min_cm3, 2.0);
        assert_eq!(necrotic.max_cm3, 4.0);
        assert_eq!(stats.mean_total_volume_cm3, Some(3.0));
        assert!(stats.excluded.is_empty());
    }

    #[tokio::test]
    async fn test_non_result_jobs_only_counted() {
        let service = service();
        let failed = service
            .create("p1".into(), "dr-x".into(), "s".into(), job_config())
            .await
            .unwrap();
        service.begin(failed).await.unwrap();
        service
            .fail(failed, JobFailure::new(ErrorCategory::Inference, "timeout"))
            .await
            .unwrap();
        service
            .create("p2".into(), "dr-x".into(), "s".into(), job_config())
            .await
            .unwrap();

        let stats = service.get_statistics(&"dr-x".into()).await.unwrap();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.counts_by_status[&JobStatus::Failed], 1);
        assert_eq!(stats.counts_by_status[&JobStatus::Pending], 1);
        assert!(stats.per_class.is_empty());
        assert_eq!(stats.mean_total_volume_cm3, None);
    }

    #[tokio::test]
    async fn test_reassigned_patient_excludes_job() {
        let service = service();
        let id = completed_job(&service, "p1", "dr-x", result_with(TissueClass::EnhancingTissue, 1.0)).await;

        // p1 moves to dr-y after the job was created
        service
            .patients()
            .upsert_patient(Patient::new("p1", Some("dr-y".into())))
            .await
            .unwrap();

        let y = service.get_statistics(&"dr-y".into()).await.unwrap();
        assert_eq!(y.total_jobs, 0);
        assert_eq!(y.excluded.len(), 1);
        assert_eq!(y.excluded[0].job_id, Some(id));

        let x = service.get_statistics(&"dr-x".into()).await.unwrap();
        assert_eq!(x.total_jobs, 0);
        assert!(x.excluded.is_empty());
    }

    #[tokio::test]
    async fn test_validated_jobs_count_toward_averages() {
        let service = service();
        let id = completed_job(&service, "p1", "dr-x", result_with(TissueClass::PeritumoralEdema, 6.0)).await;
        service.validate(id, &"dr-x".into()).await.unwrap();

        let stats = service.get_statistics(&"dr-x".into()).await.unwrap();
        assert_eq!(stats.counts_by_status[&JobStatus::Validated], 1);
        assert_eq!(stats.per_class[&TissueClass::PeritumoralEdema].mean_cm3, 6.0);

        let job: SegmentationJob = service.get_job(id).await.unwrap();
        assert!(job.validated_at().unwrap() <= Utc::now());
    }

    #[tokio::test]
    async fn test_unreadable_record_reported_as_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let service = JobService::new(
            FileJobStore::new(dir.path()),
            MemoryPatientDirectory::with_patients([Patient::new("p1", Some("dr-x".into()))]),
        );
        let mut ids = Vec::new();
        for volume in [2.0, 4.0] {
            let id = service
                .create("p1".into(), "dr-x".into(), "s".into(), job_config())
                .await
                .unwrap();
            service.begin(id).await.unwrap();
            service
                .complete(id, result_with(TissueClass::NecroticCore, volume))
                .await
                .unwrap();
            ids.push(id);
        }

        // truncate the second record on disk
        let path = dir.path().join("jobs").join(format!("{}.json", ids[1]));
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 3]).unwrap();

        let stats = service.get_statistics(&"dr-x".into()).await.unwrap();
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.counts_by_status[&JobStatus::Completed], 1);
        assert_eq!(stats.per_class[&TissueClass::NecroticCore].mean_cm3, 2.0);
        assert_eq!(stats.excluded.len(), 1);
        assert_eq!(stats.excluded[0].job_id, Some(ids[1]));
        assert!(stats.excluded[0].reason.contains("unreadable record"));
    }
}
