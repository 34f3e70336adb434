//! # Artifacts
//!
//! Persisted outputs of a completed job, grouped under one folder per job:
//!
//! ```text
//! <output_dir>/<job_id>/
//!     segmentation.nii.gz
//!     metrics.json
//!     summary.txt
//! ```

mod fs;
mod summary;

pub use fs::FsArtifactStore;
pub use summary::render_summary;

use contracts::{
    ArtifactRef, ClinicianId, ContractError, JobId, LabelVolume, PatientId, SegmentationMetrics,
    SeriesId,
};
use serde::{Deserialize, Serialize};

/// Everything written for one job
#[derive(Debug, Clone, Copy)]
pub struct JobArtifacts<'a> {
    pub job_id: JobId,
    pub patient_id: &'a PatientId,
    pub clinician_id: &'a ClinicianId,
    pub series_id: &'a SeriesId,
    pub labels: &'a LabelVolume,
    pub metrics: &'a SegmentationMetrics,
}

/// Contents of `metrics.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsDocument {
    pub job_id: JobId,
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    pub series_id: SeriesId,
    #[serde(flatten)]
    pub metrics: SegmentationMetrics,
}

/// Artifact persistence backend
#[trait_variant::make(ArtifactStore: Send)]
pub trait LocalArtifactStore {
    /// Write all artifacts for a job; either all appear or none do
    async fn persist(&self, artifacts: JobArtifacts<'_>) -> Result<ArtifactRef, ContractError>;

    /// Remove whatever a job has written, published or still staged.
    /// A job with nothing on disk is not an error.
    async fn discard(&self, job_id: JobId) -> Result<(), ContractError>;
}
