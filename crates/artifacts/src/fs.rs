//! Filesystem artifact store
//!
//! Artifacts are written into a hidden staging folder and renamed into
//! place as the last step, so a job folder is either complete or absent.

use std::io;
use std::path::{Path, PathBuf};

use contracts::{ArtifactConfig, ArtifactRef, ContractError, JobId, LabelVolume};
use ingestion::nifti;
use tracing::{debug, info, instrument, warn};

use crate::summary::render_summary;
use crate::{ArtifactStore, JobArtifacts, MetricsDocument};

pub const METRICS_FILE: &str = "metrics.json";
pub const SUMMARY_FILE: &str = "summary.txt";

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    config: ArtifactConfig,
}

impl FsArtifactStore {
    pub fn new(config: ArtifactConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.output_dir
    }

    fn folder(&self, job_id: JobId) -> PathBuf {
        self.config.output_dir.join(job_id.to_string())
    }

    fn staging(&self, job_id: JobId) -> PathBuf {
        self.config.output_dir.join(format!(".{}.partial", job_id))
    }

    async fn write_all(&self, staging: &Path, artifacts: &JobArtifacts<'_>) -> Result<(), ContractError> {
        let mask_name = self.config.mask_format.file_name();
        let mask_path = staging.join(mask_name);
        let labels: LabelVolume = artifacts.labels.clone();
        tokio::task::spawn_blocking(move || nifti::write_labels(&mask_path, &labels))
            .await
            .map_err(|e| ContractError::artifact(mask_name, e.to_string()))?
            .map_err(|e| ContractError::artifact(mask_name, e.to_string()))?;

        let document = MetricsDocument {
            job_id: artifacts.job_id,
            patient_id: artifacts.patient_id.clone(),
            clinician_id: artifacts.clinician_id.clone(),
            series_id: artifacts.series_id.clone(),
            metrics: artifacts.metrics.clone(),
        };
        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| ContractError::artifact(METRICS_FILE, e.to_string()))?;
        tokio::fs::write(staging.join(METRICS_FILE), json)
            .await
            .map_err(|e| ContractError::artifact(METRICS_FILE, e.to_string()))?;

        if self.config.write_summary {
            tokio::fs::write(staging.join(SUMMARY_FILE), render_summary(artifacts))
                .await
                .map_err(|e| ContractError::artifact(SUMMARY_FILE, e.to_string()))?;
        }
        Ok(())
    }

    fn artifact_ref(&self, folder: PathBuf) -> ArtifactRef {
        ArtifactRef {
            mask: folder.join(self.config.mask_format.file_name()),
            metrics: folder.join(METRICS_FILE),
            summary: self.config.write_summary.then(|| folder.join(SUMMARY_FILE)),
            folder,
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    #[instrument(name = "artifacts_persist", skip_all, fields(job_id = %artifacts.job_id))]
    async fn persist(&self, artifacts: JobArtifacts<'_>) -> Result<ArtifactRef, ContractError> {
        let folder = self.folder(artifacts.job_id);
        let staging = self.staging(artifacts.job_id);

        if tokio::fs::try_exists(&folder).await? {
            return Err(ContractError::artifact(
                folder.display().to_string(),
                "job folder already exists",
            ));
        }
        tokio::fs::create_dir_all(&staging).await?;
        debug!(staging = %staging.display(), "writing artifacts");

        if let Err(e) = self.write_all(&staging, &artifacts).await {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                warn!(error = %cleanup, "failed to remove staging folder");
            }
            return Err(e);
        }

        tokio::fs::rename(&staging, &folder).await?;
        info!(folder = %folder.display(), "artifacts written");
        Ok(self.artifact_ref(folder))
    }

    #[instrument(name = "artifacts_discard", skip(self))]
    async fn discard(&self, job_id: JobId) -> Result<(), ContractError> {
        let mut removed = false;
        for path in [self.folder(job_id), self.staging(job_id)] {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "removed");
                    removed = true;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ContractError::artifact(path.display().to_string(), e.to_string()))
                }
            }
        }
        if removed {
            warn!("artifacts discarded");
        }
        Ok(())
    }
}
