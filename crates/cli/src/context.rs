//! Shared helpers for commands that read configuration and job records.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use contracts::{JobId, JobStatus, PipelineBlueprint};
use jobs::{FileJobStore, FilePatientDirectory, JobService};

use crate::error::CliError;

pub type RecordService = JobService<FileJobStore, FilePatientDirectory>;

/// Load and validate a configuration file
pub fn load_blueprint(path: &Path) -> Result<PipelineBlueprint> {
    if !path.exists() {
        return Err(CliError::not_found(path).into());
    }
    config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Job record directory from the override or the configuration
pub fn record_dir(config: &Path, store_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = store_dir {
        return Ok(dir.to_path_buf());
    }
    let blueprint = load_blueprint(config)?;
    blueprint
        .jobs
        .store_dir
        .ok_or_else(|| CliError::StoreNotConfigured.into())
}

/// Job service over the file-backed record store
pub fn record_service(dir: &Path) -> RecordService {
    JobService::new(FileJobStore::new(dir), FilePatientDirectory::new(dir))
}

pub fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.trim()
        .parse()
        .map_err(|e| CliError::invalid_argument("job_id", format!("{e}")).into())
}

pub fn parse_status(raw: &str) -> Result<JobStatus> {
    let wanted = raw.trim().to_ascii_lowercase();
    JobStatus::ALL
        .into_iter()
        .find(|s| s.as_str() == wanted)
        .ok_or_else(|| {
            CliError::invalid_argument(
                "status",
                format!("expected one of pending, processing, completed, failed, validated; got '{raw}'"),
            )
            .into()
        })
}
