//! JSON-file stores
//!
//! Layout under the store directory:
//!
//! ```text
//! jobs/<job_id>.json
//! patients.json
//! ```
//!
//! Every write goes to a temporary sibling first and is renamed into place,
//! so readers never observe a half-written record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use contracts::{JobError, JobId, Patient, PatientId};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::store::{JobListing, JobStore, PatientDirectory, UnreadableRecord};
use crate::SegmentationJob;

fn store_error(context: &str, path: &Path, err: impl std::fmt::Display) -> JobError {
    JobError::Store(format!("{context} {}: {err}", path.display()))
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), JobError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| store_error("encode", path, e))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| store_error("create", parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| store_error("write", &tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| store_error("rename", path, e))
}

#[derive(Debug)]
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            dir: root.into().join("jobs"),
        }
    }

    fn path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read(path: &Path) -> Result<SegmentationJob, JobError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| store_error("read", path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| store_error("decode", path, e))
    }
}

impl JobStore for FileJobStore {
    async fn save(&self, job: &SegmentationJob) -> Result<(), JobError> {
        write_atomic(&self.path(job.id()), job).await
    }

    async fn load(&self, id: JobId) -> Result<Option<SegmentationJob>, JobError> {
        let path = self.path(id);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Self::read(&path).await.map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(store_error("stat", &path, e)),
        }
    }

    async fn list(&self) -> Result<JobListing, JobError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(JobListing::default()),
            Err(e) => return Err(store_error("list", &self.dir, e)),
        };

        let mut jobs = Vec::new();
        let mut unreadable = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| store_error("list", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path).await {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    warn!(error = %e, "unreadable job record");
                    unreadable.push(UnreadableRecord {
                        job_id: path
                            .file_stem()
                            .and_then(|stem| stem.to_str())
                            .and_then(|stem| stem.parse().ok()),
                        location: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        jobs.sort_by_key(|job| (job.created_at(), job.id()));
        Ok(JobListing { jobs, unreadable })
    }
}

/// Patients kept in a single `patients.json`
#[derive(Debug)]
pub struct FilePatientDirectory {
    path: PathBuf,
    // serializes read-modify-write of the shared file
    lock: Mutex<()>,
}

impl FilePatientDirectory {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join("patients.json"),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<PatientId, Patient>, JobError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(store_error("read", &self.path, e)),
        };
        let patients: Vec<Patient> =
            serde_json::from_slice(&bytes).map_err(|e| store_error("decode", &self.path, e))?;
        Ok(patients.into_iter().map(|p| (p.id.clone(), p)).collect())
    }
}

impl PatientDirectory for FilePatientDirectory {
    async fn get_patient(&self, id: &PatientId) -> Result<Option<Patient>, JobError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(id))
    }

    async fn upsert_patient(&self, patient: Patient) -> Result<(), JobError> {
        let _guard = self.lock.lock().await;
        let mut patients = self.read_all().await?;
        patients.insert(patient.id.clone(), patient);
        let list: Vec<&Patient> = patients.values().collect();
        write_atomic(&self.path, &list).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, JobError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::job_config;
    use chrono::Utc;

    #[tokio::test]
    async fn test_job_records_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        assert!(store.list().await.unwrap().jobs.is_empty());

        let mut job = SegmentationJob::new("p1".into(), "dr-a".into(), "s1".into(), job_config());
        store.save(&job).await.unwrap();
        job.start(Utc::now()).unwrap();
        store.save(&job).await.unwrap();

        // a fresh handle sees the latest state
        let reopened = FileJobStore::new(dir.path());
        let loaded = reopened.load(job.id()).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(reopened.list().await.unwrap().jobs.len(), 1);
        assert!(reopened.load(JobId::new()).await.unwrap().is_none());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("jobs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_record_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        let kept = SegmentationJob::new("p1".into(), "dr-a".into(), "s1".into(), job_config());
        let broken = SegmentationJob::new("p1".into(), "dr-a".into(), "s2".into(), job_config());
        store.save(&kept).await.unwrap();
        store.save(&broken).await.unwrap();

        let path = dir.path().join("jobs").join(format!("{}.json", broken.id()));
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let listing = store.list().await.unwrap();
        assert_eq!(listing.jobs.len(), 1);
        assert_eq!(listing.jobs[0].id(), kept.id());
        assert_eq!(listing.unreadable.len(), 1);
        assert_eq!(listing.unreadable[0].job_id, Some(broken.id()));
        assert!(listing.unreadable[0].reason.contains("decode"));
    }

    #[tokio::test]
    async fn test_patients_persist() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FilePatientDirectory::new(dir.path());
        directory
            .upsert_patient(Patient::new("p1", Some("dr-a".into())))
            .await
            .unwrap();
        directory
            .upsert_patient(Patient::new("p2", None))
            .await
            .unwrap();
        directory
            .upsert_patient(Patient::new("p1", Some("dr-b".into())))
            .await
            .unwrap();

        let reopened = FilePatientDirectory::new(dir.path());
        let p1 = reopened.get_patient(&"p1".into()).await.unwrap().unwrap();
        assert_eq!(p1.assigned_clinician, Some("dr-b".into()));
        assert_eq!(reopened.list_patients().await.unwrap().len(), 2);
    }
}
