//! Batch manifest: the patients to register and the jobs to run.
//!
//! ```toml
//! [[patients]]
//! id = "p-001"
//! clinician = "dr-adams"
//!
//! [[jobs]]
//! patient = "p-001"
//! clinician = "dr-adams"
//! series = "baseline"
//!
//! # optional; otherwise every configured modality is read from the volume store
//! [jobs.volumes]
//! t1 = "scans/p-001/t1.nii.gz"
//! ```
//!
//! Relative volume paths are resolved against the manifest's directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use contracts::{ClinicianId, Modality, Patient, PatientId, SeriesId, VolumeKey, VolumeRef};
use pipeline::SegmentationRequest;
use serde::Deserialize;

use crate::error::CliError;

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub patients: Vec<PatientEntry>,
    #[serde(default)]
    pub jobs: Vec<JobEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatientEntry {
    pub id: PatientId,
    /// Missing means unassigned; jobs for the patient will be refused
    #[serde(default)]
    pub clinician: Option<ClinicianId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobEntry {
    pub patient: PatientId,
    pub clinician: ClinicianId,
    pub series: SeriesId,
    #[serde(default)]
    pub volumes: BTreeMap<Modality, PathBuf>,
}

impl Manifest {
    /// Parse a `.toml` or `.json` manifest
    pub fn load(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Err(CliError::not_found(path));
        }
        let content =
            fs::read_to_string(path).map_err(|e| CliError::manifest_parse(path, e.to_string()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let mut manifest: Manifest = if is_json {
            serde_json::from_str(&content).map_err(|e| CliError::manifest_parse(path, e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| CliError::manifest_parse(path, e.to_string()))?
        };

        if let Some(base) = path.parent() {
            manifest.resolve_paths(base);
        }
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for job in &mut self.jobs {
            for path in job.volumes.values_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }

    pub fn patients(&self) -> impl Iterator<Item = Patient> + '_ {
        self.patients
            .iter()
            .map(|p| Patient::new(p.id.clone(), p.clinician.clone()))
    }

    /// Loader requests in manifest order.
    ///
    /// Jobs without explicit volumes read each of `modalities` from the store.
    pub fn requests(&self, modalities: &[Modality]) -> Vec<SegmentationRequest> {
        self.jobs
            .iter()
            .map(|job| {
                let inputs = if job.volumes.is_empty() {
                    modalities
                        .iter()
                        .map(|modality| {
                            let key = VolumeKey {
                                patient_id: job.patient.clone(),
                                series_id: job.series.clone(),
                                modality: modality.clone(),
                            };
                            (modality.clone(), VolumeRef::Key(key))
                        })
                        .collect()
                } else {
                    job.volumes
                        .iter()
                        .map(|(modality, path)| (modality.clone(), VolumeRef::Path(path.clone())))
                        .collect()
                };
                SegmentationRequest {
                    patient_id: job.patient.clone(),
                    clinician_id: job.clinician.clone(),
                    series_id: job.series.clone(),
                    inputs,
                }
            })
            .collect()
    }

    /// Structural checks that do not need the volumes
    pub fn check(&self) -> Result<(), CliError> {
        if self.jobs.is_empty() {
            return Err(CliError::manifest_invalid("no jobs listed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_manifest_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.toml");
        fs::write(
            &path,
            r#"
            [[patients]]
            id = "p1"
            clinician = "dr-x"

            [[patients]]
            id = "p2"

            [[jobs]]
            patient = "p1"
            clinician = "dr-x"
            series = "s1"

            [[jobs]]
            patient = "p1"
            clinician = "dr-x"
            series = "s2"
            [jobs.volumes]
            T1 = "scans/t1.nii"
            "#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        let patients: Vec<Patient> = manifest.patients().collect();
        assert_eq!(patients.len(), 2);
        assert!(patients[1].assigned_clinician.is_none());

        let requests = manifest.requests(&["t1".into(), "flair".into()]);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].inputs.len(), 2);
        assert!(matches!(requests[0].inputs[0].1, VolumeRef::Key(_)));
        assert_eq!(requests[1].inputs.len(), 1);
        assert_eq!(requests[1].inputs[0].0, "t1");
        assert_eq!(
            requests[1].inputs[0].1,
            VolumeRef::Path(dir.path().join("scans/t1.nii"))
        );
    }

    #[test]
    fn test_missing_manifest() {
        let err = Manifest::load(Path::new("/nonexistent/batch.toml")).unwrap_err();
        assert!(matches!(err, CliError::NotFound { .. }));
    }
}
