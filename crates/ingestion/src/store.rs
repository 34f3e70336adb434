//! Path-addressed volume store
//!
//! Layout: `<root>/<patient>/<series>/<modality>.nii.gz` (or `.nii`).

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{ImagingVolume, InputError, VolumeKey, VolumeStore};
use tracing::debug;

use crate::error::Result;
use crate::nifti;

/// Filesystem-backed [`VolumeStore`]
#[derive(Debug, Clone)]
pub struct FsVolumeStore {
    root: PathBuf,
}

impl FsVolumeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding every modality of one series
    pub fn series_dir(&self, key: &VolumeKey) -> PathBuf {
        self.root
            .join(key.patient_id.as_str())
            .join(key.series_id.as_str())
    }

    /// Existing file for a key, preferring the compressed form
    pub fn locate(&self, key: &VolumeKey) -> Option<PathBuf> {
        let dir = self.series_dir(key);
        ["nii.gz", "nii"]
            .iter()
            .map(|ext| dir.join(format!("{}.{ext}", key.modality)))
            .find(|path| path.is_file())
    }

    /// Store a volume under a key (gzip-compressed)
    pub fn write(&self, key: &VolumeKey, volume: &ImagingVolume) -> Result<PathBuf> {
        let dir = self.series_dir(key);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.nii.gz", key.modality));
        nifti::write_volume(&path, volume)?;
        debug!(key = %key, path = %path.display(), "volume stored");
        Ok(path)
    }
}

impl VolumeStore for FsVolumeStore {
    fn name(&self) -> &str {
        "fs"
    }

    fn read(&self, key: &VolumeKey) -> std::result::Result<ImagingVolume, InputError> {
        let path = self.locate(key).ok_or_else(|| {
            InputError::unreadable(
                key.modality.clone(),
                key.to_string(),
                format!("no volume file under {}", self.series_dir(key).display()),
            )
        })?;
        nifti::read_volume(&path, key.modality.clone()).map_err(|e| {
            InputError::unreadable(key.modality.clone(), path.display().to_string(), e.to_string())
        })
    }
}
