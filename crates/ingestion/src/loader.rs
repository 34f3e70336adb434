//! VolumeLoader - reads the co-registered series of one job

use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{ImagingVolume, InputError, Modality, VolumeRef, VolumeStore};
use tracing::{debug, instrument, warn};

use crate::nifti;

/// Reads one volume per modality and checks co-registration
pub struct VolumeLoader {
    store: Option<Arc<dyn VolumeStore>>,
    spacing_tolerance_mm: f64,
}

impl VolumeLoader {
    /// Loader able to resolve `VolumeRef::Key` through `store`
    pub fn new(store: Arc<dyn VolumeStore>, spacing_tolerance_mm: f64) -> Self {
        Self {
            store: Some(store),
            spacing_tolerance_mm,
        }
    }

    /// Loader for explicit file paths only
    pub fn paths_only(spacing_tolerance_mm: f64) -> Self {
        Self {
            store: None,
            spacing_tolerance_mm,
        }
    }

    /// Load every `(modality, reference)` pair
    ///
    /// The first pair is the geometric reference; every other volume must
    /// match its shape exactly and its spacing within the tolerance.
    ///
    /// # Errors
    /// - `NoVolumes` for an empty input set
    /// - `UnreadableVolume` when a reference cannot be read or decoded
    /// - `MisalignedVolumes` on a shape or spacing disagreement
    #[instrument(name = "volume_load", skip(self, inputs), fields(volumes = inputs.len()))]
    pub fn load(
        &self,
        inputs: &[(Modality, VolumeRef)],
    ) -> Result<BTreeMap<Modality, ImagingVolume>, InputError> {
        if inputs.is_empty() {
            return Err(InputError::NoVolumes);
        }

        let mut volumes = BTreeMap::new();
        let mut reference: Option<([usize; 3], contracts::Spacing)> = None;

        for (modality, location) in inputs {
            if volumes.contains_key(modality) {
                return Err(InputError::unreadable(
                    modality.clone(),
                    location.to_string(),
                    "modality listed more than once",
                ));
            }

            let volume = self.read_one(modality, location)?;
            let shape = volume.shape();

            if !volume.spacing.is_physical() {
                return Err(InputError::unreadable(
                    modality.clone(),
                    location.to_string(),
                    format!("non-physical spacing {}", volume.spacing),
                ));
            }

            match reference {
                None => reference = Some((shape, volume.spacing)),
                Some((expected_shape, expected_spacing)) => {
                    if shape != expected_shape
                        || !volume
                            .spacing
                            .approx_eq(&expected_spacing, self.spacing_tolerance_mm)
                    {
                        warn!(modality = %modality, ?shape, spacing = %volume.spacing, "misaligned volume");
                        metrics::counter!("tumorseg_input_rejected_total", "reason" => "misaligned")
                            .increment(1);
                        return Err(InputError::MisalignedVolumes {
                            modality: modality.clone(),
                            shape,
                            spacing: volume.spacing,
                            expected_shape,
                            expected_spacing,
                        });
                    }
                }
            }

            debug!(modality = %modality, ?shape, spacing = %volume.spacing, "volume loaded");
            volumes.insert(modality.clone(), volume);
        }

        metrics::counter!("tumorseg_volumes_loaded_total").increment(volumes.len() as u64);
        Ok(volumes)
    }

    fn read_one(
        &self,
        modality: &Modality,
        location: &VolumeRef,
    ) -> Result<ImagingVolume, InputError> {
        let result = match location {
            VolumeRef::Path(path) => nifti::read_volume(path, modality.clone()).map_err(|e| {
                InputError::unreadable(modality.clone(), path.display().to_string(), e.to_string())
            }),
            VolumeRef::Key(key) => match &self.store {
                Some(store) => {
                    let mut volume = store.read(key)?;
                    volume.modality = modality.clone();
                    Ok(volume)
                }
                None => Err(InputError::unreadable(
                    modality.clone(),
                    location.to_string(),
                    "no volume store configured",
                )),
            },
        };
        if result.is_err() {
            metrics::counter!("tumorseg_input_rejected_total", "reason" => "unreadable")
                .increment(1);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FsVolumeStore;
    use contracts::{Spacing, VolumeKey};
    use ndarray::Array3;
    use std::path::PathBuf;

    fn write(dir: &std::path::Path, name: &str, shape: (usize, usize, usize), spacing: Spacing) -> PathBuf {
        let path = dir.join(format!("{name}.nii"));
        let volume = ImagingVolume::new(name, Array3::from_elem(shape, 1.0), spacing);
        nifti::write_volume(&path, &volume).unwrap();
        path
    }

    #[test]
    fn test_load_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = write(dir.path(), "t1", (4, 4, 4), Spacing::UNIT);
        let t2 = write(dir.path(), "t2", (4, 4, 4), Spacing::new(1.0, 1.0, 1.0005));

        let loader = VolumeLoader::paths_only(1e-3);
        let volumes = loader
            .load(&[
                ("t2".into(), VolumeRef::Path(t2)),
                ("t1".into(), VolumeRef::Path(t1)),
            ])
            .unwrap();
        assert_eq!(volumes.len(), 2);
        assert!(volumes.contains_key("t1"));
    }

    #[test]
    fn test_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = write(dir.path(), "t1", (4, 4, 4), Spacing::UNIT);
        let t2 = write(dir.path(), "t2", (4, 4, 5), Spacing::UNIT);

        let err = VolumeLoader::paths_only(1e-3)
            .load(&[
                ("t1".into(), VolumeRef::Path(t1)),
                ("t2".into(), VolumeRef::Path(t2)),
            ])
            .unwrap_err();
        match err {
            InputError::MisalignedVolumes {
                modality,
                shape,
                expected_shape,
                ..
            } => {
                assert_eq!(modality, "t2");
                assert_eq!(shape, [4, 4, 5]);
                assert_eq!(expected_shape, [4, 4, 4]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_spacing_beyond_tolerance() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = write(dir.path(), "t1", (4, 4, 4), Spacing::UNIT);
        let t2 = write(dir.path(), "t2", (4, 4, 4), Spacing::new(1.0, 1.2, 1.0));

        let err = VolumeLoader::paths_only(0.1)
            .load(&[
                ("t1".into(), VolumeRef::Path(t1)),
                ("t2".into(), VolumeRef::Path(t2)),
            ])
            .unwrap_err();
        assert!(matches!(err, InputError::MisalignedVolumes { .. }));
    }

    #[test]
    fn test_unreadable_and_empty() {
        let loader = VolumeLoader::paths_only(1e-3);
        assert!(matches!(loader.load(&[]), Err(InputError::NoVolumes)));

        let err = loader
            .load(&[("t1".into(), VolumeRef::Path("/nonexistent/t1.nii".into()))])
            .unwrap_err();
        assert!(matches!(err, InputError::UnreadableVolume { .. }));

        let key = VolumeKey {
            patient_id: "p".into(),
            series_id: "s".into(),
            modality: "t1".into(),
        };
        let err = loader
            .load(&[("t1".into(), VolumeRef::Key(key))])
            .unwrap_err();
        assert!(err.to_string().contains("no volume store"));
    }

    #[test]
    fn test_load_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsVolumeStore::new(dir.path());
        let key = VolumeKey {
            patient_id: "p-7".into(),
            series_id: "baseline".into(),
            modality: "t1ce".into(),
        };
        let volume = ImagingVolume::new("t1ce", Array3::from_elem((2, 2, 2), 3.0), Spacing::UNIT);
        store.write(&key, &volume).unwrap();

        let loader = VolumeLoader::new(Arc::new(store), 1e-3);
        let volumes = loader
            .load(&[("t1ce".into(), VolumeRef::Key(key))])
            .unwrap();
        assert_eq!(volumes["t1ce"].data, volume.data);
    }
}
