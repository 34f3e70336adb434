//! Synthetic phantom volumes
//!
//! Co-registered multimodal series with a nested spherical lesion, for tests
//! and demos without patient data. Fully deterministic.

use contracts::{
    ImagingVolume, LabelVolume, Modality, Orientation, PatientId, SeriesId, Spacing, TissueClass,
    VolumeKey, VolumeRef,
};
use ndarray::Array3;
use tracing::debug;

use crate::error::Result;
use crate::store::FsVolumeStore;

/// Relative intensity of each tissue class (background, edema, necrotic core, enhancing)
const TISSUE_LEVELS: [(TissueClass, f32); 4] = [
    (TissueClass::Background, 0.2),
    (TissueClass::PeritumoralEdema, 0.45),
    (TissueClass::NecroticCore, 0.7),
    (TissueClass::EnhancingTissue, 0.95),
];

/// Phantom generator configuration
#[derive(Debug, Clone)]
pub struct PhantomConfig {
    /// Volume dimensions
    pub shape: [usize; 3],

    pub spacing: Spacing,

    /// One volume per modality
    pub modalities: Vec<Modality>,

    /// Lesion centre in voxel coordinates; volume centre when `None`
    pub center: Option<[f64; 3]>,

    /// Radius of the necrotic core (mm)
    pub necrotic_radius_mm: f64,

    /// Outer radius of the enhancing rim (mm)
    pub enhancing_radius_mm: f64,

    /// Outer radius of the oedema halo (mm)
    pub edema_radius_mm: f64,

    /// Amplitude of a deterministic texture, as a fraction of the modality gain
    pub texture: f32,
}

impl Default for PhantomConfig {
    fn default() -> Self {
        Self {
            shape: [32, 32, 32],
            spacing: Spacing::UNIT,
            modalities: ["t1", "t1ce", "t2", "flair"].map(Modality::from).to_vec(),
            center: None,
            necrotic_radius_mm: 3.0,
            enhancing_radius_mm: 6.0,
            edema_radius_mm: 10.0,
            texture: 0.0,
        }
    }
}

/// Generated series plus the label volume it was drawn from
#[derive(Debug, Clone)]
pub struct Phantom {
    pub volumes: Vec<ImagingVolume>,
    pub truth: LabelVolume,
}

impl PhantomConfig {
    /// Draw the phantom
    pub fn generate(&self) -> Phantom {
        let [nx, ny, nz] = self.shape;
        let center = self.center.unwrap_or([
            (nx as f64 - 1.0) / 2.0,
            (ny as f64 - 1.0) / 2.0,
            (nz as f64 - 1.0) / 2.0,
        ]);
        let [sx, sy, sz] = self.spacing.0;

        let truth = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| {
            let dx = (x as f64 - center[0]) * sx;
            let dy = (y as f64 - center[1]) * sy;
            let dz = (z as f64 - center[2]) * sz;
            let r = (dx * dx + dy * dy + dz * dz).sqrt();
            let class = if r <= self.necrotic_radius_mm {
                TissueClass::NecroticCore
            } else if r <= self.enhancing_radius_mm {
                TissueClass::EnhancingTissue
            } else if r <= self.edema_radius_mm {
                TissueClass::PeritumoralEdema
            } else {
                TissueClass::Background
            };
            class.id()
        });

        let orientation = Orientation::from_spacing(self.spacing);
        let volumes = self
            .modalities
            .iter()
            .map(|modality| {
                let gain = modality_gain(modality);
                let data = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| {
                    let level = tissue_level(truth[[x, y, z]]);
                    let grain = ((x * 7 + y * 13 + z * 29) % 17) as f32 / 16.0 - 0.5;
                    gain * (level + self.texture * grain)
                });
                ImagingVolume {
                    modality: modality.clone(),
                    data,
                    spacing: self.spacing,
                    orientation,
                }
            })
            .collect();

        Phantom {
            volumes,
            truth: LabelVolume {
                labels: truth,
                spacing: self.spacing,
                orientation,
            },
        }
    }
}

impl Phantom {
    /// Voxel count of one class in the ground truth
    pub fn truth_voxels(&self, class: TissueClass) -> u64 {
        self.truth.histogram()[class.id() as usize]
    }

    /// Store every modality under `(patient, series)` and return loader inputs
    pub fn write_to(
        &self,
        store: &FsVolumeStore,
        patient_id: &PatientId,
        series_id: &SeriesId,
    ) -> Result<Vec<(Modality, VolumeRef)>> {
        let mut inputs = Vec::with_capacity(self.volumes.len());
        for volume in &self.volumes {
            let key = VolumeKey {
                patient_id: patient_id.clone(),
                series_id: series_id.clone(),
                modality: volume.modality.clone(),
            };
            store.write(&key, volume)?;
            inputs.push((volume.modality.clone(), VolumeRef::Key(key)));
        }
        debug!(patient = %patient_id, series = %series_id, volumes = inputs.len(), "phantom written");
        Ok(inputs)
    }
}

fn modality_gain(modality: &Modality) -> f32 {
    match modality.as_str() {
        "t1" => 500.0,
        "t1ce" => 800.0,
        "t2" => 600.0,
        "flair" => 700.0,
        _ => 1000.0,
    }
}

fn tissue_level(label: u8) -> f32 {
    TISSUE_LEVELS
        .iter()
        .find(|(class, _)| class.id() == label)
        .map(|(_, level)| *level)
        .unwrap_or(0.0)
}
