//! Volume data model - VolumeLoader / Normalizer / classifier / PostProcessor payloads
//!
//! Spatial axes are `[x, y, z]` everywhere. Channel-stacked tensors put the
//! channel (or class) axis first: `(C, X, Y, Z)`.

use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{Modality, PatientId, SeriesId};

/// Physical voxel size per axis, in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing(pub [f64; 3]);

impl Spacing {
    /// Isotropic 1mm spacing
    pub const UNIT: Spacing = Spacing([1.0, 1.0, 1.0]);

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self([x, y, z])
    }

    /// Volume of one voxel in mm³
    #[inline]
    pub fn voxel_volume_mm3(&self) -> f64 {
        self.0[0] * self.0[1] * self.0[2]
    }

    /// Component-wise comparison within an absolute tolerance
    pub fn approx_eq(&self, other: &Spacing, tolerance: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// All components finite and strictly positive
    pub fn is_physical(&self) -> bool {
        self.0.iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for Spacing {
    fn default() -> Self {
        Self::UNIT
    }
}

impl fmt::Display for Spacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})mm", self.0[0], self.0[1], self.0[2])
    }
}

/// Voxel-to-world placement carried from the input series to the mask.
///
/// Mirrors the NIfTI qform/sform fields so a written label volume overlays
/// the source images in any viewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub qform_code: i16,
    pub sform_code: i16,
    /// Quaternion b, c, d
    pub quatern: [f32; 3],
    /// Translation for the qform
    pub qoffset: [f32; 3],
    /// Handedness of the qform (`pixdim[0]`), ±1
    pub qfac: f32,
    /// Rows of the sform affine
    pub srow: [[f32; 4]; 3],
}

impl Orientation {
    /// Scanner-aligned affine scaled by the spacing
    pub fn from_spacing(spacing: Spacing) -> Self {
        let [sx, sy, sz] = spacing.0;
        Self {
            qform_code: 0,
            sform_code: 1,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            qfac: 1.0,
            srow: [
                [sx as f32, 0.0, 0.0, 0.0],
                [0.0, sy as f32, 0.0, 0.0],
                [0.0, 0.0, sz as f32, 0.0],
            ],
        }
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::from_spacing(Spacing::UNIT)
    }
}

/// One modality of one imaging series
#[derive(Debug, Clone)]
pub struct ImagingVolume {
    pub modality: Modality,
    /// Intensities indexed `[x, y, z]`
    pub data: Array3<f32>,
    pub spacing: Spacing,
    pub orientation: Orientation,
}

impl ImagingVolume {
    pub fn new(modality: impl Into<Modality>, data: Array3<f32>, spacing: Spacing) -> Self {
        Self {
            modality: modality.into(),
            data,
            spacing,
            orientation: Orientation::from_spacing(spacing),
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.data.dim();
        [x, y, z]
    }

    pub fn voxel_count(&self) -> usize {
        self.data.len()
    }
}

/// Channel-stacked model input, values inside the configured output range
#[derive(Debug, Clone)]
pub struct NormalizedTensor {
    /// Channel order (matches axis 0 of `data`)
    pub channels: Vec<Modality>,
    /// `(C, X, Y, Z)`
    pub data: Array4<f32>,
    pub spacing: Spacing,
    pub orientation: Orientation,
    /// Output range used during rescaling
    pub range: (f32, f32),
}

impl NormalizedTensor {
    pub fn num_channels(&self) -> usize {
        self.data.dim().0
    }

    pub fn spatial_shape(&self) -> [usize; 3] {
        let (_, x, y, z) = self.data.dim();
        [x, y, z]
    }
}

/// Reassembled full-volume classifier output
#[derive(Debug, Clone)]
pub struct PredictionTensor {
    /// Per-class scores `(K, X, Y, Z)`
    pub scores: Array4<f32>,
    pub spacing: Spacing,
    pub orientation: Orientation,
}

impl PredictionTensor {
    pub fn num_classes(&self) -> usize {
        self.scores.dim().0
    }

    pub fn spatial_shape(&self) -> [usize; 3] {
        let (_, x, y, z) = self.scores.dim();
        [x, y, z]
    }
}

/// Integer class id per voxel; the persisted segmentation mask
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVolume {
    /// Class ids indexed `[x, y, z]`
    pub labels: Array3<u8>,
    pub spacing: Spacing,
    pub orientation: Orientation,
}

impl LabelVolume {
    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.labels.dim();
        [x, y, z]
    }

    /// Voxel count per class id (index = id)
    pub fn histogram(&self) -> [u64; 256] {
        let mut counts = [0u64; 256];
        for &label in self.labels.iter() {
            counts[label as usize] += 1;
        }
        counts
    }
}

/// Storage key of one modality of one series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeKey {
    pub patient_id: PatientId,
    pub series_id: SeriesId,
    pub modality: Modality,
}

impl fmt::Display for VolumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.patient_id, self.series_id, self.modality)
    }
}

/// Where to read a volume from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeRef {
    /// Explicit file path
    Path(PathBuf),
    /// Key resolved by the configured `VolumeStore`
    Key(VolumeKey),
}

impl fmt::Display for VolumeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Key(key) => write!(f, "store:{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_volume() {
        let spacing = Spacing::new(0.5, 2.0, 3.0);
        assert!((spacing.voxel_volume_mm3() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_spacing_tolerance() {
        let a = Spacing::new(1.0, 1.0, 1.0);
        let b = Spacing::new(1.0005, 1.0, 0.9995);
        assert!(a.approx_eq(&b, 1e-3));
        assert!(!a.approx_eq(&b, 1e-4));
    }

    #[test]
    fn test_label_histogram() {
        let mut labels = Array3::<u8>::zeros((2, 2, 2));
        labels[[0, 0, 0]] = 3;
        labels[[1, 1, 1]] = 3;
        let volume = LabelVolume {
            labels,
            spacing: Spacing::UNIT,
            orientation: Orientation::default(),
        };
        let hist = volume.histogram();
        assert_eq!(hist[0], 6);
        assert_eq!(hist[3], 2);
    }

    #[test]
    fn test_volume_ref_serde() {
        let r = VolumeRef::Path("scans/t1.nii.gz".into());
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"path":"scans/t1.nii.gz"}"#);
    }
}
