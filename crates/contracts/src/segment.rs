//! Volumetrics output - the metrics payload attached to a completed job

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Spacing, SubRegion, TissueClass};

/// One present tissue class and its measured size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TumorSegment {
    pub class: TissueClass,
    pub class_id: u8,
    pub name: String,
    pub voxel_count: u64,
    /// Physical volume in cm³
    pub volume_cm3: f64,
    /// Connected components of this class after cleanup
    pub component_count: usize,
    /// Size of the biggest component in voxels
    pub largest_component_voxels: u64,
}

/// Composite region volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionVolume {
    pub region: SubRegion,
    pub name: String,
    pub voxel_count: u64,
    pub volume_cm3: f64,
}

/// Full metrics document for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMetrics {
    /// Present classes in taxonomy order
    pub segments: Vec<TumorSegment>,
    /// Composite regions with at least one voxel
    pub regions: Vec<RegionVolume>,
    /// Sum over all non-background classes, cm³
    pub total_volume_cm3: f64,
    pub voxel_volume_mm3: f64,
    pub shape: [usize; 3],
    pub spacing: Spacing,
    /// Processing method label
    pub method: String,
    /// Classifier name as reported by the backend
    pub classifier: String,
    /// Number of classifier invocations that made up the prediction
    pub inference_units: usize,
    pub processed_at: DateTime<Utc>,
}

impl SegmentationMetrics {
    /// Segment for a class, if present
    pub fn segment(&self, class: TissueClass) -> Option<&TumorSegment> {
        self.segments.iter().find(|s| s.class == class)
    }

    /// Region volume, if any voxel belongs to it
    pub fn region(&self, region: SubRegion) -> Option<&RegionVolume> {
        self.regions.iter().find(|r| r.region == region)
    }
}
