//! Volumetrics - voxel counts to physical volumes

use chrono::Utc;
use contracts::{
    Connectivity, InvariantViolation, LabelVolume, RegionVolume, SegmentationMetrics, SubRegion,
    TissueClass, TumorSegment,
};
use tracing::{info, instrument};

use crate::argmax::check_labels;
use crate::components::{label_components, summarize};

const MM3_PER_CM3: f64 = 1000.0;

/// Converts a label volume into a metrics document
#[derive(Debug, Clone)]
pub struct Volumetrics {
    method: String,
    connectivity: Connectivity,
}

impl Volumetrics {
    pub fn new(method: impl Into<String>, connectivity: Connectivity) -> Self {
        Self {
            method: method.into(),
            connectivity,
        }
    }

    /// Measure every present class.
    ///
    /// Absent classes are omitted, never reported as zero. `classifier` and
    /// `inference_units` are copied into the document as processing metadata.
    #[instrument(name = "volumetrics", skip(self, labels), fields(shape = ?labels.shape()))]
    pub fn measure(
        &self,
        labels: &LabelVolume,
        classifier: &str,
        inference_units: usize,
    ) -> Result<SegmentationMetrics, InvariantViolation> {
        check_labels(labels)?;

        let histogram = labels.histogram();
        let voxel_volume_mm3 = labels.spacing.voxel_volume_mm3();
        let to_cm3 = |voxels: u64| voxels as f64 * voxel_volume_mm3 / MM3_PER_CM3;

        let (components, _) = label_components(&labels.labels, self.connectivity);
        let component_summary = summarize(&components);

        let segments: Vec<TumorSegment> = TissueClass::foreground()
            .filter_map(|class| {
                let voxel_count = histogram[class.id() as usize];
                if voxel_count == 0 {
                    return None;
                }
                let summary = component_summary[class.id() as usize];
                Some(TumorSegment {
                    class,
                    class_id: class.id(),
                    name: class.display_name().to_string(),
                    voxel_count,
                    volume_cm3: to_cm3(voxel_count),
                    component_count: summary.count,
                    largest_component_voxels: summary.largest_voxels,
                })
            })
            .collect();

        let regions: Vec<RegionVolume> = SubRegion::ALL
            .into_iter()
            .filter_map(|region| {
                let voxel_count: u64 = region
                    .members()
                    .iter()
                    .map(|class| histogram[class.id() as usize])
                    .sum();
                (voxel_count > 0).then(|| RegionVolume {
                    region,
                    name: region.display_name().to_string(),
                    voxel_count,
                    volume_cm3: to_cm3(voxel_count),
                })
            })
            .collect();

        let total_voxels: u64 = segments.iter().map(|s| s.voxel_count).sum();
        let total_volume_cm3 = to_cm3(total_voxels);

        for segment in &segments {
            metrics::histogram!("tumorseg_segment_volume_cm3", "class" => segment.class.key())
                .record(segment.volume_cm3);
        }
        info!(
            segments = segments.len(),
            total_volume_cm3,
            "volumetrics computed"
        );

        Ok(SegmentationMetrics {
            segments,
            regions,
            total_volume_cm3,
            voxel_volume_mm3,
            shape: labels.shape(),
            spacing: labels.spacing,
            method: self.method.clone(),
            classifier: classifier.to_string(),
            inference_units,
            processed_at: Utc::now(),
        })
    }
}
