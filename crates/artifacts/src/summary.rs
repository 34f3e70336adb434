//! Human-readable job summary (`summary.txt`)

use std::fmt::Write;

use crate::JobArtifacts;

pub fn render_summary(artifacts: &JobArtifacts<'_>) -> String {
    let metrics = artifacts.metrics;
    let [nx, ny, nz] = metrics.shape;
    let mut out = String::new();

    // writing to a String cannot fail
    let _ = writeln!(out, "Tumor segmentation report");
    let _ = writeln!(out, "=========================");
    let _ = writeln!(out, "Job:        {}", artifacts.job_id);
    let _ = writeln!(out, "Patient:    {}", artifacts.patient_id);
    let _ = writeln!(out, "Series:     {}", artifacts.series_id);
    let _ = writeln!(out, "Clinician:  {}", artifacts.clinician_id);
    let _ = writeln!(out, "Method:     {} ({})", metrics.method, metrics.classifier);
    let _ = writeln!(out, "Processed:  {}", metrics.processed_at.to_rfc3339());
    let _ = writeln!(out, "Grid:       {nx} x {ny} x {nz} voxels, spacing {}", metrics.spacing);
    let _ = writeln!(out);

    if metrics.segments.is_empty() {
        let _ = writeln!(out, "No tumor tissue detected.");
        return out;
    }

    let _ = writeln!(out, "{:<20} {:>10} {:>12} {:>11}", "Class", "Voxels", "Volume cm3", "Components");
    for segment in &metrics.segments {
        let _ = writeln!(
            out,
            "{:<20} {:>10} {:>12.3} {:>11}",
            segment.name, segment.voxel_count, segment.volume_cm3, segment.component_count
        );
    }
    let _ = writeln!(out);
    for region in &metrics.regions {
        let _ = writeln!(out, "{:<20} {:>10} {:>12.3}", region.name, region.voxel_count, region.volume_cm3);
    }
    let _ = writeln!(out, "{:<20} {:>10} {:>12.3}", "total", "", metrics.total_volume_cm3);
    out
}
