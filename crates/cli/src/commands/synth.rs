//! `synth` command implementation.

use anyhow::{Context, Result};
use contracts::{Modality, PatientId, SeriesId, Spacing, TissueClass, VolumeKey};
use ingestion::{nifti, FsVolumeStore, PhantomConfig};
use tracing::info;

use crate::cli::SynthArgs;
use crate::context::load_blueprint;
use crate::error::CliError;

/// Execute the `synth` command
pub fn run_synth(args: &SynthArgs) -> Result<()> {
    let blueprint = args.config.as_deref().map(load_blueprint).transpose()?;

    let root = match (&args.root, &blueprint) {
        (Some(root), _) => root.clone(),
        (None, Some(blueprint)) => blueprint.loader.storage_root.clone(),
        (None, None) => {
            return Err(CliError::invalid_argument(
                "root",
                "pass --root or a --config with loader.storage_root",
            )
            .into())
        }
    };

    let mut config = PhantomConfig {
        shape: to_array(&args.shape, "shape")?,
        spacing: Spacing(to_array(&args.spacing, "spacing")?),
        texture: args.texture,
        ..PhantomConfig::default()
    };
    if !config.spacing.is_physical() {
        return Err(CliError::invalid_argument("spacing", "must be finite and positive").into());
    }
    if !args.modalities.is_empty() {
        config.modalities = args.modalities.iter().map(|m| Modality::from(m.as_str())).collect();
    } else if let Some(ref blueprint) = blueprint {
        config.modalities = blueprint.loader.modalities.clone();
    }

    let phantom = config.generate();
    let store = FsVolumeStore::new(&root);
    let patient_id = PatientId::from(args.patient.as_str());
    let series_id = SeriesId::from(args.series.as_str());

    let inputs = phantom
        .write_to(&store, &patient_id, &series_id)
        .with_context(|| format!("Failed to write phantom under {}", root.display()))?;

    if args.truth {
        let key = VolumeKey {
            patient_id: patient_id.clone(),
            series_id: series_id.clone(),
            modality: "truth".into(),
        };
        let path = store.series_dir(&key).join("truth.nii.gz");
        nifti::write_labels(&path, &phantom.truth)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("  truth mask: {}", path.display());
    }

    info!(
        patient = %patient_id,
        series = %series_id,
        volumes = inputs.len(),
        "Phantom written"
    );

    println!(
        "Wrote {} volume(s) for {} / {} under {}",
        inputs.len(),
        patient_id,
        series_id,
        root.display()
    );
    let voxel_mm3 = config.spacing.voxel_volume_mm3();
    for class in TissueClass::foreground() {
        let voxels = phantom.truth_voxels(class);
        println!(
            "  {:<18} {:>7} voxels  {:>9.3} cm3",
            class.display_name(),
            voxels,
            voxels as f64 * voxel_mm3 / 1000.0
        );
    }

    Ok(())
}

fn to_array<T: Copy>(values: &[T], name: &str) -> Result<[T; 3]> {
    <[T; 3]>::try_from(values)
        .map_err(|_| CliError::invalid_argument(name, "expected exactly three values").into())
}
