//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::PipelineBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::context::load_blueprint;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    method: String,
    input: InputInfo,
    inference: InferenceInfo,
    classifier: ClassifierInfo,
    output: OutputInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct InputInfo {
    modalities: Vec<String>,
    storage_root: String,
    spacing_tolerance_mm: f64,
    normalization: String,
}

#[derive(Serialize)]
struct InferenceInfo {
    window: String,
    combination: String,
    timeout_ms: u64,
    max_retries: u32,
    max_in_flight: usize,
}

#[derive(Serialize)]
struct ClassifierInfo {
    kind: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct OutputInfo {
    output_dir: String,
    mask_file: String,
    write_summary: bool,
    min_component_voxels: u64,
    connectivity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_dir: Option<String>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn normalization_desc(blueprint: &PipelineBlueprint) -> String {
    let n = &blueprint.normalization;
    format!(
        "p{}-p{} -> [{}, {}], {:?}{}",
        n.lower_percentile,
        n.upper_percentile,
        n.out_min,
        n.out_max,
        n.scope,
        if n.foreground_only { ", foreground only" } else { "" }
    )
}

fn build_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        method: blueprint.method.clone(),
        input: InputInfo {
            modalities: blueprint
                .loader
                .modalities
                .iter()
                .map(ToString::to_string)
                .collect(),
            storage_root: blueprint.loader.storage_root.display().to_string(),
            spacing_tolerance_mm: blueprint.loader.spacing_tolerance_mm,
            normalization: normalization_desc(blueprint),
        },
        inference: InferenceInfo {
            window: format!("{:?}", blueprint.inference.window),
            combination: format!("{:?}", blueprint.inference.combination),
            timeout_ms: blueprint.inference.timeout_ms,
            max_retries: blueprint.inference.max_retries,
            max_in_flight: blueprint.inference.max_in_flight,
        },
        classifier: ClassifierInfo {
            kind: format!("{:?}", blueprint.classifier.kind),
            params: blueprint
                .classifier
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        },
        output: OutputInfo {
            output_dir: blueprint.artifacts.output_dir.display().to_string(),
            mask_file: blueprint.artifacts.mask_format.file_name().to_string(),
            write_summary: blueprint.artifacts.write_summary,
            min_component_voxels: blueprint.postprocess.min_component_voxels,
            connectivity: format!("{:?}", blueprint.postprocess.connectivity),
            store_dir: blueprint
                .jobs
                .store_dir
                .as_ref()
                .map(|d| d.display().to_string()),
        },
        sinks,
    }
}

fn print_config_info(blueprint: &PipelineBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               tumorseg Configuration                         ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("Input");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Method: {}", blueprint.method);
    println!("   ├─ Modalities: {:?}", blueprint.loader.modalities);
    println!("   ├─ Storage root: {}", blueprint.loader.storage_root.display());
    println!("   └─ Normalization: {}", normalization_desc(blueprint));

    let inference = &blueprint.inference;
    println!("\nInference");
    println!("   ├─ Window: {:?}", inference.window);
    println!("   ├─ Combination: {:?}", inference.combination);
    println!(
        "   ├─ Timeout: {}ms x {} retries (backoff {}ms)",
        inference.timeout_ms, inference.max_retries, inference.retry_backoff_ms
    );
    println!("   ├─ In flight: {}", inference.max_in_flight);
    println!("   └─ Classifier: {:?}", blueprint.classifier.kind);

    println!("\nOutput");
    println!(
        "   ├─ Speckle filter: {} voxels ({:?})",
        blueprint.postprocess.min_component_voxels, blueprint.postprocess.connectivity
    );
    println!(
        "   ├─ Artifacts: {}/<job_id>/{}",
        blueprint.artifacts.output_dir.display(),
        blueprint.artifacts.mask_format.file_name()
    );
    match &blueprint.jobs.store_dir {
        Some(dir) => println!("   └─ Job records: {}", dir.display()),
        None => println!("   └─ Job records: in memory"),
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            if args.sinks {
                println!(
                    "   {} {} ({:?}, queue {}) {:?}",
                    prefix, sink.name, sink.sink_type, sink.queue_capacity, sink.params
                );
            } else {
                println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);
            }
        }
    }

    println!();
}
