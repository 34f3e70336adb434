//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ClassifierKind, PipelineBlueprint, WindowSpec};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    method: String,
    modalities: Vec<String>,
    classifier: String,
    window: String,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    method: blueprint.method.clone(),
                    modalities: blueprint
                        .loader
                        .modalities
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                    classifier: format!("{:?}", blueprint.classifier.kind),
                    window: format!("{:?}", blueprint.inference.window),
                    sink_count: blueprint.sinks.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - job events will be dropped".to_string());
    }

    if blueprint.jobs.store_dir.is_none() {
        warnings.push(
            "jobs.store_dir not set - job records will not outlive the run".to_string(),
        );
    }

    if blueprint.classifier.kind == ClassifierKind::Identity {
        warnings.push(
            "classifier.kind = identity only makes sense when channels equal classes".to_string(),
        );
    }

    if let WindowSpec::Patch { size, stride } = blueprint.inference.window {
        if size.iter().zip(stride.iter()).all(|(s, t)| s == t) {
            warnings.push(
                "patch stride equals size - no overlap, combination rule has no effect".to_string(),
            );
        }
    }

    if blueprint.postprocess.min_component_voxels == 0 {
        warnings.push("postprocess.min_component_voxels = 0 - speckle filter disabled".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Method: {}", summary.method);
            println!("  Modalities: {}", summary.modalities.join(", "));
            println!("  Classifier: {}", summary.classifier);
            println!("  Window: {}", summary.window);
            println!("  Sinks: {}", summary.sink_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
