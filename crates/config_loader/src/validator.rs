//! Configuration validation
//!
//! Two passes:
//! - field ranges declared on the blueprint types (`validator` derive)
//! - cross-field rules:
//!   - modalities unique
//!   - lower percentile < upper percentile, out_min < out_max
//!   - window geometry (slice axis < 3, 0 < stride <= size)
//!   - gaussian sigma_scale > 0
//!   - sink names unique
//!   - classifier params consistent with the chosen kind

use std::collections::HashSet;

use contracts::{
    ClassifierKind, CombinationRule, ContractError, PipelineBlueprint, WindowSpec,
};
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Threshold classifier parameters that must parse as numbers
const THRESHOLD_PARAMS: [&str; 4] = ["channel", "necrotic_core", "peritumoral_edema", "enhancing_tissue"];

/// Validate a PipelineBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_field_ranges(blueprint)?;
    validate_modalities(blueprint)?;
    validate_normalization(blueprint)?;
    validate_window(blueprint)?;
    validate_combination(blueprint)?;
    validate_classifier(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

fn validate_field_ranges(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    match blueprint.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let (field, message) = first_violation(&errors, "")
                .unwrap_or_else(|| ("blueprint".to_string(), errors.to_string()));
            Err(ContractError::config_validation(field, message))
        }
    }
}

/// Flatten nested validator errors to the first `(path, message)`, in field-name order
fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in fields {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(errs) => {
                if let Some(err) = errs.first() {
                    return Some((path, describe(err)));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_violation(inner, &path) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_violation(inner, &format!("{path}[{idx}]")) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

fn describe(err: &ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    let mut params: Vec<String> = err
        .params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    params.sort();
    format!("failed {} check ({})", err.code, params.join(", "))
}

fn validate_modalities(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, modality) in blueprint.loader.modalities.iter().enumerate() {
        if modality.as_str().is_empty() {
            return Err(ContractError::config_validation(
                format!("loader.modalities[{idx}]"),
                "modality name cannot be empty",
            ));
        }
        if !seen.insert(modality) {
            return Err(ContractError::config_validation(
                format!("loader.modalities[{idx}]"),
                format!("duplicate modality '{modality}'"),
            ));
        }
    }
    if !blueprint.loader.spacing_tolerance_mm.is_finite() {
        return Err(ContractError::config_validation(
            "loader.spacing_tolerance_mm",
            "must be finite",
        ));
    }
    Ok(())
}

fn validate_normalization(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let norm = &blueprint.normalization;

    if norm.lower_percentile >= norm.upper_percentile {
        return Err(ContractError::config_validation(
            "normalization.lower_percentile / normalization.upper_percentile",
            format!(
                "lower_percentile ({}) must be < upper_percentile ({})",
                norm.lower_percentile, norm.upper_percentile
            ),
        ));
    }

    if !norm.out_min.is_finite() || !norm.out_max.is_finite() || norm.out_min >= norm.out_max {
        return Err(ContractError::config_validation(
            "normalization.out_min / normalization.out_max",
            format!(
                "out_min ({}) must be < out_max ({}) and both finite",
                norm.out_min, norm.out_max
            ),
        ));
    }

    Ok(())
}

fn validate_window(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    match blueprint.inference.window {
        WindowSpec::WholeVolume => Ok(()),
        WindowSpec::Slice { axis } => {
            if axis > 2 {
                return Err(ContractError::config_validation(
                    "inference.window.axis",
                    format!("slice axis must be 0, 1 or 2, got {axis}"),
                ));
            }
            Ok(())
        }
        WindowSpec::Patch { size, stride } => {
            for axis in 0..3 {
                if size[axis] == 0 {
                    return Err(ContractError::config_validation(
                        format!("inference.window.size[{axis}]"),
                        "patch size must be > 0",
                    ));
                }
                if stride[axis] == 0 || stride[axis] > size[axis] {
                    return Err(ContractError::config_validation(
                        format!("inference.window.stride[{axis}]"),
                        format!(
                            "stride must satisfy 0 < stride <= size ({}), got {}",
                            size[axis], stride[axis]
                        ),
                    ));
                }
            }
            Ok(())
        }
    }
}

fn validate_combination(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    if let CombinationRule::Gaussian { sigma_scale } = blueprint.inference.combination {
        if !(sigma_scale.is_finite() && sigma_scale > 0.0) {
            return Err(ContractError::config_validation(
                "inference.combination.sigma_scale",
                format!("sigma_scale must be > 0, got {sigma_scale}"),
            ));
        }
    }
    Ok(())
}

fn validate_classifier(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let classifier = &blueprint.classifier;
    match classifier.kind {
        ClassifierKind::Identity => Ok(()),
        ClassifierKind::Remote => {
            let address = classifier.params.get("address").map(String::as_str);
            match address {
                Some(addr) if !addr.trim().is_empty() => Ok(()),
                _ => Err(ContractError::config_validation(
                    "classifier.params.address",
                    "remote classifier requires an address",
                )),
            }
        }
        ClassifierKind::Threshold => {
            for key in THRESHOLD_PARAMS {
                if let Some(raw) = classifier.params.get(key) {
                    if raw.trim().parse::<f64>().is_err() {
                        return Err(ContractError::config_validation(
                            format!("classifier.params.{key}"),
                            format!("expected a number, got '{raw}'"),
                        ));
                    }
                }
            }
            if let Some(channel) = classifier.params.get("channel") {
                let channel: usize = channel.trim().parse().map_err(|_| {
                    ContractError::config_validation(
                        "classifier.params.channel",
                        format!("expected a channel index, got '{channel}'"),
                    )
                })?;
                if channel >= blueprint.loader.modalities.len() {
                    return Err(ContractError::config_validation(
                        "classifier.params.channel",
                        format!(
                            "channel {channel} out of range for {} modalities",
                            blueprint.loader.modalities.len()
                        ),
                    ));
                }
            }
            Ok(())
        }
    }
}

fn validate_sinks(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SinkConfig, SinkType};

    fn minimal_blueprint() -> PipelineBlueprint {
        let mut bp = PipelineBlueprint::for_modalities(["t1", "t1ce", "t2", "flair"]);
        bp.sinks.push(SinkConfig {
            name: "log".into(),
            sink_type: SinkType::Log,
            queue_capacity: 100,
            params: Default::default(),
        });
        bp
    }

    fn error_text(bp: &PipelineBlueprint) -> String {
        validate(bp).unwrap_err().to_string()
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&minimal_blueprint()).is_ok());
    }

    #[test]
    fn test_duplicate_modality() {
        let mut bp = minimal_blueprint();
        bp.loader.modalities.push("T1".into());
        let err = error_text(&bp);
        assert!(err.contains("duplicate modality 't1'"), "got: {err}");
    }

    #[test]
    fn test_percentile_order() {
        let mut bp = minimal_blueprint();
        bp.normalization.lower_percentile = 99.0;
        bp.normalization.upper_percentile = 1.0;
        let err = error_text(&bp);
        assert!(err.contains("lower_percentile"), "got: {err}");
    }

    #[test]
    fn test_percentile_range_from_derive() {
        let mut bp = minimal_blueprint();
        bp.normalization.upper_percentile = 150.0;
        let err = error_text(&bp);
        assert!(err.contains("normalization.upper_percentile"), "got: {err}");
        assert!(err.contains("range"), "got: {err}");
    }

    #[test]
    fn test_output_range_order() {
        let mut bp = minimal_blueprint();
        bp.normalization.out_min = 1.0;
        bp.normalization.out_max = 1.0;
        let err = error_text(&bp);
        assert!(err.contains("out_min"), "got: {err}");
    }

    #[test]
    fn test_patch_stride_bounds() {
        let mut bp = minimal_blueprint();
        bp.inference.window = WindowSpec::Patch {
            size: [8, 8, 8],
            stride: [8, 9, 8],
        };
        let err = error_text(&bp);
        assert!(err.contains("stride[1]"), "got: {err}");

        bp.inference.window = WindowSpec::Patch {
            size: [8, 8, 8],
            stride: [0, 8, 8],
        };
        assert!(validate(&bp).is_err());

        bp.inference.window = WindowSpec::Patch {
            size: [8, 8, 8],
            stride: [4, 8, 2],
        };
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_slice_axis() {
        let mut bp = minimal_blueprint();
        bp.inference.window = WindowSpec::Slice { axis: 3 };
        let err = error_text(&bp);
        assert!(err.contains("slice axis"), "got: {err}");
    }

    #[test]
    fn test_gaussian_sigma() {
        let mut bp = minimal_blueprint();
        bp.inference.combination = CombinationRule::Gaussian { sigma_scale: 0.0 };
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_remote_requires_address() {
        let mut bp = minimal_blueprint();
        bp.classifier.kind = ClassifierKind::Remote;
        let err = error_text(&bp);
        assert!(err.contains("address"), "got: {err}");

        bp.classifier
            .params
            .insert("address".into(), "127.0.0.1:7070".into());
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_threshold_channel_in_range() {
        let mut bp = minimal_blueprint();
        bp.classifier.params.insert("channel".into(), "4".into());
        let err = error_text(&bp);
        assert!(err.contains("out of range"), "got: {err}");

        bp.classifier.params.insert("channel".into(), "3".into());
        bp.classifier
            .params
            .insert("enhancing_tissue".into(), "high".into());
        let err = error_text(&bp);
        assert!(err.contains("expected a number"), "got: {err}");
    }

    #[test]
    fn test_empty_sink_name() {
        let mut bp = minimal_blueprint();
        bp.sinks[0].name = String::new();
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_duplicate_sink_name() {
        let mut bp = minimal_blueprint();
        bp.sinks.push(bp.sinks[0].clone());
        let err = error_text(&bp);
        assert!(err.contains("duplicate sink name"), "got: {err}");
    }
}
