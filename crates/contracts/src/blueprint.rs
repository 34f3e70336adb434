//! PipelineBlueprint - Config Loader output
//!
//! Describes one complete pipeline setup: inputs, normalization, windowing,
//! classifier backend, cleanup, artifact layout, job storage and event routing.
//! Each section is handed to its component at construction time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use validator::Validate;

use crate::{JobConfig, Modality};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Processing method name, recorded in every metrics document
    #[serde(default = "default_method")]
    #[validate(length(min = 1))]
    pub method: String,

    /// Input volumes
    #[validate(nested)]
    pub loader: LoaderConfig,

    #[serde(default)]
    #[validate(nested)]
    pub normalization: NormalizationConfig,

    #[serde(default)]
    #[validate(nested)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub postprocess: PostprocessConfig,

    #[serde(default)]
    pub artifacts: ArtifactConfig,

    #[serde(default)]
    pub jobs: JobStoreConfig,

    /// Lifecycle event routing
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

fn default_method() -> String {
    "tumorseg-volumetric".to_string()
}

/// Input volume settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoaderConfig {
    /// Channel order of the normalized tensor
    #[validate(length(min = 1))]
    pub modalities: Vec<Modality>,

    /// Allowed per-axis spacing difference between modalities (mm)
    #[serde(default = "default_spacing_tolerance")]
    #[validate(range(min = 0.0))]
    pub spacing_tolerance_mm: f64,

    /// Root of the path-addressed volume store
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
}

fn default_spacing_tolerance() -> f64 {
    1e-3
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

/// Where intensity statistics are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationScope {
    #[default]
    PerVolume,
    PerSlice,
}

/// Intensity rescaling settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NormalizationConfig {
    /// Lower clip percentile, 0..=100
    #[serde(default = "default_lower_percentile")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub lower_percentile: f64,

    /// Upper clip percentile, 0..=100
    #[serde(default = "default_upper_percentile")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub upper_percentile: f64,

    #[serde(default)]
    pub out_min: f32,

    #[serde(default = "default_out_max")]
    pub out_max: f32,

    #[serde(default)]
    pub scope: NormalizationScope,

    /// Axis slices are taken along when `scope = per_slice`
    #[serde(default = "default_slice_axis")]
    #[validate(range(max = 2))]
    pub slice_axis: usize,

    /// Compute statistics over non-zero voxels only
    #[serde(default)]
    pub foreground_only: bool,
}

fn default_lower_percentile() -> f64 {
    0.5
}

fn default_upper_percentile() -> f64 {
    99.5
}

fn default_out_max() -> f32 {
    1.0
}

fn default_slice_axis() -> usize {
    2
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            lower_percentile: default_lower_percentile(),
            upper_percentile: default_upper_percentile(),
            out_min: 0.0,
            out_max: default_out_max(),
            scope: NormalizationScope::default(),
            slice_axis: default_slice_axis(),
            foreground_only: false,
        }
    }
}

/// How the volume is cut into inference units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WindowSpec {
    /// One unit covering the whole volume
    #[default]
    WholeVolume,
    /// One unit per slice along `axis`
    Slice { axis: usize },
    /// Fixed-size patches, origins every `stride` voxels
    Patch { size: [usize; 3], stride: [usize; 3] },
}

/// How overlapping window predictions are merged
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CombinationRule {
    /// Uniform mean of all windows covering a voxel
    #[default]
    Average,
    /// Centre-weighted mean, sigma = `sigma_scale` × window size
    Gaussian {
        #[serde(default = "default_sigma_scale")]
        sigma_scale: f64,
    },
    /// Per-class maximum
    Max,
}

fn default_sigma_scale() -> f64 {
    0.125
}

/// Inference orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InferenceConfig {
    #[serde(default)]
    pub window: WindowSpec,

    #[serde(default)]
    pub combination: CombinationRule,

    /// Timeout per classifier call
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Extra attempts per window after the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before retry n is `n × retry_backoff_ms`
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Classifier calls in flight at once
    #[serde(default = "default_max_in_flight")]
    #[validate(range(min = 1, max = 256))]
    pub max_in_flight: usize,

    /// Fill value for axes shorter than a patch
    #[serde(default)]
    pub pad_value: f32,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_max_in_flight() -> usize {
    4
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            window: WindowSpec::default(),
            combination: CombinationRule::default(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_in_flight: default_max_in_flight(),
            pad_value: 0.0,
        }
    }
}

/// Classifier backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Intensity bands on one channel
    #[default]
    Threshold,
    /// Returns its input; for testing
    Identity,
    /// Model server over TCP
    Remote,
}

/// Classifier backend settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub kind: ClassifierKind,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Neighbourhood used for connected components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// 6-neighbourhood
    #[default]
    Face,
    /// 26-neighbourhood
    Full,
}

/// Label cleanup settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostprocessConfig {
    /// Components smaller than this become background; 0 disables the filter
    #[serde(default)]
    pub min_component_voxels: u64,

    #[serde(default)]
    pub connectivity: Connectivity,
}

/// Mask file encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskFormat {
    #[default]
    NiftiGz,
    Nifti,
}

impl MaskFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::NiftiGz => "segmentation.nii.gz",
            Self::Nifti => "segmentation.nii",
        }
    }
}

/// Persisted artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub mask_format: MaskFormat,

    /// Write the human-readable `summary.txt`
    #[serde(default = "default_true")]
    pub write_summary: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            mask_format: MaskFormat::default(),
            write_summary: true,
        }
    }
}

/// Job record storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStoreConfig {
    /// JSON-file store directory; in-memory when absent
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON-lines event file
    File,
    /// Network output (UDP)
    Network,
}

impl PipelineBlueprint {
    /// Minimal blueprint for the given channel order, all other sections defaulted
    pub fn for_modalities<I, M>(modalities: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Modality>,
    {
        Self {
            version: ConfigVersion::V1,
            method: default_method(),
            loader: LoaderConfig {
                modalities: modalities.into_iter().map(Into::into).collect(),
                spacing_tolerance_mm: default_spacing_tolerance(),
                storage_root: default_storage_root(),
            },
            normalization: NormalizationConfig::default(),
            inference: InferenceConfig::default(),
            classifier: ClassifierConfig::default(),
            postprocess: PostprocessConfig::default(),
            artifacts: ArtifactConfig::default(),
            jobs: JobStoreConfig::default(),
            sinks: Vec::new(),
        }
    }

    /// Snapshot recorded on every job created with this blueprint
    pub fn job_config(&self, classifier: impl Into<String>) -> JobConfig {
        JobConfig {
            modalities: self.loader.modalities.clone(),
            window: self.inference.window,
            combination: self.inference.combination,
            min_component_voxels: self.postprocess.min_component_voxels,
            connectivity: self.postprocess.connectivity,
            classifier: classifier.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_sections() {
        let blueprint: PipelineBlueprint =
            serde_json::from_str(r#"{ "loader": { "modalities": ["T1", "flair"] } }"#).unwrap();
        assert_eq!(blueprint.loader.modalities[0], "t1");
        assert_eq!(blueprint.normalization.upper_percentile, 99.5);
        assert_eq!(blueprint.inference.window, WindowSpec::WholeVolume);
        assert_eq!(blueprint.inference.combination, CombinationRule::Average);
        assert_eq!(blueprint.classifier.kind, ClassifierKind::Threshold);
        assert_eq!(blueprint.artifacts.mask_format, MaskFormat::NiftiGz);
        assert!(blueprint.validate().is_ok());
    }

    #[test]
    fn tagged_window_and_rule() {
        let json = r#"{
            "loader": { "modalities": ["t1"] },
            "inference": {
                "window": { "mode": "patch", "size": [8, 8, 8], "stride": [4, 4, 4] },
                "combination": { "rule": "gaussian" }
            }
        }"#;
        let blueprint: PipelineBlueprint = serde_json::from_str(json).unwrap();
        assert_eq!(
            blueprint.inference.window,
            WindowSpec::Patch {
                size: [8, 8, 8],
                stride: [4, 4, 4]
            }
        );
        assert_eq!(
            blueprint.inference.combination,
            CombinationRule::Gaussian { sigma_scale: 0.125 }
        );
    }

    #[test]
    fn field_ranges_are_checked() {
        let mut blueprint = PipelineBlueprint::for_modalities(["t1"]);
        blueprint.normalization.upper_percentile = 120.0;
        assert!(blueprint.validate().is_err());

        let blueprint = PipelineBlueprint::for_modalities(Vec::<Modality>::new());
        assert!(blueprint.validate().is_err());

        let mut blueprint = PipelineBlueprint::for_modalities(["t1"]);
        blueprint.inference.max_in_flight = 0;
        assert!(blueprint.validate().is_err());
    }

    #[test]
    fn job_config_snapshot() {
        let mut blueprint = PipelineBlueprint::for_modalities(["t1", "t2"]);
        blueprint.postprocess.min_component_voxels = 5;
        let config = blueprint.job_config("threshold");
        assert_eq!(config.modalities.len(), 2);
        assert_eq!(config.min_component_voxels, 5);
        assert_eq!(config.classifier, "threshold");
    }
}
