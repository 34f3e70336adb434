//! ThresholdClassifier - intensity bands on one channel
//!
//! Each band is a lower bound on the normalized intensity; a voxel gets the
//! class of the highest bound it reaches, background below all of them.
//! Output is one-hot over the full taxonomy.

use std::collections::HashMap;

use contracts::{Classifier, ClassifierError, ContractError, InferenceUnit, TissueClass};
use ndarray::{Array4, Axis, Zip};

/// Default lower bounds, tuned for percentile-normalized input in `[0, 1]`
const DEFAULT_BANDS: [(TissueClass, f32); 3] = [
    (TissueClass::PeritumoralEdema, 0.2),
    (TissueClass::NecroticCore, 0.5),
    (TissueClass::EnhancingTissue, 0.85),
];

/// Deterministic stand-in for a trained model
#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    channel: usize,
    input_channels: usize,
    /// Ascending by bound
    bands: Vec<(f32, TissueClass)>,
}

impl ThresholdClassifier {
    pub fn new(
        channel: usize,
        input_channels: usize,
        bands: impl IntoIterator<Item = (TissueClass, f32)>,
    ) -> Self {
        let mut bands: Vec<(f32, TissueClass)> = bands
            .into_iter()
            .filter(|(class, _)| !class.is_background())
            .map(|(class, bound)| (bound, class))
            .collect();
        bands.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Self {
            channel,
            input_channels,
            bands,
        }
    }

    /// Build from `classifier.params`
    ///
    /// Keys: `channel` (default 0) and one lower bound per class name
    /// (`necrotic_core`, `peritumoral_edema`, `enhancing_tissue`). When no
    /// bound is given the defaults apply.
    pub fn from_params(
        params: &HashMap<String, String>,
        input_channels: usize,
    ) -> Result<Self, ContractError> {
        let channel = match params.get("channel") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ContractError::config_validation(
                    "classifier.params.channel",
                    format!("expected a channel index, got '{raw}'"),
                )
            })?,
            None => 0,
        };
        if channel >= input_channels {
            return Err(ContractError::config_validation(
                "classifier.params.channel",
                format!("channel {channel} out of range for {input_channels} input channel(s)"),
            ));
        }

        let mut bands = Vec::new();
        for class in TissueClass::foreground() {
            if let Some(raw) = params.get(class.key()) {
                let bound = raw.trim().parse::<f32>().map_err(|_| {
                    ContractError::config_validation(
                        format!("classifier.params.{}", class.key()),
                        format!("expected a number, got '{raw}'"),
                    )
                })?;
                bands.push((class, bound));
            }
        }
        if bands.is_empty() {
            bands.extend(DEFAULT_BANDS);
        }

        Ok(Self::new(channel, input_channels, bands))
    }

    fn class_of(&self, value: f32) -> TissueClass {
        if !value.is_finite() {
            return TissueClass::Background;
        }
        self.bands
            .iter()
            .rev()
            .find(|(bound, _)| value >= *bound)
            .map(|(_, class)| *class)
            .unwrap_or(TissueClass::Background)
    }
}

impl Classifier for ThresholdClassifier {
    fn name(&self) -> &str {
        "threshold"
    }

    fn num_classes(&self) -> usize {
        TissueClass::COUNT
    }

    fn input_channels(&self) -> usize {
        self.input_channels
    }

    async fn classify(&self, unit: &InferenceUnit) -> Result<Array4<f32>, ClassifierError> {
        let (channels, nx, ny, nz) = unit.data.dim();
        if self.channel >= channels {
            return Err(ClassifierError::InvalidInput(format!(
                "channel {} missing from a {channels}-channel unit",
                self.channel
            )));
        }

        let source = unit.data.index_axis(Axis(0), self.channel);
        let mut labels = ndarray::Array3::<u8>::zeros((nx, ny, nz));
        Zip::from(&mut labels)
            .and(&source)
            .for_each(|label, &v| *label = self.class_of(v).id());

        let mut scores = Array4::<f32>::zeros((TissueClass::COUNT, nx, ny, nz));
        for ((x, y, z), &label) in labels.indexed_iter() {
            scores[[label as usize, x, y, z]] = 1.0;
        }
        Ok(scores)
    }
}
