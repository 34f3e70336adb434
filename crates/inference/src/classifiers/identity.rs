//! IdentityClassifier - returns its input unchanged

use contracts::{Classifier, ClassifierError, InferenceUnit};
use ndarray::Array4;

/// Scores equal to the input channels; used to check window reassembly
#[derive(Debug, Clone)]
pub struct IdentityClassifier {
    channels: usize,
}

impl IdentityClassifier {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Classifier for IdentityClassifier {
    fn name(&self) -> &str {
        "identity"
    }

    fn num_classes(&self) -> usize {
        self.channels
    }

    fn input_channels(&self) -> usize {
        self.channels
    }

    async fn classify(&self, unit: &InferenceUnit) -> Result<Array4<f32>, ClassifierError> {
        Ok(unit.data.clone())
    }
}
