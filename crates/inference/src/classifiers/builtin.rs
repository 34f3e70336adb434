//! BuiltinClassifier - runtime selection from `ClassifierConfig`

use contracts::{
    Classifier, ClassifierConfig, ClassifierError, ClassifierKind, ContractError, InferenceUnit,
};
use ndarray::Array4;
use tracing::info;

use super::{IdentityClassifier, RemoteClassifier, ThresholdClassifier};

/// One of the classifiers shipped with the pipeline
#[derive(Debug)]
pub enum BuiltinClassifier {
    Identity(IdentityClassifier),
    Threshold(ThresholdClassifier),
    Remote(RemoteClassifier),
}

impl BuiltinClassifier {
    /// Build the configured backend; remote backends are contacted here
    pub async fn from_config(
        config: &ClassifierConfig,
        input_channels: usize,
    ) -> Result<Self, ContractError> {
        let classifier = match config.kind {
            ClassifierKind::Identity => Self::Identity(IdentityClassifier::new(input_channels)),
            ClassifierKind::Threshold => Self::Threshold(ThresholdClassifier::from_params(
                &config.params,
                input_channels,
            )?),
            ClassifierKind::Remote => Self::Remote(RemoteClassifier::from_params(&config.params).await?),
        };
        info!(
            classifier = classifier.name(),
            num_classes = classifier.num_classes(),
            input_channels = classifier.input_channels(),
            "classifier ready"
        );
        Ok(classifier)
    }
}

impl Classifier for BuiltinClassifier {
    fn name(&self) -> &str {
        match self {
            Self::Identity(c) => c.name(),
            Self::Threshold(c) => c.name(),
            Self::Remote(c) => c.name(),
        }
    }

    fn num_classes(&self) -> usize {
        match self {
            Self::Identity(c) => c.num_classes(),
            Self::Threshold(c) => c.num_classes(),
            Self::Remote(c) => c.num_classes(),
        }
    }

    fn input_channels(&self) -> usize {
        match self {
            Self::Identity(c) => c.input_channels(),
            Self::Threshold(c) => c.input_channels(),
            Self::Remote(c) => c.input_channels(),
        }
    }

    async fn classify(&self, unit: &InferenceUnit) -> Result<Array4<f32>, ClassifierError> {
        match self {
            Self::Identity(c) => c.classify(unit).await,
            Self::Threshold(c) => c.classify(unit).await,
            Self::Remote(c) => c.classify(unit).await,
        }
    }
}
