//! Classifier trait - inference backend interface
//!
//! The model is a black box: one multi-channel window in, per-class scores of
//! the same spatial shape out.

use ndarray::Array4;
use thiserror::Error;

/// One window submitted to the classifier
#[derive(Debug, Clone)]
pub struct InferenceUnit {
    /// Position in the deterministic window enumeration
    pub index: usize,
    /// Voxel origin `[x, y, z]` inside the full volume
    pub origin: [usize; 3],
    /// `(C, X, Y, Z)` input
    pub data: Array4<f32>,
}

impl InferenceUnit {
    pub fn spatial_shape(&self) -> [usize; 3] {
        let (_, x, y, z) = self.data.dim();
        [x, y, z]
    }
}

/// Error reported by a classifier backend
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The model rejected or failed on the unit
    #[error("backend error: {0}")]
    Backend(String),

    /// Connection to the backend failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Unit does not fit the declared input contract
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ClassifierError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Transport(_))
    }
}

/// Inference backend
///
/// Implementations must be safe to call concurrently; the orchestrator keeps
/// several windows in flight against one instance.
#[trait_variant::make(Classifier: Send)]
pub trait LocalClassifier {
    /// Backend name (used for logging/metrics and job records)
    fn name(&self) -> &str;

    /// Number of output score channels
    fn num_classes(&self) -> usize;

    /// Number of input channels expected, in configured modality order
    fn input_channels(&self) -> usize;

    /// Score one unit
    ///
    /// # Errors
    /// Returns the backend failure; the orchestrator decides on retries
    async fn classify(&self, unit: &InferenceUnit) -> Result<Array4<f32>, ClassifierError>;
}
