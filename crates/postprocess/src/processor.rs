//! PostProcessor - prediction to cleaned label volume

use contracts::{InvariantViolation, LabelVolume, PostprocessConfig, PredictionTensor};
use tracing::{debug, instrument};

use crate::argmax::argmax;
use crate::components::remove_small_components;

/// Cleaned label volume plus cleanup bookkeeping
#[derive(Debug, Clone)]
pub struct PostProcessed {
    pub labels: LabelVolume,
    /// Voxels reassigned to background by the speckle filter
    pub cleared_voxels: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessor {
    config: PostprocessConfig,
}

impl PostProcessor {
    pub fn new(config: PostprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostprocessConfig {
        &self.config
    }

    #[instrument(name = "postprocess", skip(self, prediction), fields(min_component_voxels = self.config.min_component_voxels))]
    pub fn process(&self, prediction: &PredictionTensor) -> Result<PostProcessed, InvariantViolation> {
        let mut labels = argmax(prediction)?;
        let cleared_voxels = remove_small_components(
            &mut labels.labels,
            self.config.connectivity,
            self.config.min_component_voxels,
        );
        if cleared_voxels > 0 {
            metrics::counter!("tumorseg_speckle_voxels_cleared_total").increment(cleared_voxels);
        }
        debug!(cleared_voxels, "label volume ready");
        Ok(PostProcessed {
            labels,
            cleared_voxels,
        })
    }
}
