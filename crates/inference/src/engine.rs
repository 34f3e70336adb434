//! InferenceOrchestrator - windowed classifier invocation
//!
//! Cuts the normalized tensor into units, keeps up to `max_in_flight` calls
//! running, and folds results into the accumulator in window order. Any
//! window that exhausts its retries aborts the whole run.

use std::time::{Duration, Instant};

use contracts::{
    Classifier, ClassifierError, InferenceConfig, InferenceError, InferenceUnit, NormalizedTensor,
    PredictionTensor,
};
use futures::stream::{self, StreamExt};
use ndarray::{s, Array4};
use tracing::{debug, info, instrument, warn};

use crate::accumulator::Accumulator;
use crate::window::{enumerate, Window};

/// Prediction plus bookkeeping for the job record
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    pub prediction: PredictionTensor,
    /// Units sent to the classifier
    pub units: usize,
    /// Retries spent across all units
    pub retries: u32,
}

/// Result of one window after retries
struct UnitOutcome {
    window: Window,
    scores: Array4<f32>,
    retries: u32,
}

/// Drives a classifier over every window of a tensor
#[derive(Debug)]
pub struct InferenceOrchestrator<C> {
    classifier: C,
    config: InferenceConfig,
}

impl<C> InferenceOrchestrator<C>
where
    C: Classifier + Sync,
{
    pub fn new(classifier: C, config: InferenceConfig) -> Self {
        Self { classifier, config }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Run the classifier over `tensor` and reassemble a full-volume prediction
    #[instrument(
        name = "inference",
        skip(self, tensor),
        fields(classifier = self.classifier.name(), shape = ?tensor.spatial_shape())
    )]
    pub async fn run(&self, tensor: &NormalizedTensor) -> Result<InferenceOutput, InferenceError> {
        let expected = self.classifier.input_channels();
        if tensor.num_channels() != expected {
            return Err(InferenceError::ChannelMismatch {
                classifier: self.classifier.name().to_string(),
                expected,
                actual: tensor.num_channels(),
            });
        }

        let shape = tensor.spatial_shape();
        let windows = enumerate(&self.config.window, shape);
        let total = windows.len();
        let started = Instant::now();
        debug!(windows = total, "starting inference");

        let mut accumulator =
            Accumulator::new(self.config.combination, self.classifier.num_classes(), shape);
        let mut retries = 0;

        // buffered() yields in submission order, so accumulation stays deterministic
        let mut outcomes = stream::iter(windows)
            .map(|window| self.run_unit(tensor, window))
            .buffered(self.config.max_in_flight.max(1));

        while let Some(outcome) = outcomes.next().await {
            let outcome = outcome?;
            accumulator.add(&outcome.window, outcome.scores.view());
            retries += outcome.retries;
        }

        if accumulator.windows() != total {
            return Err(InferenceError::Cancelled {
                completed: accumulator.windows(),
                total,
            });
        }

        metrics::histogram!("tumorseg_inference_seconds").record(started.elapsed().as_secs_f64());
        metrics::counter!("tumorseg_inference_units_total").increment(total as u64);
        info!(
            units = total,
            retries,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inference complete"
        );

        Ok(InferenceOutput {
            prediction: PredictionTensor {
                scores: accumulator.finish(),
                spacing: tensor.spacing,
                orientation: tensor.orientation,
            },
            units: total,
            retries,
        })
    }

    async fn run_unit(
        &self,
        tensor: &NormalizedTensor,
        window: Window,
    ) -> Result<UnitOutcome, InferenceError> {
        let unit = extract_unit(tensor, &window, self.config.pad_value);
        let name = self.classifier.name();
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let call_started = Instant::now();
            let result = tokio::time::timeout(timeout, self.classifier.classify(&unit)).await;
            metrics::histogram!("tumorseg_classifier_call_seconds", "classifier" => name.to_string())
                .record(call_started.elapsed().as_secs_f64());

            let failure = match result {
                Ok(Ok(scores)) => {
                    let scores = self.check_and_crop(&window, scores)?;
                    return Ok(UnitOutcome {
                        window,
                        scores,
                        retries: attempt - 1,
                    });
                }
                Ok(Err(ClassifierError::InvalidInput(message))) => {
                    return Err(InferenceError::Backend {
                        classifier: name.to_string(),
                        window: window.index,
                        attempts: attempt,
                        message,
                    });
                }
                Ok(Err(e)) => InferenceError::Backend {
                    classifier: name.to_string(),
                    window: window.index,
                    attempts: attempt,
                    message: e.to_string(),
                },
                Err(_) => InferenceError::Timeout {
                    classifier: name.to_string(),
                    window: window.index,
                    attempts: attempt,
                    timeout_ms: self.config.timeout_ms,
                },
            };

            if attempt >= max_attempts {
                return Err(failure);
            }

            warn!(window = window.index, attempt, error = %failure, "classifier call failed, retrying");
            metrics::counter!("tumorseg_classifier_retries_total", "classifier" => name.to_string())
                .increment(1);
            let backoff = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
            if backoff > 0 {
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }
    }

    /// Verify the `(K, size)` output shape and drop the padded margin
    fn check_and_crop(
        &self,
        window: &Window,
        scores: Array4<f32>,
    ) -> Result<Array4<f32>, InferenceError> {
        let [sx, sy, sz] = window.size;
        let expected = vec![self.classifier.num_classes(), sx, sy, sz];
        if scores.shape() != expected.as_slice() {
            return Err(InferenceError::ShapeMismatch {
                classifier: self.classifier.name().to_string(),
                window: window.index,
                expected,
                actual: scores.shape().to_vec(),
            });
        }
        if !window.is_padded() {
            return Ok(scores);
        }
        let [ex, ey, ez] = window.extent;
        Ok(scores.slice(s![.., 0..ex, 0..ey, 0..ez]).to_owned())
    }
}

/// Copy a window out of the tensor, padding beyond the volume edge
pub fn extract_unit(tensor: &NormalizedTensor, window: &Window, pad_value: f32) -> InferenceUnit {
    let [ox, oy, oz] = window.origin;
    let [ex, ey, ez] = window.extent;
    let [sx, sy, sz] = window.size;
    let source = tensor
        .data
        .slice(s![.., ox..ox + ex, oy..oy + ey, oz..oz + ez]);

    let data = if window.is_padded() {
        let mut data = Array4::from_elem((tensor.num_channels(), sx, sy, sz), pad_value);
        data.slice_mut(s![.., 0..ex, 0..ey, 0..ez]).assign(&source);
        data
    } else {
        source.to_owned()
    };

    InferenceUnit {
        index: window.index,
        origin: window.origin,
        data,
    }
}
