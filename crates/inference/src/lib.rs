//! # Inference
//!
//! Windowed classifier orchestration.
//!
//! - window enumeration (whole volume / slices / overlapping patches)
//! - bounded-concurrency classifier calls with timeout + retry
//! - deterministic reassembly of window scores
//! - classifier backends: threshold, identity, remote model server
//!
//! ```ignore
//! use inference::{BuiltinClassifier, InferenceOrchestrator};
//!
//! let classifier = BuiltinClassifier::from_config(&blueprint.classifier, 4).await?;
//! let orchestrator = InferenceOrchestrator::new(classifier, blueprint.inference.clone());
//! let output = orchestrator.run(&tensor).await?;
//! ```

mod accumulator;
mod classifiers;
mod engine;
pub mod wire;
mod window;

pub use accumulator::Accumulator;
pub use classifiers::{
    serve, BuiltinClassifier, IdentityClassifier, RemoteClassifier, ThresholdClassifier,
};
pub use engine::{extract_unit, InferenceOrchestrator, InferenceOutput};
pub use window::{axis_origins, enumerate, Window};
