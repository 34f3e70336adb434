//! # Postprocess
//!
//! Prediction → label volume → physical measurements.
//!
//! - arg-max with lowest-id tie-break
//! - per-class connected components and speckle removal
//! - voxel counts to cm³, per class and per composite region

mod argmax;
mod components;
mod processor;
mod volumetrics;

pub use argmax::{argmax, check_labels};
pub use components::{
    label_components, remove_small_components, summarize, ClassComponents, Component,
};
pub use processor::{PostProcessed, PostProcessor};
pub use volumetrics::Volumetrics;
