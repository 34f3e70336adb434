//! # Pipeline
//!
//! One segmentation run per job:
//!
//! ```text
//! load -> normalize -> create job -> begin -> infer -> post-process
//!      -> volumetrics -> artifacts -> completed | failed
//! ```
//!
//! Input problems are reported before a job exists. Once a job is created
//! every run ends in exactly one terminal transition.

mod batch;
mod runner;

pub use batch::{run_batch, BatchEntry, BatchReport};
pub use runner::{JobOutcome, PreparedJob, SegmentationPipeline, SegmentationRequest};
