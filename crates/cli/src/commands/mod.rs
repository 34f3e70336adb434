//! Command implementations.

mod info;
mod job;
mod run;
mod stats;
mod synth;
mod validate;

pub use info::run_info;
pub use job::run_job;
pub use run::run_pipeline;
pub use stats::run_stats;
pub use synth::run_synth;
pub use validate::run_validate;
