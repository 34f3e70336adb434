//! # Dispatcher
//!
//! Job lifecycle event fan-out.
//!
//! - consumes `JobEvent`s from the job service
//! - one bounded queue + worker per sink
//! - a slow or failing sink never blocks the pipeline

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{EventSink, JobEvent};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, LogSink, NetworkSink};
