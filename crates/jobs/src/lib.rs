//! # Jobs
//!
//! Segmentation job lifecycle, the job record interface and per-clinician
//! statistics.
//!
//! ```ignore
//! let service = JobService::new(MemoryJobStore::new(), directory);
//! let id = service.create(patient, clinician, series, config).await?;
//! service.begin(id).await?;
//! service.complete(id, result).await?;
//! let stats = service.get_statistics(&clinician).await?;
//! ```

mod file;
mod job;
mod memory;
mod service;
mod stats;
mod store;

pub use file::{FileJobStore, FilePatientDirectory};
pub use job::SegmentationJob;
pub use memory::{MemoryJobStore, MemoryPatientDirectory};
pub use service::JobService;
pub use stats::{ClassVolumeStats, DoctorStatistics, ExcludedJob, StatisticsAggregator};
pub use store::{
    JobListing, JobStore, LocalJobStore, LocalPatientDirectory, PatientDirectory, UnreadableRecord,
};
