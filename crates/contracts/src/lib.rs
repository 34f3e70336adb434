//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Conventions
//! - Spatial axes are `[x, y, z]`; stacked tensors are `(C, X, Y, Z)`
//! - Spacing is in millimetres, reported volumes in cm³
//! - Ownership of a job is resolved through its patient's assigned clinician

mod blueprint;
mod classifier;
mod error;
mod job;
mod modality;
mod segment;
mod sink;
mod store;
mod taxonomy;
mod volume;

pub use blueprint::*;
pub use classifier::*;
pub use error::*;
pub use job::*;
pub use modality::Modality;
pub use segment::*;
pub use sink::*;
pub use store::VolumeStore;
pub use taxonomy::*;
pub use volume::*;
