//! # Ingestion
//!
//! Imaging input stage.
//!
//! Responsibilities:
//! - Decode / encode NIfTI-1 volumes (`.nii`, `.nii.gz`)
//! - Resolve `(patient, series, modality)` keys against a filesystem store
//! - Load one job's co-registered series and reject misaligned input
//! - Normalize intensities into the model-ready channel stack
//! - Generate synthetic phantoms for tests and demos
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{Normalizer, VolumeLoader};
//!
//! let loader = VolumeLoader::new(store, blueprint.loader.spacing_tolerance_mm);
//! let volumes = loader.load(&inputs)?;
//! let normalizer = Normalizer::new(blueprint.normalization.clone(), blueprint.loader.modalities.clone());
//! let tensor = normalizer.normalize(&volumes)?;
//! ```

mod error;
mod loader;
pub mod nifti;
mod normalize;
mod phantom;
mod store;

// Re-exports
pub use error::{NiftiError, Result};
pub use loader::VolumeLoader;
pub use normalize::Normalizer;
pub use phantom::{Phantom, PhantomConfig};
pub use store::FsVolumeStore;
