//! VolumeStore trait - imaging storage interface

use crate::{ImagingVolume, InputError, VolumeKey};

/// Read-only access to key-addressed imaging volumes
///
/// Reads are blocking; callers run them off the async executor.
pub trait VolumeStore: Send + Sync {
    /// Store name (used for logging)
    fn name(&self) -> &str;

    /// Read and decode one modality
    ///
    /// # Errors
    /// `InputError::UnreadableVolume` when the key is absent or undecodable
    fn read(&self, key: &VolumeKey) -> Result<ImagingVolume, InputError>;
}
