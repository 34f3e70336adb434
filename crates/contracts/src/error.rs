//! Layered error definitions
//!
//! Categorized by source: input / inference / internal invariant / job / config / storage.
//! Only `ErrorCategory` and a one-line message ever reach a persisted job record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ClinicianId, JobId, JobStatus, Modality, PatientId, Spacing};

/// Coarse failure category exposed to users of the job record interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected input volumes (never persisted as a failed job)
    Input,
    /// Classifier call failed or timed out
    Inference,
    /// Internal invariant violated, needs operator attention
    Internal,
    /// Job record interface misuse
    Job,
    /// Configuration problem
    Config,
    /// Artifact or record storage failure
    Storage,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Inference => "inference",
            Self::Internal => "internal",
            Self::Job => "job",
            Self::Config => "config",
            Self::Storage => "storage",
        };
        f.write_str(s)
    }
}

/// Input volume errors, reported before any job is created
#[derive(Debug, Error)]
pub enum InputError {
    /// Modalities disagree on shape or spacing
    #[error(
        "misaligned volumes: '{modality}' has shape {shape:?} spacing {spacing}, \
         expected shape {expected_shape:?} spacing {expected_spacing}"
    )]
    MisalignedVolumes {
        modality: Modality,
        shape: [usize; 3],
        spacing: Spacing,
        expected_shape: [usize; 3],
        expected_spacing: Spacing,
    },

    /// Referenced file could not be read or decoded
    #[error("unreadable volume for '{modality}' at {location}: {message}")]
    UnreadableVolume {
        modality: Modality,
        location: String,
        message: String,
    },

    /// Configured modality absent from the input set
    #[error("missing modality '{modality}' (expected {expected:?})")]
    MissingModality {
        modality: Modality,
        expected: Vec<Modality>,
    },

    /// Empty input set
    #[error("no volumes supplied")]
    NoVolumes,
}

impl InputError {
    /// Create an unreadable-volume error
    pub fn unreadable(
        modality: impl Into<Modality>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UnreadableVolume {
            modality: modality.into(),
            location: location.into(),
            message: message.into(),
        }
    }
}

/// Classifier invocation failures
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The backend reported an error for a window
    #[error("classifier '{classifier}' failed on window {window} after {attempts} attempt(s): {message}")]
    Backend {
        classifier: String,
        window: usize,
        attempts: u32,
        message: String,
    },

    /// The backend did not answer in time
    #[error("classifier '{classifier}' timed out on window {window} after {attempts} attempt(s) ({timeout_ms}ms each)")]
    Timeout {
        classifier: String,
        window: usize,
        attempts: u32,
        timeout_ms: u64,
    },

    /// The backend answered with an unexpected tensor shape
    #[error("classifier '{classifier}' returned shape {actual:?} for window {window}, expected {expected:?}")]
    ShapeMismatch {
        classifier: String,
        window: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The backend could not be reached or initialised
    #[error("classifier '{classifier}' unavailable: {message}")]
    Unavailable { classifier: String, message: String },

    /// The run was abandoned before all windows finished
    #[error("inference cancelled after {completed} of {total} window(s)")]
    Cancelled { completed: usize, total: usize },

    /// Normalized tensor does not match the classifier's declared channels
    #[error("classifier '{classifier}' expects {expected} input channel(s), got {actual}")]
    ChannelMismatch {
        classifier: String,
        expected: usize,
        actual: usize,
    },
}

/// Internal invariant violations: fatal for the run, surfaced to operators
#[derive(Debug, Error)]
pub enum InvariantViolation {
    /// A voxel carries a class id outside the taxonomy
    #[error("invalid class id {class_id} at voxel {voxel:?}")]
    InvalidClassId { class_id: usize, voxel: [usize; 3] },

    /// Job-level and patient-level clinician references diverged
    #[error(
        "ownership mismatch for job {job_id}: job clinician '{job_clinician}', \
         patient clinician '{patient_clinician}'"
    )]
    OwnershipMismatch {
        job_id: JobId,
        job_clinician: ClinicianId,
        patient_clinician: ClinicianId,
    },
}

/// Job record interface errors
#[derive(Debug, Error)]
pub enum JobError {
    /// No such job
    #[error("job {0} not found")]
    NotFound(JobId),

    /// Patient not registered in the directory
    #[error("patient '{0}' not found")]
    UnknownPatient(PatientId),

    /// Patient has no assigned clinician, so ownership could never be resolved
    #[error("patient '{0}' has no assigned clinician")]
    OrphanJob(PatientId),

    /// Requested clinician disagrees with the patient's assignment
    #[error(
        "clinician '{requested}' does not match patient '{patient_id}' assigned clinician '{assigned}'"
    )]
    ClinicianMismatch {
        patient_id: PatientId,
        requested: ClinicianId,
        assigned: ClinicianId,
    },

    /// Result requested before the job completed
    #[error("job {job_id} has no result yet (status: {status})")]
    NotReady { job_id: JobId, status: JobStatus },

    /// Validation attempted by someone other than the assigned clinician
    #[error("clinician '{clinician_id}' is not the owner of job {job_id}")]
    NotOwner {
        job_id: JobId,
        clinician_id: ClinicianId,
    },

    /// Transition not allowed from the current state
    #[error("job {job_id} cannot move from {from} to {to}")]
    WrongState {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// Underlying record storage failed
    #[error("job store error: {0}")]
    Store(String),
}

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Pipeline Errors =====
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("internal invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error(transparent)]
    Job(#[from] JobError),

    // ===== Storage Errors =====
    /// Artifact write error
    #[error("artifact '{artifact}' write error: {message}")]
    Artifact { artifact: String, message: String },

    /// Event sink error
    #[error("sink '{sink_name}' error: {message}")]
    Sink { sink_name: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create artifact write error
    pub fn artifact(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Artifact {
            artifact: artifact.into(),
            message: message.into(),
        }
    }

    /// Create sink error
    pub fn sink(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sink {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Category used for user-facing failure reporting
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } => ErrorCategory::Config,
            Self::Input(_) => ErrorCategory::Input,
            Self::Inference(_) => ErrorCategory::Inference,
            Self::Invariant(_) => ErrorCategory::Internal,
            Self::Job(JobError::Store(_)) => ErrorCategory::Storage,
            Self::Job(_) => ErrorCategory::Job,
            Self::Artifact { .. } | Self::Sink { .. } | Self::Io(_) => ErrorCategory::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let input: ContractError = InputError::NoVolumes.into();
        assert_eq!(input.category(), ErrorCategory::Input);

        let internal: ContractError = InvariantViolation::InvalidClassId {
            class_id: 7,
            voxel: [0, 1, 2],
        }
        .into();
        assert_eq!(internal.category(), ErrorCategory::Internal);

        let store: ContractError = JobError::Store("disk full".into()).into();
        assert_eq!(store.category(), ErrorCategory::Storage);

        let artifact = ContractError::artifact("metrics.json", "denied");
        assert_eq!(artifact.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_messages_are_single_line() {
        let err = InputError::MissingModality {
            modality: "flair".into(),
            expected: vec!["t1".into(), "flair".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("flair"));
        assert!(!msg.contains('\n'));
    }
}
