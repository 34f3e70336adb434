//! Job record data model
//!
//! Identifiers, lifecycle status, failure reports, lifecycle events and the
//! result payload. The state machine itself lives in the `jobs` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{
    CombinationRule, Connectivity, ErrorCategory, Modality, SegmentationMetrics, WindowSpec,
};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Patient identifier
    PatientId
);
string_id!(
    /// Clinician identifier
    ClinicianId
);
string_id!(
    /// Imaging series identifier
    SeriesId
);

/// Segmentation job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Validated,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Validated,
    ];

    /// No pipeline transition leaves this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Validated)
    }

    /// Metrics are attached in this state
    pub fn has_result(self) -> bool {
        matches!(self, Self::Completed | Self::Validated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Validated => "validated",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded on a failed job: category plus a one-line reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl JobFailure {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        let message: String = message.into();
        // keep records single-line
        let message = message.lines().next().unwrap_or_default().to_string();
        Self { category, message }
    }
}

/// Input configuration a job was run with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub modalities: Vec<Modality>,
    pub window: WindowSpec,
    pub combination: CombinationRule,
    pub min_component_voxels: u64,
    pub connectivity: Connectivity,
    pub classifier: String,
}

/// Patient record as far as ownership is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    /// Responsible clinician; `None` means the patient cannot own jobs yet
    #[serde(default)]
    pub assigned_clinician: Option<ClinicianId>,
}

impl Patient {
    pub fn new(id: impl Into<PatientId>, clinician: Option<ClinicianId>) -> Self {
        Self {
            id: id.into(),
            assigned_clinician: clinician,
        }
    }
}

/// Locations of the persisted artifacts of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub folder: PathBuf,
    pub mask: PathBuf,
    pub metrics: PathBuf,
    #[serde(default)]
    pub summary: Option<PathBuf>,
}

/// Payload attached on completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub metrics: SegmentationMetrics,
    pub artifacts: ArtifactRef,
}

/// Lifecycle notification emitted on every transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    pub status: JobStatus,
    pub at: DateTime<Utc>,
    /// Failure reason, validating clinician, total volume...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_status_flags() {
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Validated.has_result());
        assert!(!JobStatus::Failed.has_result());
    }

    #[test]
    fn test_failure_keeps_first_line() {
        let failure = JobFailure::new(ErrorCategory::Inference, "timeout\nstack frame 1");
        assert_eq!(failure.message, "timeout");
    }

    #[test]
    fn test_string_id_serde_transparent() {
        let id = ClinicianId::from("dr-house");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"dr-house\"");
    }
}
