use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::slicer::{ProfileId, SlicerId};

/// Unique identifier for a slicing job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slicing job state machine:
/// queued -> running -> completed | failed, with running -> queued on retry
/// and queued|running -> cancelled. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("unknown job status: {s}")),
        }
    }
}

/// The scheduler's unit of work: slice one library model with one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicingJob {
    pub id: JobId,
    /// Checksum of the model to slice.
    pub checksum: String,
    pub slicer_id: SlicerId,
    pub profile_id: ProfileId,
    /// Target printer for auto-upload, if any.
    pub printer_id: Option<String>,
    pub status: JobStatus,
    /// Higher runs first; ties broken by earliest creation.
    pub priority: i32,
    /// 0..=100.
    pub progress: u8,
    pub retry_count: u32,
    pub auto_upload: bool,
    pub auto_start: bool,
    pub output_file_path: Option<PathBuf>,
    pub output_gcode_checksum: Option<String>,
    pub error_message: Option<String>,
    pub estimated_print_time_seconds: Option<u64>,
    pub estimated_filament_grams: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SlicingJob {
    pub fn new(checksum: String, slicer_id: SlicerId, profile_id: ProfileId) -> Self {
        Self {
            id: JobId::new(),
            checksum,
            slicer_id,
            profile_id,
            printer_id: None,
            status: JobStatus::Queued,
            priority: 0,
            progress: 0,
            retry_count: 0,
            auto_upload: false,
            auto_start: false,
            output_file_path: None,
            output_gcode_checksum: None,
            error_message: None,
            estimated_print_time_seconds: None,
            estimated_filament_grams: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_printer(mut self, printer_id: String, auto_upload: bool, auto_start: bool) -> Self {
        self.printer_id = Some(printer_id);
        self.auto_upload = auto_upload;
        self.auto_start = auto_start;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        for s in ["queued", "running", "completed", "failed", "cancelled"] {
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }
}
