use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::job::{JobId, SlicingJob};

/// Typed lifecycle events consumed by the external notification dispatcher.
/// Events are immutable records; delivery to external channels is entirely the
/// dispatcher's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobStarted,
    JobCompleted,
    JobFailed,
    JobPaused,
    PrinterOnline,
    PrinterOffline,
    PrinterError,
    MaterialLowStock,
    FileDownloaded,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::JobStarted => write!(f, "job_started"),
            EventKind::JobCompleted => write!(f, "job_completed"),
            EventKind::JobFailed => write!(f, "job_failed"),
            EventKind::JobPaused => write!(f, "job_paused"),
            EventKind::PrinterOnline => write!(f, "printer_online"),
            EventKind::PrinterOffline => write!(f, "printer_offline"),
            EventKind::PrinterError => write!(f, "printer_error"),
            EventKind::MaterialLowStock => write!(f, "material_low_stock"),
            EventKind::FileDownloaded => write!(f, "file_downloaded"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job_started" => Ok(EventKind::JobStarted),
            "job_completed" => Ok(EventKind::JobCompleted),
            "job_failed" => Ok(EventKind::JobFailed),
            "job_paused" => Ok(EventKind::JobPaused),
            "printer_online" => Ok(EventKind::PrinterOnline),
            "printer_offline" => Ok(EventKind::PrinterOffline),
            "printer_error" => Ok(EventKind::PrinterError),
            "material_low_stock" => Ok(EventKind::MaterialLowStock),
            "file_downloaded" => Ok(EventKind::FileDownloaded),
            _ => Err(format!("unknown event kind: {s}")),
        }
    }
}

/// One emitted event: kind + serialized payload + timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn job_started(job: &SlicingJob) -> Self {
        Self::new(
            EventKind::JobStarted,
            json!({
                "job_id": job.id.to_string(),
                "checksum": job.checksum,
                "priority": job.priority,
                "retry_count": job.retry_count,
            }),
        )
    }

    pub fn job_completed(job: &SlicingJob) -> Self {
        Self::new(
            EventKind::JobCompleted,
            json!({
                "job_id": job.id.to_string(),
                "checksum": job.checksum,
                "output_gcode_checksum": job.output_gcode_checksum,
                "estimated_print_time_seconds": job.estimated_print_time_seconds,
            }),
        )
    }

    pub fn job_failed(job_id: &JobId, error: &str) -> Self {
        Self::new(
            EventKind::JobFailed,
            json!({
                "job_id": job_id.to_string(),
                "error": error,
            }),
        )
    }

    pub fn job_paused(job_id: &JobId) -> Self {
        Self::new(EventKind::JobPaused, json!({ "job_id": job_id.to_string() }))
    }

    pub fn printer_online(printer_id: &str) -> Self {
        Self::new(EventKind::PrinterOnline, json!({ "printer_id": printer_id }))
    }

    pub fn printer_offline(printer_id: &str) -> Self {
        Self::new(
            EventKind::PrinterOffline,
            json!({ "printer_id": printer_id }),
        )
    }

    pub fn printer_error(printer_id: &str, error: &str) -> Self {
        Self::new(
            EventKind::PrinterError,
            json!({ "printer_id": printer_id, "error": error }),
        )
    }

    pub fn material_low_stock(material: &str, remaining_grams: f64) -> Self {
        Self::new(
            EventKind::MaterialLowStock,
            json!({ "material": material, "remaining_grams": remaining_grams }),
        )
    }

    pub fn file_downloaded(checksum: &str, source_id: &str) -> Self {
        Self::new(
            EventKind::FileDownloaded,
            json!({ "checksum": checksum, "source_id": source_id }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip() {
        for s in [
            "job_started",
            "job_completed",
            "job_failed",
            "job_paused",
            "printer_online",
            "printer_offline",
            "printer_error",
            "material_low_stock",
            "file_downloaded",
        ] {
            let parsed: EventKind = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_job_failed_payload() {
        let id = JobId::new();
        let event = Event::job_failed(&id, "boom");
        assert_eq!(event.kind, EventKind::JobFailed);
        assert_eq!(event.payload["error"], "boom");
    }
}
