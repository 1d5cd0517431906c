use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of place content was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Downloaded from a network printer.
    Printer,
    /// Discovered in a watched folder.
    WatchFolder,
    /// Uploaded manually.
    Upload,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Printer => write!(f, "printer"),
            SourceType::WatchFolder => write!(f, "watch_folder"),
            SourceType::Upload => write!(f, "upload"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "printer" => Ok(SourceType::Printer),
            "watch_folder" | "watch-folder" | "folder" => Ok(SourceType::WatchFolder),
            "upload" => Ok(SourceType::Upload),
            _ => Err(format!("unknown source type: {s}")),
        }
    }
}

/// A place a given content digest was observed. Many sources may point at the
/// same checksum; that is a re-observation of the same stored content, not a
/// duplicate (a duplicate is a second distinct stored copy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub checksum: String,
    pub source_type: SourceType,
    /// Identifier of the source instance (printer id, folder path, uploader).
    pub source_id: String,
    /// Path of the content as seen at the source.
    pub original_path: String,
    pub discovered_at: DateTime<Utc>,
    /// Source-specific extras (e.g. printer job name).
    pub metadata: Option<serde_json::Value>,
}

impl FileSource {
    pub fn new(
        checksum: String,
        source_type: SourceType,
        source_id: String,
        original_path: String,
    ) -> Self {
        Self {
            checksum,
            source_type,
            source_id,
            original_path,
            discovered_at: Utc::now(),
            metadata: None,
        }
    }
}
