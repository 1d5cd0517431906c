use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a library file record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing status of a library file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Ingested, not yet analyzed.
    Available,
    /// Metadata extraction in progress.
    Processing,
    /// Metadata extraction finished.
    Ready,
    /// Metadata extraction failed.
    Error,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Available => write!(f, "available"),
            FileStatus::Processing => write!(f, "processing"),
            FileStatus::Ready => write!(f, "ready"),
            FileStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(FileStatus::Available),
            "processing" => Ok(FileStatus::Processing),
            "ready" => Ok(FileStatus::Ready),
            "error" => Ok(FileStatus::Error),
            _ => Err(format!("unknown file status: {s}")),
        }
    }
}

/// Download progress for files still being fetched from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::Pending => write!(f, "pending"),
            DownloadStatus::Downloading => write!(f, "downloading"),
            DownloadStatus::Completed => write!(f, "completed"),
            DownloadStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DownloadStatus::Pending),
            "downloading" => Ok(DownloadStatus::Downloading),
            "completed" => Ok(DownloadStatus::Completed),
            "failed" => Ok(DownloadStatus::Failed),
            _ => Err(format!("unknown download status: {s}")),
        }
    }
}

/// Recognized file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Stl,
    Obj,
    ThreeMf,
    Step,
    Gcode,
    Bgcode,
    Other,
}

impl FileType {
    /// Guess the file type from a filename extension.
    pub fn from_extension(filename: &str) -> Self {
        let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        match ext.as_str() {
            "stl" => FileType::Stl,
            "obj" => FileType::Obj,
            "3mf" => FileType::ThreeMf,
            "step" | "stp" => FileType::Step,
            "gcode" | "gco" => FileType::Gcode,
            "bgcode" => FileType::Bgcode,
            _ => FileType::Other,
        }
    }

    /// Whether this type is a printable artifact rather than a model.
    pub fn is_gcode(&self) -> bool {
        matches!(self, FileType::Gcode | FileType::Bgcode)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Stl => write!(f, "stl"),
            FileType::Obj => write!(f, "obj"),
            FileType::ThreeMf => write!(f, "3mf"),
            FileType::Step => write!(f, "step"),
            FileType::Gcode => write!(f, "gcode"),
            FileType::Bgcode => write!(f, "bgcode"),
            FileType::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stl" => Ok(FileType::Stl),
            "obj" => Ok(FileType::Obj),
            "3mf" => Ok(FileType::ThreeMf),
            "step" => Ok(FileType::Step),
            "gcode" => Ok(FileType::Gcode),
            "bgcode" => Ok(FileType::Bgcode),
            "other" => Ok(FileType::Other),
            _ => Err(format!("unknown file type: {s}")),
        }
    }
}

/// Metadata produced by the external extractor. All fields are optional;
/// whatever the extractor returns is stored as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Model bounding box in millimeters.
    pub width_mm: Option<f64>,
    pub depth_mm: Option<f64>,
    pub height_mm: Option<f64>,
    pub layer_height_mm: Option<f64>,
    pub nozzle_temp_c: Option<f64>,
    pub bed_temp_c: Option<f64>,
    pub filament_grams: Option<f64>,
    pub filament_meters: Option<f64>,
    pub print_time_seconds: Option<u64>,
    pub estimated_cost: Option<f64>,
    pub complexity_score: Option<f64>,
    pub thumbnail_path: Option<PathBuf>,
}

/// One stored copy in the library. Canonical rows (`is_duplicate == false`)
/// are unique per checksum; duplicate rows carry the same checksum and point
/// at the canonical row via `duplicate_of_checksum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryFile {
    pub id: FileId,
    /// SHA-256 content digest, hex encoded. Immutable once assigned.
    pub checksum: String,
    pub filename: String,
    /// User-editable name; does not affect identity.
    pub display_name: Option<String>,
    pub library_path: PathBuf,
    pub file_size: u64,
    pub file_type: FileType,
    pub status: FileStatus,
    pub download_status: Option<DownloadStatus>,
    pub is_duplicate: bool,
    /// Set only on duplicate rows; always resolves to a canonical row in one hop.
    pub duplicate_of_checksum: Option<String>,
    /// Maintained only on canonical rows.
    pub duplicate_count: u32,
    pub metadata: FileMetadata,
    pub last_analyzed: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LibraryFile {
    /// Create a new canonical entry for a checksum seen for the first time.
    pub fn new_canonical(
        checksum: String,
        filename: String,
        library_path: PathBuf,
        file_size: u64,
        file_type: FileType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: FileId::new(),
            checksum,
            filename,
            display_name: None,
            library_path,
            file_size,
            file_type,
            status: FileStatus::Available,
            download_status: None,
            is_duplicate: false,
            duplicate_of_checksum: None,
            duplicate_count: 0,
            metadata: FileMetadata::default(),
            last_analyzed: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a duplicate entry: a second physical copy of existing content.
    pub fn new_duplicate(
        checksum: String,
        filename: String,
        library_path: PathBuf,
        file_size: u64,
        file_type: FileType,
    ) -> Self {
        let mut file = Self::new_canonical(
            checksum.clone(),
            filename,
            library_path,
            file_size,
            file_type,
        );
        file.is_duplicate = true;
        file.duplicate_of_checksum = Some(checksum);
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("benchy.stl"), FileType::Stl);
        assert_eq!(FileType::from_extension("BENCHY.STL"), FileType::Stl);
        assert_eq!(FileType::from_extension("part.3mf"), FileType::ThreeMf);
        assert_eq!(FileType::from_extension("part.gco"), FileType::Gcode);
        assert_eq!(FileType::from_extension("notes.txt"), FileType::Other);
    }

    #[test]
    fn test_status_roundtrip() {
        for s in ["available", "processing", "ready", "error"] {
            let parsed: FileStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_new_duplicate_points_at_canonical() {
        let dup = LibraryFile::new_duplicate(
            "abc".into(),
            "part_1.stl".into(),
            "/lib/part_1.stl".into(),
            42,
            FileType::Stl,
        );
        assert!(dup.is_duplicate);
        assert_eq!(dup.duplicate_of_checksum.as_deref(), Some("abc"));
        assert_eq!(dup.duplicate_count, 0);
    }
}
