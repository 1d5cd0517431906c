use rusqlite::Connection;
use std::path::{Path, PathBuf};

use printvault_core::events::Event;
use printvault_core::models::file::{FileMetadata, FileStatus, FileType, LibraryFile};
use printvault_core::models::source::{FileSource, SourceType};
use printvault_db::ops;

use crate::hasher;

/// Where content was observed, as reported by the ingesting collaborator.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub source_type: SourceType,
    pub source_id: String,
    pub original_path: String,
    pub metadata: Option<serde_json::Value>,
}

impl SourceDescriptor {
    pub fn new(source_type: SourceType, source_id: &str, original_path: &str) -> Self {
        Self {
            source_type,
            source_id: source_id.to_string(),
            original_path: original_path.to_string(),
            metadata: None,
        }
    }
}

/// A fully described ingestion: identity plus location, no file I/O implied.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub checksum: String,
    pub filename: String,
    pub library_path: PathBuf,
    pub file_size: u64,
    pub file_type: FileType,
    pub source: SourceDescriptor,
    /// Caller intent: a new physical copy was made (duplicate), as opposed to
    /// re-observing the same stored content (new source).
    pub physical_copy: bool,
}

/// Classification result of one ingestion.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// First time this checksum was seen; a canonical row was created.
    New(LibraryFile),
    /// Known content re-observed from a (possibly new) source; no copy made.
    NewSource(LibraryFile),
    /// A second physical copy was stored and linked to the canonical row.
    Duplicate(LibraryFile),
}

impl IngestOutcome {
    pub fn file(&self) -> &LibraryFile {
        match self {
            IngestOutcome::New(f) | IngestOutcome::NewSource(f) | IngestOutcome::Duplicate(f) => f,
        }
    }
}

/// Ingest an identity record. Establishes identity and location only;
/// metadata extraction is a separate asynchronous step.
pub fn ingest(conn: &Connection, req: IngestRequest) -> anyhow::Result<IngestOutcome> {
    let existing = ops::files::get_canonical_by_checksum(conn, &req.checksum)?;

    let source = FileSource {
        checksum: req.checksum.clone(),
        source_type: req.source.source_type,
        source_id: req.source.source_id.clone(),
        original_path: req.source.original_path.clone(),
        discovered_at: chrono::Utc::now(),
        metadata: req.source.metadata.clone(),
    };

    match existing {
        None => {
            let filename = resolve_filename(conn, &req.filename)?;
            let file = LibraryFile::new_canonical(
                req.checksum.clone(),
                filename,
                req.library_path,
                req.file_size,
                req.file_type,
            );
            ops::files::insert_file(conn, &file)?;
            ops::sources::record_source(conn, &source)?;
            if req.source.source_type == SourceType::Printer {
                ops::events::insert_event(
                    conn,
                    &Event::file_downloaded(&req.checksum, &req.source.source_id),
                )?;
            }
            tracing::info!(checksum = %req.checksum, filename = %file.filename, "ingested new file");
            Ok(IngestOutcome::New(file))
        }
        Some(canonical) if !req.physical_copy => {
            // Same stored content re-observed: merge the source, no new row.
            let inserted = ops::sources::record_source(conn, &source)?;
            if inserted {
                tracing::debug!(checksum = %req.checksum, source = %source.source_id, "recorded new source");
            }
            // Re-read so duplicate_count and friends are current.
            let canonical = ops::files::get_canonical_by_checksum(conn, &req.checksum)?
                .unwrap_or(canonical);
            Ok(IngestOutcome::NewSource(canonical))
        }
        Some(_) => {
            let filename = resolve_filename(conn, &req.filename)?;
            let file = LibraryFile::new_duplicate(
                req.checksum.clone(),
                filename,
                req.library_path,
                req.file_size,
                req.file_type,
            );
            ops::files::insert_duplicate(conn, &file)?;
            ops::sources::record_source(conn, &source)?;
            tracing::info!(checksum = %req.checksum, filename = %file.filename, "linked duplicate copy");
            Ok(IngestOutcome::Duplicate(file))
        }
    }
}

/// Hash a file on disk, copy it into the library root, and ingest it.
pub fn ingest_path(
    conn: &Connection,
    library_root: &Path,
    path: &Path,
    source: SourceDescriptor,
    physical_copy: bool,
) -> anyhow::Result<IngestOutcome> {
    let checksum = hasher::sha256_file(path)?;
    let file_size = std::fs::metadata(path)?.len();
    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("path has no filename: {}", path.display()))?;
    let file_type = FileType::from_extension(&original_name);

    // Re-observation of known content needs no copy at all.
    if !physical_copy {
        if let Some(canonical) = ops::files::get_canonical_by_checksum(conn, &checksum)? {
            return ingest(
                conn,
                IngestRequest {
                    checksum,
                    filename: canonical.filename.clone(),
                    library_path: canonical.library_path.clone(),
                    file_size,
                    file_type,
                    source,
                    physical_copy: false,
                },
            );
        }
    }

    let filename = resolve_filename(conn, &original_name)?;
    let library_path = library_root.join(&filename);
    atomic_copy(path, &library_path)?;

    ingest(
        conn,
        IngestRequest {
            checksum,
            filename,
            library_path,
            file_size,
            file_type,
            source,
            physical_copy,
        },
    )
}

/// Mark a file as undergoing metadata extraction.
pub fn begin_analysis(conn: &Connection, checksum: &str) -> anyhow::Result<()> {
    ops::files::set_status(conn, checksum, FileStatus::Processing)
}

/// Store extractor output. Absence of any individual field (thumbnail
/// included) is not an error.
pub fn record_metadata(
    conn: &Connection,
    checksum: &str,
    metadata: &FileMetadata,
) -> anyhow::Result<()> {
    ops::files::record_metadata(conn, checksum, metadata)
}

/// Record an extraction failure. The file stays sliceable and downloadable.
pub fn record_extraction_error(
    conn: &Connection,
    checksum: &str,
    message: &str,
) -> anyhow::Result<()> {
    tracing::warn!(checksum, message, "metadata extraction failed");
    ops::files::record_extraction_error(conn, checksum, message)
}

/// Resolve a filename collision by suffixing (`_1`, `_2`, ...). Data is never
/// silently overwritten.
fn resolve_filename(conn: &Connection, filename: &str) -> anyhow::Result<String> {
    if !ops::files::filename_exists(conn, filename)? {
        return Ok(filename.to_string());
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (filename, None),
    };
    let mut n = 1u32;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        if !ops::files::filename_exists(conn, &candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Atomic file copy: write to a temp file in the target directory, then rename.
pub(crate) fn atomic_copy(src: &Path, dst: &Path) -> anyhow::Result<()> {
    if !src.exists() {
        anyhow::bail!("source file does not exist: {}", src.display());
    }

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let parent = dst.parent().unwrap_or(Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(parent)?;
    std::fs::copy(src, temp.path())?;
    temp.persist(dst)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use printvault_db::open_memory_db;
    use tempfile::TempDir;

    fn request(checksum: &str, filename: &str, source: SourceDescriptor) -> IngestRequest {
        IngestRequest {
            checksum: checksum.into(),
            filename: filename.into(),
            library_path: format!("/library/{filename}").into(),
            file_size: 64,
            file_type: FileType::Stl,
            source,
            physical_copy: false,
        }
    }

    fn printer_source() -> SourceDescriptor {
        SourceDescriptor::new(SourceType::Printer, "printer_1", "/usb/benchy.stl")
    }

    fn folder_source() -> SourceDescriptor {
        SourceDescriptor::new(SourceType::WatchFolder, "/watch", "benchy.stl")
    }

    #[test]
    fn test_ingest_then_reobserve_then_copy() {
        let conn = open_memory_db().unwrap();

        // First ingestion: one canonical row, one source.
        let outcome = ingest(&conn, request("c1", "benchy.stl", printer_source())).unwrap();
        assert!(matches!(outcome, IngestOutcome::New(_)));
        assert!(!outcome.file().is_duplicate);
        assert_eq!(ops::sources::count_sources(&conn, "c1").unwrap(), 1);

        // Same bytes from a different source: still one row, two sources,
        // duplicate_count unchanged.
        let outcome = ingest(&conn, request("c1", "benchy.stl", folder_source())).unwrap();
        assert!(matches!(outcome, IngestOutcome::NewSource(_)));
        assert_eq!(outcome.file().duplicate_count, 0);
        assert_eq!(ops::files::count_files(&conn).unwrap(), 1);
        assert_eq!(ops::sources::count_sources(&conn, "c1").unwrap(), 2);

        // Explicit physical copy: duplicate row, canonical counter bumped.
        let mut req = request("c1", "benchy.stl", folder_source());
        req.physical_copy = true;
        let outcome = ingest(&conn, req).unwrap();
        let dup = match outcome {
            IngestOutcome::Duplicate(f) => f,
            other => panic!("expected duplicate, got {other:?}"),
        };
        assert!(dup.is_duplicate);
        assert_eq!(dup.duplicate_of_checksum.as_deref(), Some("c1"));
        assert_eq!(dup.filename, "benchy_1.stl");

        let canonical = ops::files::get_canonical_by_checksum(&conn, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(canonical.duplicate_count, 1);
    }

    #[test]
    fn test_reobservation_is_idempotent() {
        let conn = open_memory_db().unwrap();
        ingest(&conn, request("c1", "benchy.stl", printer_source())).unwrap();
        ingest(&conn, request("c1", "benchy.stl", printer_source())).unwrap();
        ingest(&conn, request("c1", "benchy.stl", printer_source())).unwrap();

        assert_eq!(ops::files::count_files(&conn).unwrap(), 1);
        assert_eq!(ops::sources::count_sources(&conn, "c1").unwrap(), 1);
    }

    #[test]
    fn test_filename_collision_suffixing() {
        let conn = open_memory_db().unwrap();
        ingest(&conn, request("c1", "part.stl", printer_source())).unwrap();
        // Different content, same filename.
        let outcome = ingest(&conn, request("c2", "part.stl", folder_source())).unwrap();
        assert_eq!(outcome.file().filename, "part_1.stl");
        let outcome = ingest(&conn, request("c3", "part.stl", folder_source())).unwrap();
        assert_eq!(outcome.file().filename, "part_2.stl");
    }

    #[test]
    fn test_ingest_path_identical_bytes_one_canonical() {
        let conn = open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library = dir.path().join("library");

        let f1 = dir.path().join("a.stl");
        let f2 = dir.path().join("b.stl");
        std::fs::write(&f1, "solid benchy").unwrap();
        std::fs::write(&f2, "solid benchy").unwrap();

        let o1 = ingest_path(&conn, &library, &f1, printer_source(), false).unwrap();
        let o2 = ingest_path(&conn, &library, &f2, folder_source(), false).unwrap();

        assert!(matches!(o1, IngestOutcome::New(_)));
        assert!(matches!(o2, IngestOutcome::NewSource(_)));
        assert_eq!(o1.file().checksum, o2.file().checksum);
        assert_eq!(ops::files::count_files(&conn).unwrap(), 1);
        assert!(o1.file().library_path.exists());
    }

    #[test]
    fn test_ingest_path_physical_copy_creates_duplicate_file() {
        let conn = open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library = dir.path().join("library");

        let f = dir.path().join("benchy.stl");
        std::fs::write(&f, "solid benchy").unwrap();

        ingest_path(&conn, &library, &f, printer_source(), false).unwrap();
        let outcome = ingest_path(&conn, &library, &f, folder_source(), true).unwrap();

        let dup = outcome.file();
        assert!(dup.is_duplicate);
        assert_eq!(dup.filename, "benchy_1.stl");
        assert!(library.join("benchy_1.stl").exists());
    }

    #[test]
    fn test_metadata_lifecycle() {
        let conn = open_memory_db().unwrap();
        ingest(&conn, request("c1", "benchy.stl", printer_source())).unwrap();

        begin_analysis(&conn, "c1").unwrap();
        let file = ops::files::get_canonical_by_checksum(&conn, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(file.status, FileStatus::Processing);

        record_metadata(
            &conn,
            "c1",
            &FileMetadata {
                height_mm: Some(48.0),
                ..Default::default()
            },
        )
        .unwrap();
        let file = ops::files::get_canonical_by_checksum(&conn, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(file.status, FileStatus::Ready);
        assert_eq!(file.metadata.height_mm, Some(48.0));
    }
}
