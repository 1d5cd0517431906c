use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use printvault_core::error::VaultError;
use printvault_core::models::file::{
    DownloadStatus, FileId, FileMetadata, FileStatus, FileType, LibraryFile,
};

use super::{fmt_dt, fmt_dt_opt, parse_dt, parse_dt_opt};

const FILE_COLUMNS: &str = "id, checksum, filename, display_name, library_path, file_size, file_type, \
     status, download_status, is_duplicate, duplicate_of_checksum, duplicate_count, \
     width_mm, depth_mm, height_mm, layer_height_mm, nozzle_temp_c, bed_temp_c, \
     filament_grams, filament_meters, print_time_seconds, estimated_cost, complexity_score, \
     thumbnail_path, last_analyzed, error_message, created_at, updated_at";

pub fn insert_file(conn: &Connection, file: &LibraryFile) -> anyhow::Result<()> {
    conn.execute(
        &format!("INSERT INTO library_files ({FILE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)"),
        params![
            file.id.0.to_string(),
            file.checksum,
            file.filename,
            file.display_name,
            file.library_path.to_string_lossy().to_string(),
            file.file_size as i64,
            file.file_type.to_string(),
            file.status.to_string(),
            file.download_status.map(|s| s.to_string()),
            file.is_duplicate as i32,
            file.duplicate_of_checksum,
            file.duplicate_count as i64,
            file.metadata.width_mm,
            file.metadata.depth_mm,
            file.metadata.height_mm,
            file.metadata.layer_height_mm,
            file.metadata.nozzle_temp_c,
            file.metadata.bed_temp_c,
            file.metadata.filament_grams,
            file.metadata.filament_meters,
            file.metadata.print_time_seconds.map(|s| s as i64),
            file.metadata.estimated_cost,
            file.metadata.complexity_score,
            file.metadata.thumbnail_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            fmt_dt_opt(&file.last_analyzed),
            file.error_message,
            fmt_dt(&file.created_at),
            fmt_dt(&file.updated_at),
        ],
    )?;
    Ok(())
}

/// Insert a duplicate row and increment the canonical row's duplicate_count,
/// as one transaction. Refuses to run if no canonical row exists for the
/// checksum; a duplicate without a canonical counterpart is a bug.
pub fn insert_duplicate(conn: &Connection, file: &LibraryFile) -> anyhow::Result<()> {
    if !file.is_duplicate || file.duplicate_of_checksum.is_none() {
        return Err(VaultError::Conflict {
            message: format!("insert_duplicate called with non-duplicate row {}", file.id),
        }
        .into());
    }
    let canonical = file.duplicate_of_checksum.as_deref().unwrap_or_default();

    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE library_files SET duplicate_count = duplicate_count + 1, updated_at = ?1
         WHERE checksum = ?2 AND is_duplicate = 0",
        params![fmt_dt(&chrono::Utc::now()), canonical],
    )?;
    if updated == 0 {
        return Err(VaultError::Conflict {
            message: format!("no canonical row for checksum {canonical}"),
        }
        .into());
    }
    insert_file(&tx, file)?;
    tx.commit()?;
    Ok(())
}

pub fn get_canonical_by_checksum(
    conn: &Connection,
    checksum: &str,
) -> anyhow::Result<Option<LibraryFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM library_files WHERE checksum = ?1 AND is_duplicate = 0"
    ))?;
    let file = stmt
        .query_row(params![checksum], row_to_file)
        .optional()?;
    Ok(file)
}

pub fn get_file_by_id(conn: &Connection, id: &FileId) -> anyhow::Result<Option<LibraryFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM library_files WHERE id = ?1"
    ))?;
    let file = stmt
        .query_row(params![id.0.to_string()], row_to_file)
        .optional()?;
    Ok(file)
}

pub fn list_files(conn: &Connection) -> anyhow::Result<Vec<LibraryFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM library_files ORDER BY created_at"
    ))?;
    let rows = stmt.query_map([], row_to_file)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_duplicates_of(conn: &Connection, checksum: &str) -> anyhow::Result<Vec<LibraryFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM library_files
         WHERE duplicate_of_checksum = ?1 AND is_duplicate = 1 ORDER BY created_at"
    ))?;
    let rows = stmt.query_map(params![checksum], row_to_file)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn filename_exists(conn: &Connection, filename: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM library_files WHERE filename = ?1",
        params![filename],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn set_status(conn: &Connection, checksum: &str, status: FileStatus) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE library_files SET status = ?1, updated_at = ?2 WHERE checksum = ?3 AND is_duplicate = 0",
        params![status.to_string(), fmt_dt(&chrono::Utc::now()), checksum],
    )?;
    Ok(())
}

pub fn set_display_name(conn: &Connection, id: &FileId, name: Option<&str>) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE library_files SET display_name = ?1, updated_at = ?2 WHERE id = ?3",
        params![name, fmt_dt(&chrono::Utc::now()), id.0.to_string()],
    )?;
    Ok(())
}

/// Store extractor output on the canonical row and stamp last_analyzed.
pub fn record_metadata(
    conn: &Connection,
    checksum: &str,
    metadata: &FileMetadata,
) -> anyhow::Result<()> {
    let now = fmt_dt(&chrono::Utc::now());
    conn.execute(
        "UPDATE library_files SET
            width_mm = ?1, depth_mm = ?2, height_mm = ?3, layer_height_mm = ?4,
            nozzle_temp_c = ?5, bed_temp_c = ?6, filament_grams = ?7, filament_meters = ?8,
            print_time_seconds = ?9, estimated_cost = ?10, complexity_score = ?11,
            thumbnail_path = ?12, last_analyzed = ?13, status = 'ready',
            error_message = NULL, updated_at = ?13
         WHERE checksum = ?14 AND is_duplicate = 0",
        params![
            metadata.width_mm,
            metadata.depth_mm,
            metadata.height_mm,
            metadata.layer_height_mm,
            metadata.nozzle_temp_c,
            metadata.bed_temp_c,
            metadata.filament_grams,
            metadata.filament_meters,
            metadata.print_time_seconds.map(|s| s as i64),
            metadata.estimated_cost,
            metadata.complexity_score,
            metadata.thumbnail_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            now,
            checksum,
        ],
    )?;
    Ok(())
}

/// Mark extraction as failed; the file stays usable for slicing and download.
pub fn record_extraction_error(
    conn: &Connection,
    checksum: &str,
    message: &str,
) -> anyhow::Result<()> {
    let now = fmt_dt(&chrono::Utc::now());
    conn.execute(
        "UPDATE library_files SET status = 'error', error_message = ?1, last_analyzed = ?2, updated_at = ?2
         WHERE checksum = ?3 AND is_duplicate = 0",
        params![message, now, checksum],
    )?;
    Ok(())
}

/// Delete a duplicate row and decrement its canonical row's duplicate_count
/// (floored at zero), as one transaction.
pub fn delete_duplicate(conn: &Connection, file: &LibraryFile) -> anyhow::Result<()> {
    let canonical = file.duplicate_of_checksum.as_deref().unwrap_or_default();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM library_files WHERE id = ?1",
        params![file.id.0.to_string()],
    )?;
    tx.execute(
        "UPDATE library_files SET duplicate_count = MAX(duplicate_count - 1, 0), updated_at = ?1
         WHERE checksum = ?2 AND is_duplicate = 0",
        params![fmt_dt(&chrono::Utc::now()), canonical],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn delete_file_row(conn: &Connection, id: &FileId) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM library_files WHERE id = ?1",
        params![id.0.to_string()],
    )?;
    Ok(())
}

pub fn count_files(conn: &Connection) -> anyhow::Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM library_files", [], |row| row.get(0))?;
    Ok(count as u64)
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<LibraryFile> {
    let id_str: String = row.get(0)?;
    let file_type_str: String = row.get(6)?;
    let status_str: String = row.get(7)?;
    let download_str: Option<String> = row.get(8)?;
    let is_duplicate: i32 = row.get(9)?;
    let library_path: String = row.get(4)?;
    let size: i64 = row.get(5)?;
    let dup_count: i64 = row.get(11)?;
    let print_time: Option<i64> = row.get(20)?;
    let thumbnail: Option<String> = row.get(23)?;
    let last_analyzed: Option<String> = row.get(24)?;
    let created_str: String = row.get(26)?;
    let updated_str: String = row.get(27)?;

    Ok(LibraryFile {
        id: FileId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        checksum: row.get(1)?,
        filename: row.get(2)?,
        display_name: row.get(3)?,
        library_path: library_path.into(),
        file_size: size as u64,
        file_type: file_type_str.parse().unwrap_or(FileType::Other),
        status: status_str.parse().unwrap_or(FileStatus::Available),
        download_status: download_str.and_then(|s| s.parse::<DownloadStatus>().ok()),
        is_duplicate: is_duplicate != 0,
        duplicate_of_checksum: row.get(10)?,
        duplicate_count: dup_count as u32,
        metadata: FileMetadata {
            width_mm: row.get(12)?,
            depth_mm: row.get(13)?,
            height_mm: row.get(14)?,
            layer_height_mm: row.get(15)?,
            nozzle_temp_c: row.get(16)?,
            bed_temp_c: row.get(17)?,
            filament_grams: row.get(18)?,
            filament_meters: row.get(19)?,
            print_time_seconds: print_time.map(|s| s as u64),
            estimated_cost: row.get(21)?,
            complexity_score: row.get(22)?,
            thumbnail_path: thumbnail.map(Into::into),
        },
        last_analyzed: parse_dt_opt(last_analyzed),
        error_message: row.get(25)?,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;

    fn sample_file(checksum: &str, filename: &str) -> LibraryFile {
        LibraryFile::new_canonical(
            checksum.to_string(),
            filename.to_string(),
            format!("/library/{filename}").into(),
            128,
            FileType::Stl,
        )
    }

    #[test]
    fn test_file_crud() {
        let conn = open_memory_db().unwrap();
        let file = sample_file("c1", "benchy.stl");
        insert_file(&conn, &file).unwrap();

        let found = get_canonical_by_checksum(&conn, "c1").unwrap().unwrap();
        assert_eq!(found.filename, "benchy.stl");
        assert!(!found.is_duplicate);
        assert_eq!(found.duplicate_count, 0);

        assert!(filename_exists(&conn, "benchy.stl").unwrap());
        assert!(!filename_exists(&conn, "other.stl").unwrap());

        delete_file_row(&conn, &file.id).unwrap();
        assert!(get_canonical_by_checksum(&conn, "c1").unwrap().is_none());
    }

    #[test]
    fn test_canonical_unique_per_checksum() {
        let conn = open_memory_db().unwrap();
        insert_file(&conn, &sample_file("c1", "a.stl")).unwrap();
        let second = sample_file("c1", "b.stl");
        assert!(insert_file(&conn, &second).is_err());
    }

    #[test]
    fn test_duplicate_increments_canonical() {
        let conn = open_memory_db().unwrap();
        insert_file(&conn, &sample_file("c1", "a.stl")).unwrap();

        let dup = LibraryFile::new_duplicate(
            "c1".into(),
            "a_1.stl".into(),
            "/library/a_1.stl".into(),
            128,
            FileType::Stl,
        );
        insert_duplicate(&conn, &dup).unwrap();

        let canonical = get_canonical_by_checksum(&conn, "c1").unwrap().unwrap();
        assert_eq!(canonical.duplicate_count, 1);
        assert_eq!(list_duplicates_of(&conn, "c1").unwrap().len(), 1);

        let stored = get_file_by_id(&conn, &dup.id).unwrap().unwrap();
        delete_duplicate(&conn, &stored).unwrap();
        let canonical = get_canonical_by_checksum(&conn, "c1").unwrap().unwrap();
        assert_eq!(canonical.duplicate_count, 0);
    }

    #[test]
    fn test_duplicate_without_canonical_is_conflict() {
        let conn = open_memory_db().unwrap();
        let dup = LibraryFile::new_duplicate(
            "missing".into(),
            "a_1.stl".into(),
            "/library/a_1.stl".into(),
            128,
            FileType::Stl,
        );
        let err = insert_duplicate(&conn, &dup).unwrap_err();
        assert!(err.to_string().contains("no canonical row"));
        assert_eq!(count_files(&conn).unwrap(), 0);
    }

    #[test]
    fn test_record_metadata_marks_ready() {
        let conn = open_memory_db().unwrap();
        insert_file(&conn, &sample_file("c1", "a.stl")).unwrap();

        let metadata = FileMetadata {
            width_mm: Some(60.0),
            print_time_seconds: Some(5400),
            ..Default::default()
        };
        record_metadata(&conn, "c1", &metadata).unwrap();

        let found = get_canonical_by_checksum(&conn, "c1").unwrap().unwrap();
        assert_eq!(found.status, FileStatus::Ready);
        assert_eq!(found.metadata.width_mm, Some(60.0));
        assert_eq!(found.metadata.print_time_seconds, Some(5400));
        assert!(found.last_analyzed.is_some());
    }

    #[test]
    fn test_extraction_error_does_not_lose_row() {
        let conn = open_memory_db().unwrap();
        insert_file(&conn, &sample_file("c1", "a.stl")).unwrap();
        record_extraction_error(&conn, "c1", "unparseable mesh").unwrap();

        let found = get_canonical_by_checksum(&conn, "c1").unwrap().unwrap();
        assert_eq!(found.status, FileStatus::Error);
        assert_eq!(found.error_message.as_deref(), Some("unparseable mesh"));
    }
}
