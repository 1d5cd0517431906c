use rusqlite::{params, Connection};

use printvault_core::models::source::{FileSource, SourceType};

use super::{fmt_dt, parse_dt};

/// Record a source observation. Idempotent on the uniqueness tuple: calling
/// twice with the same (checksum, type, id, path) is a no-op, not an error.
/// Returns whether a new row was inserted.
pub fn record_source(conn: &Connection, source: &FileSource) -> anyhow::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO file_sources (checksum, source_type, source_id, original_path, discovered_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            source.checksum,
            source.source_type.to_string(),
            source.source_id,
            source.original_path,
            fmt_dt(&source.discovered_at),
            source.metadata.as_ref().map(|m| m.to_string()),
        ],
    )?;
    Ok(inserted > 0)
}

pub fn list_sources_for_checksum(
    conn: &Connection,
    checksum: &str,
) -> anyhow::Result<Vec<FileSource>> {
    let mut stmt = conn.prepare(
        "SELECT checksum, source_type, source_id, original_path, discovered_at, metadata
         FROM file_sources WHERE checksum = ?1 ORDER BY discovered_at",
    )?;
    let rows = stmt.query_map(params![checksum], |row| {
        let type_str: String = row.get(1)?;
        let discovered_str: String = row.get(4)?;
        let metadata_str: Option<String> = row.get(5)?;
        Ok(FileSource {
            checksum: row.get(0)?,
            source_type: type_str.parse().unwrap_or(SourceType::Upload),
            source_id: row.get(2)?,
            original_path: row.get(3)?,
            discovered_at: parse_dt(&discovered_str),
            metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete_sources_for_checksum(conn: &Connection, checksum: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM file_sources WHERE checksum = ?1",
        params![checksum],
    )?;
    Ok(())
}

pub fn count_sources(conn: &Connection, checksum: &str) -> anyhow::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_sources WHERE checksum = ?1",
        params![checksum],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;

    #[test]
    fn test_record_source_idempotent() {
        let conn = open_memory_db().unwrap();
        let source = FileSource::new(
            "c1".into(),
            SourceType::Printer,
            "printer_1".into(),
            "/usb/benchy.stl".into(),
        );

        assert!(record_source(&conn, &source).unwrap());
        assert!(!record_source(&conn, &source).unwrap());
        assert_eq!(count_sources(&conn, "c1").unwrap(), 1);
    }

    #[test]
    fn test_distinct_sources_accumulate() {
        let conn = open_memory_db().unwrap();
        let printer = FileSource::new(
            "c1".into(),
            SourceType::Printer,
            "printer_1".into(),
            "/usb/benchy.stl".into(),
        );
        let folder = FileSource::new(
            "c1".into(),
            SourceType::WatchFolder,
            "/watch".into(),
            "benchy.stl".into(),
        );
        record_source(&conn, &printer).unwrap();
        record_source(&conn, &folder).unwrap();

        let sources = list_sources_for_checksum(&conn, "c1").unwrap();
        assert_eq!(sources.len(), 2);
    }
}
