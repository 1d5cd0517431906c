use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{fmt_dt, parse_dt};

/// Cached hashes for a watched-folder entry. Valid while (size, mtime) match.
#[derive(Debug, Clone)]
pub struct ScanCacheEntry {
    pub folder: String,
    pub rel_path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub xxh3_hash: String,
    pub sha256_hash: String,
    pub cached_at: DateTime<Utc>,
}

impl ScanCacheEntry {
    pub fn is_valid(&self, size: u64, mtime: DateTime<Utc>) -> bool {
        self.size == size && self.mtime == mtime
    }
}

pub fn upsert_scan_cache(conn: &Connection, entry: &ScanCacheEntry) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO scan_cache (folder, rel_path, size, mtime, xxh3_hash, sha256_hash, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.folder,
            entry.rel_path,
            entry.size as i64,
            fmt_dt(&entry.mtime),
            entry.xxh3_hash,
            entry.sha256_hash,
            fmt_dt(&entry.cached_at),
        ],
    )?;
    Ok(())
}

pub fn get_scan_cache_entry(
    conn: &Connection,
    folder: &str,
    rel_path: &str,
) -> anyhow::Result<Option<ScanCacheEntry>> {
    let mut stmt = conn.prepare(
        "SELECT folder, rel_path, size, mtime, xxh3_hash, sha256_hash, cached_at
         FROM scan_cache WHERE folder = ?1 AND rel_path = ?2",
    )?;
    let entry = stmt
        .query_row(params![folder, rel_path], |row| {
            let size: i64 = row.get(2)?;
            let mtime_str: String = row.get(3)?;
            let cached_str: String = row.get(6)?;
            Ok(ScanCacheEntry {
                folder: row.get(0)?,
                rel_path: row.get(1)?,
                size: size as u64,
                mtime: parse_dt(&mtime_str),
                xxh3_hash: row.get(4)?,
                sha256_hash: row.get(5)?,
                cached_at: parse_dt(&cached_str),
            })
        })
        .optional()?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;

    #[test]
    fn test_scan_cache_roundtrip() {
        let conn = open_memory_db().unwrap();
        let entry = ScanCacheEntry {
            folder: "/watch".into(),
            rel_path: "benchy.stl".into(),
            size: 42,
            mtime: Utc::now(),
            xxh3_hash: "aa".into(),
            sha256_hash: "bb".into(),
            cached_at: Utc::now(),
        };
        upsert_scan_cache(&conn, &entry).unwrap();

        let found = get_scan_cache_entry(&conn, "/watch", "benchy.stl")
            .unwrap()
            .unwrap();
        assert!(found.is_valid(42, entry.mtime));
        assert!(!found.is_valid(43, entry.mtime));
    }
}
