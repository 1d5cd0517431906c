use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use printvault_core::models::tag::{Tag, TagId};

use super::{fmt_dt, parse_dt};

pub fn insert_tag(conn: &Connection, tag: &Tag) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO tags (id, name, usage_count, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            tag.id.0.to_string(),
            tag.name,
            tag.usage_count as i64,
            fmt_dt(&tag.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_tag_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, usage_count, created_at FROM tags WHERE name = ?1",
    )?;
    let tag = stmt.query_row(params![name], row_to_tag).optional()?;
    Ok(tag)
}

pub fn list_tags(conn: &Connection) -> anyhow::Result<Vec<Tag>> {
    let mut stmt =
        conn.prepare("SELECT id, name, usage_count, created_at FROM tags ORDER BY name")?;
    let rows = stmt.query_map([], row_to_tag)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Insert the junction row and bump usage_count, as one transaction. If the
/// assignment already exists nothing changes, including the counter.
pub fn assign_tag(conn: &Connection, checksum: &str, tag_id: &TagId) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let inserted = tx.execute(
        "INSERT OR IGNORE INTO file_tags (checksum, tag_id, assigned_at) VALUES (?1, ?2, ?3)",
        params![checksum, tag_id.0.to_string(), fmt_dt(&chrono::Utc::now())],
    )?;
    if inserted > 0 {
        tx.execute(
            "UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?1",
            params![tag_id.0.to_string()],
        )?;
    }
    tx.commit()?;
    Ok(inserted > 0)
}

/// Delete the junction row and drop usage_count (floored at zero), as one
/// transaction. A missing assignment leaves the counter untouched.
pub fn unassign_tag(conn: &Connection, checksum: &str, tag_id: &TagId) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let deleted = tx.execute(
        "DELETE FROM file_tags WHERE checksum = ?1 AND tag_id = ?2",
        params![checksum, tag_id.0.to_string()],
    )?;
    if deleted > 0 {
        tx.execute(
            "UPDATE tags SET usage_count = MAX(usage_count - 1, 0) WHERE id = ?1",
            params![tag_id.0.to_string()],
        )?;
    }
    tx.commit()?;
    Ok(deleted > 0)
}

pub fn list_tags_for_file(conn: &Connection, checksum: &str) -> anyhow::Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.usage_count, t.created_at
         FROM tags t JOIN file_tags ft ON ft.tag_id = t.id
         WHERE ft.checksum = ?1 ORDER BY t.name",
    )?;
    let rows = stmt.query_map(params![checksum], row_to_tag)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_checksums_for_tag(conn: &Connection, tag_id: &TagId) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT checksum FROM file_tags WHERE tag_id = ?1 ORDER BY assigned_at",
    )?;
    let rows = stmt.query_map(params![tag_id.0.to_string()], |row| row.get(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Delete a tag and all its assignments, as one transaction.
pub fn delete_tag(conn: &Connection, tag_id: &TagId) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM file_tags WHERE tag_id = ?1",
        params![tag_id.0.to_string()],
    )?;
    tx.execute("DELETE FROM tags WHERE id = ?1", params![tag_id.0.to_string()])?;
    tx.commit()?;
    Ok(())
}

/// Remove all assignments for a checksum, adjusting each tag's counter in the
/// same transaction. Used by the file-delete cascade.
pub fn unassign_all_for_checksum(conn: &Connection, checksum: &str) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE tags SET usage_count = MAX(usage_count - 1, 0)
         WHERE id IN (SELECT tag_id FROM file_tags WHERE checksum = ?1)",
        params![checksum],
    )?;
    tx.execute(
        "DELETE FROM file_tags WHERE checksum = ?1",
        params![checksum],
    )?;
    tx.commit()?;
    Ok(())
}

/// Actual live assignment count; used to verify the denormalized counter.
pub fn count_assignments(conn: &Connection, tag_id: &TagId) -> anyhow::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_tags WHERE tag_id = ?1",
        params![tag_id.0.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    let id_str: String = row.get(0)?;
    let usage: i64 = row.get(2)?;
    let created_str: String = row.get(3)?;
    Ok(Tag {
        id: TagId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        name: row.get(1)?,
        usage_count: usage as u32,
        created_at: parse_dt(&created_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;

    #[test]
    fn test_usage_count_tracks_assignments() {
        let conn = open_memory_db().unwrap();
        let tag = Tag::new("calibration".into());
        insert_tag(&conn, &tag).unwrap();

        assert!(assign_tag(&conn, "c1", &tag.id).unwrap());
        assert!(assign_tag(&conn, "c2", &tag.id).unwrap());
        // Repeat assignment is a no-op and must not bump the counter.
        assert!(!assign_tag(&conn, "c1", &tag.id).unwrap());

        let stored = get_tag_by_name(&conn, "calibration").unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
        assert_eq!(count_assignments(&conn, &tag.id).unwrap(), 2);

        assert!(unassign_tag(&conn, "c1", &tag.id).unwrap());
        assert!(!unassign_tag(&conn, "c1", &tag.id).unwrap());

        let stored = get_tag_by_name(&conn, "calibration").unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert_eq!(count_assignments(&conn, &tag.id).unwrap(), 1);
    }

    #[test]
    fn test_usage_count_never_negative() {
        let conn = open_memory_db().unwrap();
        let tag = Tag::new("misc".into());
        insert_tag(&conn, &tag).unwrap();

        unassign_tag(&conn, "c1", &tag.id).unwrap();
        let stored = get_tag_by_name(&conn, "misc").unwrap().unwrap();
        assert_eq!(stored.usage_count, 0);
    }

    #[test]
    fn test_delete_tag_cascades_assignments() {
        let conn = open_memory_db().unwrap();
        let tag = Tag::new("boats".into());
        insert_tag(&conn, &tag).unwrap();
        assign_tag(&conn, "c1", &tag.id).unwrap();

        delete_tag(&conn, &tag.id).unwrap();
        assert!(get_tag_by_name(&conn, "boats").unwrap().is_none());
        assert_eq!(count_assignments(&conn, &tag.id).unwrap(), 0);
    }

    #[test]
    fn test_unassign_all_for_checksum() {
        let conn = open_memory_db().unwrap();
        let a = Tag::new("a".into());
        let b = Tag::new("b".into());
        insert_tag(&conn, &a).unwrap();
        insert_tag(&conn, &b).unwrap();
        assign_tag(&conn, "c1", &a.id).unwrap();
        assign_tag(&conn, "c1", &b.id).unwrap();
        assign_tag(&conn, "c2", &a.id).unwrap();

        unassign_all_for_checksum(&conn, "c1").unwrap();

        assert_eq!(get_tag_by_name(&conn, "a").unwrap().unwrap().usage_count, 1);
        assert_eq!(get_tag_by_name(&conn, "b").unwrap().unwrap().usage_count, 0);
        assert_eq!(count_assignments(&conn, &a.id).unwrap(), 1);
    }
}
