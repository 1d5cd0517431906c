use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use printvault_core::models::collection::{Collection, CollectionId, CollectionMember};

use super::{fmt_dt, parse_dt};

pub fn insert_collection(conn: &Connection, collection: &Collection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO collections (id, name, description, thumbnail_checksum, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            collection.id.0.to_string(),
            collection.name,
            collection.description,
            collection.thumbnail_checksum,
            fmt_dt(&collection.created_at),
            fmt_dt(&collection.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_collection_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<Collection>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, thumbnail_checksum, created_at, updated_at
         FROM collections WHERE name = ?1",
    )?;
    let collection = stmt.query_row(params![name], row_to_collection).optional()?;
    Ok(collection)
}

pub fn get_collection_by_id(
    conn: &Connection,
    id: &CollectionId,
) -> anyhow::Result<Option<Collection>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, thumbnail_checksum, created_at, updated_at
         FROM collections WHERE id = ?1",
    )?;
    let collection = stmt
        .query_row(params![id.0.to_string()], row_to_collection)
        .optional()?;
    Ok(collection)
}

pub fn list_collections(conn: &Connection) -> anyhow::Result<Vec<Collection>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, thumbnail_checksum, created_at, updated_at
         FROM collections ORDER BY name",
    )?;
    let rows = stmt.query_map([], row_to_collection)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn add_member(
    conn: &Connection,
    collection_id: &CollectionId,
    checksum: &str,
    sort_order: i64,
) -> anyhow::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO collection_members (collection_id, checksum, sort_order, added_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            collection_id.0.to_string(),
            checksum,
            sort_order,
            fmt_dt(&chrono::Utc::now()),
        ],
    )?;
    Ok(inserted > 0)
}

pub fn remove_member(
    conn: &Connection,
    collection_id: &CollectionId,
    checksum: &str,
) -> anyhow::Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM collection_members WHERE collection_id = ?1 AND checksum = ?2",
        params![collection_id.0.to_string(), checksum],
    )?;
    Ok(deleted > 0)
}

pub fn list_members(
    conn: &Connection,
    collection_id: &CollectionId,
) -> anyhow::Result<Vec<CollectionMember>> {
    let mut stmt = conn.prepare(
        "SELECT collection_id, checksum, sort_order, added_at
         FROM collection_members WHERE collection_id = ?1 ORDER BY sort_order, added_at",
    )?;
    let rows = stmt.query_map(params![collection_id.0.to_string()], |row| {
        let id_str: String = row.get(0)?;
        let added_str: String = row.get(3)?;
        Ok(CollectionMember {
            collection_id: CollectionId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
            checksum: row.get(1)?,
            sort_order: row.get(2)?,
            added_at: parse_dt(&added_str),
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn set_thumbnail(
    conn: &Connection,
    collection_id: &CollectionId,
    checksum: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE collections SET thumbnail_checksum = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            checksum,
            fmt_dt(&chrono::Utc::now()),
            collection_id.0.to_string(),
        ],
    )?;
    Ok(())
}

/// Clear thumbnail references to a checksum across all collections. Deleting a
/// referenced file clears the reference instead of blocking the delete.
pub fn clear_thumbnail_references(conn: &Connection, checksum: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE collections SET thumbnail_checksum = NULL, updated_at = ?1
         WHERE thumbnail_checksum = ?2",
        params![fmt_dt(&chrono::Utc::now()), checksum],
    )?;
    Ok(())
}

pub fn remove_member_everywhere(conn: &Connection, checksum: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM collection_members WHERE checksum = ?1",
        params![checksum],
    )?;
    Ok(())
}

/// Delete a collection and its memberships, as one transaction.
pub fn delete_collection(conn: &Connection, collection_id: &CollectionId) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM collection_members WHERE collection_id = ?1",
        params![collection_id.0.to_string()],
    )?;
    tx.execute(
        "DELETE FROM collections WHERE id = ?1",
        params![collection_id.0.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;
    Ok(Collection {
        id: CollectionId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        name: row.get(1)?,
        description: row.get(2)?,
        thumbnail_checksum: row.get(3)?,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;

    #[test]
    fn test_collection_crud_and_ordering() {
        let conn = open_memory_db().unwrap();
        let collection = Collection::new("boats".into(), Some("benchy variants".into()));
        insert_collection(&conn, &collection).unwrap();

        add_member(&conn, &collection.id, "c2", 1).unwrap();
        add_member(&conn, &collection.id, "c1", 0).unwrap();
        // Repeat add is a no-op.
        assert!(!add_member(&conn, &collection.id, "c1", 5).unwrap());

        let members = list_members(&conn, &collection.id).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].checksum, "c1");
        assert_eq!(members[1].checksum, "c2");

        delete_collection(&conn, &collection.id).unwrap();
        assert!(get_collection_by_name(&conn, "boats").unwrap().is_none());
        assert!(list_members(&conn, &collection.id).unwrap().is_empty());
    }

    #[test]
    fn test_thumbnail_cleared_not_cascaded() {
        let conn = open_memory_db().unwrap();
        let collection = Collection::new("boats".into(), None);
        insert_collection(&conn, &collection).unwrap();
        add_member(&conn, &collection.id, "c1", 0).unwrap();
        set_thumbnail(&conn, &collection.id, Some("c1")).unwrap();

        clear_thumbnail_references(&conn, "c1").unwrap();

        let stored = get_collection_by_id(&conn, &collection.id).unwrap().unwrap();
        assert!(stored.thumbnail_checksum.is_none());
        // Collection itself survives.
        assert_eq!(stored.name, "boats");
    }
}
