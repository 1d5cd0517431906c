use rusqlite::Connection;

use printvault_core::error::VaultError;
use printvault_core::models::collection::{Collection, CollectionId};
use printvault_core::models::file::{FileId, LibraryFile};
use printvault_core::models::tag::{Tag, TagId};
use printvault_db::ops;

/// Get or create a tag by name.
pub fn ensure_tag(conn: &Connection, name: &str) -> anyhow::Result<Tag> {
    if let Some(tag) = ops::tags::get_tag_by_name(conn, name)? {
        return Ok(tag);
    }
    let tag = Tag::new(name.to_string());
    ops::tags::insert_tag(conn, &tag)?;
    Ok(tag)
}

pub fn assign_tag(conn: &Connection, checksum: &str, tag_id: &TagId) -> anyhow::Result<bool> {
    ops::tags::assign_tag(conn, checksum, tag_id)
}

pub fn unassign_tag(conn: &Connection, checksum: &str, tag_id: &TagId) -> anyhow::Result<bool> {
    ops::tags::unassign_tag(conn, checksum, tag_id)
}

pub fn delete_tag(conn: &Connection, name: &str) -> anyhow::Result<()> {
    let tag = ops::tags::get_tag_by_name(conn, name)?.ok_or_else(|| VaultError::TagNotFound {
        name: name.to_string(),
    })?;
    ops::tags::delete_tag(conn, &tag.id)
}

pub fn create_collection(
    conn: &Connection,
    name: &str,
    description: Option<String>,
) -> anyhow::Result<Collection> {
    let collection = Collection::new(name.to_string(), description);
    ops::collections::insert_collection(conn, &collection)?;
    Ok(collection)
}

pub fn add_member(
    conn: &Connection,
    collection_id: &CollectionId,
    checksum: &str,
    sort_order: i64,
) -> anyhow::Result<bool> {
    ops::collections::add_member(conn, collection_id, checksum, sort_order)
}

pub fn remove_member(
    conn: &Connection,
    collection_id: &CollectionId,
    checksum: &str,
) -> anyhow::Result<bool> {
    ops::collections::remove_member(conn, collection_id, checksum)
}

/// Designate a member's checksum as the collection thumbnail source.
pub fn set_collection_thumbnail(
    conn: &Connection,
    collection_id: &CollectionId,
    checksum: &str,
) -> anyhow::Result<()> {
    ops::collections::set_thumbnail(conn, collection_id, Some(checksum))
}

pub fn delete_collection(conn: &Connection, name: &str) -> anyhow::Result<()> {
    let collection = ops::collections::get_collection_by_name(conn, name)?.ok_or_else(|| {
        VaultError::CollectionNotFound {
            name: name.to_string(),
        }
    })?;
    ops::collections::delete_collection(conn, &collection.id)
}

/// Orchestrated cascading delete of a library file. Dependents go first, in a
/// fixed order, so partial failure is controlled rather than left to storage
/// cascade semantics:
///   1. duplicate rows: just unlink and decrement the canonical counter;
///   2. canonical rows with live duplicates are refused;
///   3. canonical rows: tag assignments (counters adjusted), collection
///      memberships, thumbnail references (cleared, not cascaded), sources,
///      job history for the checksum, then the row itself.
/// The stored file is removed from disk last, best effort.
pub fn delete_file(conn: &Connection, file_id: &FileId) -> anyhow::Result<LibraryFile> {
    let file = ops::files::get_file_by_id(conn, file_id)?.ok_or_else(|| {
        VaultError::FileNotFound {
            checksum: file_id.to_string(),
        }
    })?;

    if file.is_duplicate {
        ops::files::delete_duplicate(conn, &file)?;
        remove_from_disk(&file);
        return Ok(file);
    }

    if file.duplicate_count > 0 {
        return Err(VaultError::Conflict {
            message: format!(
                "cannot delete canonical file {} with {} live duplicates",
                file.checksum, file.duplicate_count
            ),
        }
        .into());
    }

    ops::tags::unassign_all_for_checksum(conn, &file.checksum)?;
    ops::collections::remove_member_everywhere(conn, &file.checksum)?;
    ops::collections::clear_thumbnail_references(conn, &file.checksum)?;
    ops::sources::delete_sources_for_checksum(conn, &file.checksum)?;
    ops::jobs::delete_jobs_for_checksum(conn, &file.checksum)?;
    ops::files::delete_file_row(conn, &file.id)?;

    remove_from_disk(&file);
    tracing::info!(checksum = %file.checksum, "deleted library file");
    Ok(file)
}

fn remove_from_disk(file: &LibraryFile) {
    if file.library_path.exists() {
        if let Err(e) = std::fs::remove_file(&file.library_path) {
            tracing::warn!(
                path = %file.library_path.display(),
                error = %e,
                "failed to remove stored file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{ingest, IngestOutcome, IngestRequest, SourceDescriptor};
    use printvault_core::models::file::FileType;
    use printvault_core::models::source::SourceType;
    use printvault_db::open_memory_db;

    fn ingest_simple(conn: &Connection, checksum: &str, filename: &str) -> LibraryFile {
        let outcome = ingest(
            conn,
            IngestRequest {
                checksum: checksum.into(),
                filename: filename.into(),
                library_path: format!("/library/{filename}").into(),
                file_size: 64,
                file_type: FileType::Stl,
                source: SourceDescriptor::new(SourceType::Upload, "cli", filename),
                physical_copy: false,
            },
        )
        .unwrap();
        outcome.file().clone()
    }

    fn ingest_copy(conn: &Connection, checksum: &str, filename: &str) -> LibraryFile {
        let outcome = ingest(
            conn,
            IngestRequest {
                checksum: checksum.into(),
                filename: filename.into(),
                library_path: format!("/library/{filename}").into(),
                file_size: 64,
                file_type: FileType::Stl,
                source: SourceDescriptor::new(SourceType::Upload, "cli", filename),
                physical_copy: true,
            },
        )
        .unwrap();
        match outcome {
            IngestOutcome::Duplicate(f) => f,
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_tag_reuses_existing() {
        let conn = open_memory_db().unwrap();
        let a = ensure_tag(&conn, "boats").unwrap();
        let b = ensure_tag(&conn, "boats").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_delete_file_cascades_and_clears_thumbnail() {
        let conn = open_memory_db().unwrap();
        let file = ingest_simple(&conn, "c1", "benchy.stl");

        let tag = ensure_tag(&conn, "boats").unwrap();
        assign_tag(&conn, "c1", &tag.id).unwrap();

        let collection = create_collection(&conn, "favorites", None).unwrap();
        add_member(&conn, &collection.id, "c1", 0).unwrap();
        set_collection_thumbnail(&conn, &collection.id, "c1").unwrap();

        delete_file(&conn, &file.id).unwrap();

        // Junctions gone, counter adjusted, thumbnail cleared, collection kept.
        let tag = ops::tags::get_tag_by_name(&conn, "boats").unwrap().unwrap();
        assert_eq!(tag.usage_count, 0);
        assert!(ops::collections::list_members(&conn, &collection.id)
            .unwrap()
            .is_empty());
        let collection = ops::collections::get_collection_by_id(&conn, &collection.id)
            .unwrap()
            .unwrap();
        assert!(collection.thumbnail_checksum.is_none());
        assert_eq!(ops::sources::count_sources(&conn, "c1").unwrap(), 0);
        assert_eq!(ops::files::count_files(&conn).unwrap(), 0);
    }

    #[test]
    fn test_delete_canonical_with_duplicates_refused() {
        let conn = open_memory_db().unwrap();
        let canonical = ingest_simple(&conn, "c1", "benchy.stl");
        let dup = ingest_copy(&conn, "c1", "benchy.stl");

        let err = delete_file(&conn, &canonical.id).unwrap_err();
        assert!(err.to_string().contains("live duplicates"));

        // Deleting the duplicate first unblocks the canonical row.
        delete_file(&conn, &dup.id).unwrap();
        let canonical_row = ops::files::get_canonical_by_checksum(&conn, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(canonical_row.duplicate_count, 0);
        delete_file(&conn, &canonical.id).unwrap();
        assert_eq!(ops::files::count_files(&conn).unwrap(), 0);
    }
}
