use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use printvault_core::models::slicer::{
    ProfileId, ProfileType, SlicerConfig, SlicerId, SlicerProfile, SlicerType,
};

use super::{fmt_dt, parse_dt};

/// Insert a detected slicer, or refresh version/availability if the same
/// (type, executable) pair is already known. Returns the stored record.
pub fn upsert_slicer(conn: &Connection, slicer: &SlicerConfig) -> anyhow::Result<SlicerConfig> {
    conn.execute(
        "INSERT INTO slicers (id, slicer_type, executable, version, is_available, last_checked)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(slicer_type, executable) DO UPDATE SET
            version = excluded.version,
            is_available = excluded.is_available,
            last_checked = excluded.last_checked",
        params![
            slicer.id.0.to_string(),
            slicer.slicer_type.to_string(),
            slicer.executable.to_string_lossy().to_string(),
            slicer.version,
            slicer.is_available as i32,
            fmt_dt(&slicer.last_checked),
        ],
    )?;
    let stored = get_slicer_by_executable(conn, slicer.slicer_type, &slicer.executable)?
        .ok_or_else(|| anyhow::anyhow!("slicer row missing after upsert"))?;
    Ok(stored)
}

pub fn get_slicer_by_id(conn: &Connection, id: &SlicerId) -> anyhow::Result<Option<SlicerConfig>> {
    let mut stmt = conn.prepare(
        "SELECT id, slicer_type, executable, version, is_available, last_checked
         FROM slicers WHERE id = ?1",
    )?;
    let slicer = stmt
        .query_row(params![id.0.to_string()], row_to_slicer)
        .optional()?;
    Ok(slicer)
}

pub fn get_slicer_by_executable(
    conn: &Connection,
    slicer_type: SlicerType,
    executable: &std::path::Path,
) -> anyhow::Result<Option<SlicerConfig>> {
    let mut stmt = conn.prepare(
        "SELECT id, slicer_type, executable, version, is_available, last_checked
         FROM slicers WHERE slicer_type = ?1 AND executable = ?2",
    )?;
    let slicer = stmt
        .query_row(
            params![
                slicer_type.to_string(),
                executable.to_string_lossy().to_string()
            ],
            row_to_slicer,
        )
        .optional()?;
    Ok(slicer)
}

pub fn list_slicers(conn: &Connection) -> anyhow::Result<Vec<SlicerConfig>> {
    let mut stmt = conn.prepare(
        "SELECT id, slicer_type, executable, version, is_available, last_checked
         FROM slicers ORDER BY slicer_type",
    )?;
    let rows = stmt.query_map([], row_to_slicer)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Mark availability after a probe. Unavailable slicers are kept, never removed.
pub fn set_availability(
    conn: &Connection,
    id: &SlicerId,
    is_available: bool,
    version: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE slicers SET is_available = ?1, version = COALESCE(?2, version), last_checked = ?3
         WHERE id = ?4",
        params![
            is_available as i32,
            version,
            fmt_dt(&chrono::Utc::now()),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

/// Insert an imported profile, or refresh its settings on re-import of the
/// same (slicer, name, type).
pub fn upsert_profile(conn: &Connection, profile: &SlicerProfile) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO slicer_profiles (id, slicer_id, name, profile_type, settings, is_default, imported_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(slicer_id, name, profile_type) DO UPDATE SET
            settings = excluded.settings,
            imported_at = excluded.imported_at",
        params![
            profile.id.0.to_string(),
            profile.slicer_id.0.to_string(),
            profile.name,
            profile.profile_type.to_string(),
            profile.settings.to_string(),
            profile.is_default as i32,
            fmt_dt(&profile.imported_at),
        ],
    )?;
    Ok(())
}

pub fn get_profile_by_id(
    conn: &Connection,
    id: &ProfileId,
) -> anyhow::Result<Option<SlicerProfile>> {
    let mut stmt = conn.prepare(
        "SELECT id, slicer_id, name, profile_type, settings, is_default, imported_at
         FROM slicer_profiles WHERE id = ?1",
    )?;
    let profile = stmt
        .query_row(params![id.0.to_string()], row_to_profile)
        .optional()?;
    Ok(profile)
}

pub fn list_profiles_for_slicer(
    conn: &Connection,
    slicer_id: &SlicerId,
) -> anyhow::Result<Vec<SlicerProfile>> {
    let mut stmt = conn.prepare(
        "SELECT id, slicer_id, name, profile_type, settings, is_default, imported_at
         FROM slicer_profiles WHERE slicer_id = ?1 ORDER BY profile_type, name",
    )?;
    let rows = stmt.query_map(params![slicer_id.0.to_string()], row_to_profile)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Make a profile the default for its (slicer, type), clearing the previous
/// default in the same transaction.
pub fn set_default_profile(conn: &Connection, id: &ProfileId) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE slicer_profiles SET is_default = 0
         WHERE slicer_id = (SELECT slicer_id FROM slicer_profiles WHERE id = ?1)
           AND profile_type = (SELECT profile_type FROM slicer_profiles WHERE id = ?1)",
        params![id.0.to_string()],
    )?;
    tx.execute(
        "UPDATE slicer_profiles SET is_default = 1 WHERE id = ?1",
        params![id.0.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

fn row_to_slicer(row: &rusqlite::Row) -> rusqlite::Result<SlicerConfig> {
    let id_str: String = row.get(0)?;
    let type_str: String = row.get(1)?;
    let executable: String = row.get(2)?;
    let is_available: i32 = row.get(4)?;
    let checked_str: String = row.get(5)?;
    Ok(SlicerConfig {
        id: SlicerId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        slicer_type: type_str.parse().unwrap_or(SlicerType::PrusaSlicer),
        executable: executable.into(),
        version: row.get(3)?,
        is_available: is_available != 0,
        last_checked: parse_dt(&checked_str),
    })
}

fn row_to_profile(row: &rusqlite::Row) -> rusqlite::Result<SlicerProfile> {
    let id_str: String = row.get(0)?;
    let slicer_str: String = row.get(1)?;
    let type_str: String = row.get(3)?;
    let settings_str: String = row.get(4)?;
    let is_default: i32 = row.get(5)?;
    let imported_str: String = row.get(6)?;
    Ok(SlicerProfile {
        id: ProfileId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        slicer_id: SlicerId::from_uuid(Uuid::parse_str(&slicer_str).unwrap_or_default()),
        name: row.get(2)?,
        profile_type: type_str.parse().unwrap_or(ProfileType::Print),
        settings: serde_json::from_str(&settings_str).unwrap_or_default(),
        is_default: is_default != 0,
        imported_at: parse_dt(&imported_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;
    use serde_json::json;

    #[test]
    fn test_slicer_upsert_preserves_identity() {
        let conn = open_memory_db().unwrap();
        let slicer = SlicerConfig::new(SlicerType::PrusaSlicer, "/usr/bin/prusa-slicer".into());
        let first = upsert_slicer(&conn, &slicer).unwrap();

        let mut probe = SlicerConfig::new(SlicerType::PrusaSlicer, "/usr/bin/prusa-slicer".into());
        probe.version = Some("2.8.0".into());
        probe.is_available = true;
        let second = upsert_slicer(&conn, &probe).unwrap();

        // Same row, refreshed fields.
        assert_eq!(first.id, second.id);
        assert_eq!(second.version.as_deref(), Some("2.8.0"));
        assert!(second.is_available);
        assert_eq!(list_slicers(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_unavailable_slicer_is_kept() {
        let conn = open_memory_db().unwrap();
        let mut slicer = SlicerConfig::new(SlicerType::OrcaSlicer, "/opt/orca".into());
        slicer.is_available = true;
        let stored = upsert_slicer(&conn, &slicer).unwrap();

        set_availability(&conn, &stored.id, false, None).unwrap();
        let found = get_slicer_by_id(&conn, &stored.id).unwrap().unwrap();
        assert!(!found.is_available);
    }

    #[test]
    fn test_one_default_per_slicer_and_type() {
        let conn = open_memory_db().unwrap();
        let slicer = upsert_slicer(
            &conn,
            &SlicerConfig::new(SlicerType::PrusaSlicer, "/usr/bin/prusa-slicer".into()),
        )
        .unwrap();

        let quality = SlicerProfile::new(
            slicer.id.clone(),
            "0.2mm QUALITY".into(),
            ProfileType::Print,
            json!({"layer_height": "0.2"}),
        );
        let draft = SlicerProfile::new(
            slicer.id.clone(),
            "0.3mm DRAFT".into(),
            ProfileType::Print,
            json!({"layer_height": "0.3"}),
        );
        upsert_profile(&conn, &quality).unwrap();
        upsert_profile(&conn, &draft).unwrap();

        set_default_profile(&conn, &quality.id).unwrap();
        set_default_profile(&conn, &draft.id).unwrap();

        let profiles = list_profiles_for_slicer(&conn, &slicer.id).unwrap();
        let defaults: Vec<_> = profiles.iter().filter(|p| p.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name, "0.3mm DRAFT");
    }
}
