use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::path::Path;

use printvault_core::error::VaultError;
use printvault_core::models::slicer::{ProfileType, SlicerId, SlicerProfile};
use printvault_db::ops;

/// Result of one profile import batch. Malformed presets land in `skipped`
/// with a reason; they never abort the batch.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<SlicerProfile>,
    pub skipped: Vec<String>,
}

/// Import native preset files into the normalized profile schema. `path` may
/// be a single `.ini` file or a directory of them. Re-importing an existing
/// (slicer, name, type) refreshes its settings in place.
pub fn import_profiles(
    conn: &Connection,
    slicer_id: &SlicerId,
    path: &Path,
) -> anyhow::Result<ImportReport> {
    ops::slicers::get_slicer_by_id(conn, slicer_id)?.ok_or_else(|| VaultError::SlicerNotFound {
        id: slicer_id.to_string(),
    })?;

    let mut report = ImportReport::default();
    if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "ini").unwrap_or(false))
            .collect();
        entries.sort();
        for entry in entries {
            import_one(conn, slicer_id, &entry, &mut report);
        }
    } else {
        import_one(conn, slicer_id, path, &mut report);
    }

    tracing::info!(
        imported = report.imported.len(),
        skipped = report.skipped.len(),
        "profile import finished"
    );
    Ok(report)
}

fn import_one(conn: &Connection, slicer_id: &SlicerId, path: &Path, report: &mut ImportReport) {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            report.skipped.push(format!("{}: {e}", path.display()));
            return;
        }
    };

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "preset".to_string());

    for parsed in parse_preset(&content, &stem) {
        match parsed {
            Ok((name, profile_type, settings)) => {
                let profile = SlicerProfile::new(slicer_id.clone(), name, profile_type, settings);
                match ops::slicers::upsert_profile(conn, &profile) {
                    Ok(()) => report.imported.push(profile),
                    Err(e) => report.skipped.push(format!("{}: {e}", path.display())),
                }
            }
            Err(reason) => report.skipped.push(format!("{}: {reason}", path.display())),
        }
    }
}

type ParsedPreset = Result<(String, ProfileType, Value), String>;

/// Parse one preset file. Sectioned files (config bundles exported by the
/// slicer) yield one profile per `[type:Name]` section; flat files yield a
/// single profile named after the file, with its type inferred from the keys
/// present.
fn parse_preset(content: &str, fallback_name: &str) -> Vec<ParsedPreset> {
    let mut out = Vec::new();
    let mut current: Option<(String, ProfileType)> = None;
    let mut settings = Map::new();
    let mut flat = Map::new();
    let mut sectioned = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sectioned = true;
            if let Some((name, profile_type)) = current.take() {
                out.push(Ok((name, profile_type, Value::Object(settings))));
                settings = Map::new();
            }
            match parse_section_header(header) {
                Some(pair) => current = Some(pair),
                None => out.push(Err(format!("unrecognized section [{header}]"))),
            }
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            if !sectioned {
                return vec![Err(format!("not a key = value line: {line:?}"))];
            }
            continue;
        };
        let key = key.trim().to_string();
        let value = json!(value.trim());
        if current.is_some() {
            settings.insert(key, value);
        } else {
            flat.insert(key, value);
        }
    }

    if let Some((name, profile_type)) = current {
        out.push(Ok((name, profile_type, Value::Object(settings))));
    }

    if !sectioned {
        if flat.is_empty() {
            return vec![Err("empty preset".to_string())];
        }
        let profile_type = infer_type(&flat);
        out.push(Ok((
            fallback_name.to_string(),
            profile_type,
            Value::Object(flat),
        )));
    }

    out
}

fn parse_section_header(header: &str) -> Option<(String, ProfileType)> {
    let (kind, name) = header.split_once(':')?;
    let profile_type = match kind.trim() {
        "print" => ProfileType::Print,
        "filament" => ProfileType::Filament,
        "printer" => ProfileType::Printer,
        _ => return None,
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), profile_type))
}

/// Flat presets carry no type marker; the keys give it away.
fn infer_type(settings: &Map<String, Value>) -> ProfileType {
    if settings.contains_key("filament_diameter") || settings.contains_key("filament_type") {
        ProfileType::Filament
    } else if settings.contains_key("printer_model") || settings.contains_key("bed_shape") {
        ProfileType::Printer
    } else if settings.contains_key("layer_height") || settings.contains_key("perimeters") {
        ProfileType::Print
    } else {
        ProfileType::Bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printvault_core::models::slicer::{SlicerConfig, SlicerType};
    use printvault_db::open_memory_db;
    use tempfile::TempDir;

    fn slicer(conn: &Connection) -> SlicerId {
        ops::slicers::upsert_slicer(
            conn,
            &SlicerConfig::new(SlicerType::PrusaSlicer, "/usr/bin/prusa-slicer".into()),
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_flat_preset_infers_type() {
        let conn = open_memory_db().unwrap();
        let id = slicer(&conn);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.2mm QUALITY.ini");
        std::fs::write(&path, "layer_height = 0.2\nperimeters = 3\n").unwrap();

        let report = import_profiles(&conn, &id, &path).unwrap();
        assert_eq!(report.imported.len(), 1);
        assert!(report.skipped.is_empty());
        let profile = &report.imported[0];
        assert_eq!(profile.name, "0.2mm QUALITY");
        assert_eq!(profile.profile_type, ProfileType::Print);
        assert_eq!(profile.settings["layer_height"], "0.2");
    }

    #[test]
    fn test_bundle_yields_one_profile_per_section() {
        let conn = open_memory_db().unwrap();
        let id = slicer(&conn);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bundle.ini");
        std::fs::write(
            &path,
            "[print:Draft]\nlayer_height = 0.3\n\n\
             [filament:PLA Basic]\nfilament_diameter = 1.75\n\n\
             [printer:MK4]\nprinter_model = MK4\n",
        )
        .unwrap();

        let report = import_profiles(&conn, &id, &path).unwrap();
        assert_eq!(report.imported.len(), 3);
        let types: Vec<_> = report.imported.iter().map(|p| p.profile_type).collect();
        assert_eq!(
            types,
            vec![ProfileType::Print, ProfileType::Filament, ProfileType::Printer]
        );
    }

    #[test]
    fn test_malformed_preset_skipped_not_fatal() {
        let conn = open_memory_db().unwrap();
        let id = slicer(&conn);
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("good.ini"), "layer_height = 0.2\n").unwrap();
        std::fs::write(dir.path().join("bad.ini"), "this is not ini\n").unwrap();

        let report = import_profiles(&conn, &id, dir.path()).unwrap();
        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].contains("bad.ini"));
    }

    #[test]
    fn test_reimport_refreshes_settings() {
        let conn = open_memory_db().unwrap();
        let id = slicer(&conn);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("draft.ini");

        std::fs::write(&path, "layer_height = 0.3\n").unwrap();
        import_profiles(&conn, &id, &path).unwrap();
        std::fs::write(&path, "layer_height = 0.35\n").unwrap();
        import_profiles(&conn, &id, &path).unwrap();

        let profiles = ops::slicers::list_profiles_for_slicer(&conn, &id).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].settings["layer_height"], "0.35");
    }

    #[test]
    fn test_unknown_slicer_is_error() {
        let conn = open_memory_db().unwrap();
        let err = import_profiles(&conn, &SlicerId::new(), Path::new("x.ini")).unwrap_err();
        assert!(err.to_string().contains("slicer"));
    }
}
