use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::Command;

use printvault_core::models::slicer::{SlicerConfig, SlicerType};
use printvault_db::ops;

/// Candidate executable names probed on PATH, per slicer family.
const CANDIDATES: &[(SlicerType, &[&str])] = &[
    (
        SlicerType::PrusaSlicer,
        &["prusa-slicer", "prusa-slicer-console", "PrusaSlicer"],
    ),
    (SlicerType::OrcaSlicer, &["orca-slicer", "OrcaSlicer"]),
    (SlicerType::Cura, &["CuraEngine", "cura-engine"]),
    (SlicerType::BambuStudio, &["bambu-studio", "BambuStudio"]),
];

/// Well-known absolute install locations, checked in addition to PATH.
const INSTALL_DIRS: &[&str] = &[
    "/usr/bin",
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/Applications/PrusaSlicer.app/Contents/MacOS",
    "/Applications/OrcaSlicer.app/Contents/MacOS",
    "/Applications/BambuStudio.app/Contents/MacOS",
];

/// Result of one detection pass.
#[derive(Debug, Default)]
pub struct DetectReport {
    pub available: Vec<SlicerConfig>,
    pub unavailable: Vec<SlicerConfig>,
}

/// Probe known install locations for slicer executables, verify each with a
/// version query, and record them. Previously registered installations that
/// no longer respond are marked unavailable, never deleted, so profiles and
/// job history survive a transient outage.
pub fn detect(conn: &Connection) -> anyhow::Result<DetectReport> {
    let mut report = DetectReport::default();

    for (slicer_type, names) in CANDIDATES {
        for path in candidate_paths(names) {
            if let Some(version) = probe_version(&path) {
                let slicer = register(conn, *slicer_type, &path, Some(&version))?;
                tracing::info!(
                    slicer = %slicer.slicer_type,
                    path = %path.display(),
                    version = %version,
                    "detected slicer"
                );
                report.available.push(slicer);
            }
        }
    }

    // Re-probe anything registered earlier that this pass did not see.
    for slicer in ops::slicers::list_slicers(conn)? {
        let seen = report.available.iter().any(|s| s.id == slicer.id);
        if seen {
            continue;
        }
        match probe_version(&slicer.executable) {
            Some(version) => {
                ops::slicers::set_availability(conn, &slicer.id, true, Some(&version))?;
                report.available.push(refreshed(conn, &slicer)?);
            }
            None => {
                ops::slicers::set_availability(conn, &slicer.id, false, None)?;
                tracing::warn!(
                    slicer = %slicer.slicer_type,
                    path = %slicer.executable.display(),
                    "slicer unreachable, marked unavailable"
                );
                report.unavailable.push(refreshed(conn, &slicer)?);
            }
        }
    }

    Ok(report)
}

/// Register a slicer at an explicit path, probing it for availability.
pub fn register_slicer(
    conn: &Connection,
    slicer_type: SlicerType,
    executable: &Path,
) -> anyhow::Result<SlicerConfig> {
    let version = probe_version(executable);
    register(conn, slicer_type, executable, version.as_deref())
}

/// Re-probe every registered slicer and update availability in place.
pub fn verify_slicers(conn: &Connection) -> anyhow::Result<Vec<SlicerConfig>> {
    let mut out = Vec::new();
    for slicer in ops::slicers::list_slicers(conn)? {
        let version = probe_version(&slicer.executable);
        ops::slicers::set_availability(conn, &slicer.id, version.is_some(), version.as_deref())?;
        out.push(refreshed(conn, &slicer)?);
    }
    Ok(out)
}

fn register(
    conn: &Connection,
    slicer_type: SlicerType,
    executable: &Path,
    version: Option<&str>,
) -> anyhow::Result<SlicerConfig> {
    let slicer = ops::slicers::upsert_slicer(
        conn,
        &SlicerConfig::new(slicer_type, executable.to_path_buf()),
    )?;
    ops::slicers::set_availability(conn, &slicer.id, version.is_some(), version)?;
    refreshed(conn, &slicer)
}

fn refreshed(conn: &Connection, slicer: &SlicerConfig) -> anyhow::Result<SlicerConfig> {
    ops::slicers::get_slicer_by_id(conn, &slicer.id)?
        .ok_or_else(|| anyhow::anyhow!("slicer row missing after update"))
}

fn candidate_paths(names: &[&str]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for name in names {
        // Bare name resolves through PATH at spawn time.
        paths.push(PathBuf::from(name));
        for dir in INSTALL_DIRS {
            let full = Path::new(dir).join(name);
            if full.is_file() {
                paths.push(full);
            }
        }
    }
    paths
}

/// Invoke `<exe> --version` and return the first line of output, or None when
/// the executable is missing, not runnable, or exits non-zero.
pub fn probe_version(executable: &Path) -> Option<String> {
    let output = Command::new(executable).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text
        .lines()
        .chain(String::from_utf8_lossy(&output.stderr).lines())
        .find(|l| !l.trim().is_empty())?
        .trim()
        .to_string();
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printvault_db::open_memory_db;

    #[test]
    fn test_probe_missing_executable_is_none() {
        assert!(probe_version(Path::new("/no/such/slicer")).is_none());
    }

    #[cfg(unix)]
    fn fake_slicer(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_register_probes_version() {
        let conn = open_memory_db().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let exe = fake_slicer(dir.path(), "prusa-slicer", "echo 'PrusaSlicer-2.7.4'");

        let slicer = register_slicer(&conn, SlicerType::PrusaSlicer, &exe).unwrap();
        assert!(slicer.is_available);
        assert_eq!(slicer.version.as_deref(), Some("PrusaSlicer-2.7.4"));
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_marks_unreachable_without_deleting() {
        let conn = open_memory_db().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let exe = fake_slicer(dir.path(), "orca-slicer", "echo 'OrcaSlicer 2.0.0'");

        let slicer = register_slicer(&conn, SlicerType::OrcaSlicer, &exe).unwrap();
        assert!(slicer.is_available);

        std::fs::remove_file(&exe).unwrap();
        let verified = verify_slicers(&conn).unwrap();
        assert_eq!(verified.len(), 1);
        assert!(!verified[0].is_available);
        // Version from the last successful probe is retained.
        assert_eq!(verified[0].version.as_deref(), Some("OrcaSlicer 2.0.0"));
    }

    #[cfg(unix)]
    #[test]
    fn test_register_unreachable_is_kept_unavailable() {
        let conn = open_memory_db().unwrap();
        let slicer =
            register_slicer(&conn, SlicerType::Cura, Path::new("/no/such/CuraEngine")).unwrap();
        assert!(!slicer.is_available);
        assert_eq!(ops::slicers::list_slicers(&conn).unwrap().len(), 1);
    }
}
