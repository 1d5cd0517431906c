use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use printvault_core::config::ScanSettings;
use printvault_core::models::source::SourceType;
use printvault_db::ops;
use printvault_db::ops::scan_cache::ScanCacheEntry;

use crate::hasher;
use crate::ingest::{self, IngestOutcome, SourceDescriptor};

/// Configuration for one watched-folder scan.
pub struct ScanConfig {
    pub folder: PathBuf,
    pub settings: ScanSettings,
    pub show_progress: bool,
}

/// Result of scanning a watched folder.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub scanned: u64,
    pub ingested: u64,
    pub new_sources: u64,
    pub skipped_cached: u64,
    pub skipped_extension: u64,
    pub errors: Vec<String>,
}

/// Walk a watched folder and ingest every model/G-code file found. Unchanged
/// files (matching size+mtime, or matching XXH3 when only mtime moved) are
/// skipped via the scan cache; new or changed content is hashed with SHA-256
/// and ingested with the folder as its source.
pub fn scan_folder(
    conn: &Connection,
    library_root: &Path,
    config: &ScanConfig,
) -> anyhow::Result<ScanReport> {
    let folder_key = config.folder.to_string_lossy().to_string();
    let mut report = ScanReport::default();

    let pb = if config.show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_message("Scanning folder...");
        Some(pb)
    } else {
        None
    };

    let walker = WalkDir::new(&config.folder)
        .follow_links(config.settings.follow_symlinks)
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                report.errors.push(format!("walk error: {e}"));
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        let rel_path = match path.strip_prefix(&config.folder) {
            Ok(p) => p.to_path_buf(),
            Err(_) => continue,
        };

        if !matches_extension(path, &config.settings.extensions) {
            report.skipped_extension += 1;
            continue;
        }

        report.scanned += 1;
        if let Some(ref pb) = pb {
            pb.set_message(format!("{} files scanned", report.scanned));
            pb.tick();
        }

        match scan_one(conn, library_root, &folder_key, path, &rel_path) {
            Ok(ScanOneResult::SkippedCached) => report.skipped_cached += 1,
            Ok(ScanOneResult::Ingested(IngestOutcome::New(_)))
            | Ok(ScanOneResult::Ingested(IngestOutcome::Duplicate(_))) => report.ingested += 1,
            Ok(ScanOneResult::Ingested(IngestOutcome::NewSource(_))) => report.new_sources += 1,
            Err(e) => {
                let msg = format!("{}: {e}", rel_path.display());
                tracing::warn!("{}", msg);
                report.errors.push(msg);
            }
        }
    }

    if let Some(pb) = pb {
        pb.finish_with_message(format!(
            "Scanned {} files ({} new, {} cached)",
            report.scanned, report.ingested, report.skipped_cached
        ));
    }

    Ok(report)
}

enum ScanOneResult {
    SkippedCached,
    Ingested(IngestOutcome),
}

fn scan_one(
    conn: &Connection,
    library_root: &Path,
    folder_key: &str,
    path: &Path,
    rel_path: &Path,
) -> anyhow::Result<ScanOneResult> {
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len();
    let mtime = file_mtime(&metadata);
    let rel_str = rel_path.to_string_lossy().to_string();

    if let Some(cached) = ops::scan_cache::get_scan_cache_entry(conn, folder_key, &rel_str)? {
        if cached.is_valid(size, mtime) {
            return Ok(ScanOneResult::SkippedCached);
        }
        // mtime moved; a matching fast hash means the content did not.
        let xxh3 = hasher::xxh3_file(path)?;
        if xxh3 == cached.xxh3_hash {
            ops::scan_cache::upsert_scan_cache(
                conn,
                &ScanCacheEntry {
                    mtime,
                    size,
                    cached_at: Utc::now(),
                    ..cached
                },
            )?;
            return Ok(ScanOneResult::SkippedCached);
        }
    }

    let source = SourceDescriptor::new(SourceType::WatchFolder, folder_key, &rel_str);
    let outcome = ingest::ingest_path(conn, library_root, path, source, false)?;

    ops::scan_cache::upsert_scan_cache(
        conn,
        &ScanCacheEntry {
            folder: folder_key.to_string(),
            rel_path: rel_str,
            size,
            mtime,
            xxh3_hash: hasher::xxh3_file(path)?,
            sha256_hash: outcome.file().checksum.clone(),
            cached_at: Utc::now(),
        },
    )?;

    Ok(ScanOneResult::Ingested(outcome))
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| extensions.iter().any(|x| x == &e))
        .unwrap_or(false)
}

fn file_mtime(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .ok()
        .and_then(|t| {
            let duration = t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
            DateTime::from_timestamp(duration.as_secs() as i64, duration.subsec_nanos())
        })
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printvault_db::open_memory_db;
    use tempfile::TempDir;

    fn config(folder: &Path) -> ScanConfig {
        ScanConfig {
            folder: folder.to_path_buf(),
            settings: ScanSettings::default(),
            show_progress: false,
        }
    }

    #[test]
    fn test_scan_ingests_models_only() {
        let conn = open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library = dir.path().join("library");
        let watch = dir.path().join("watch");
        std::fs::create_dir_all(watch.join("sub")).unwrap();
        std::fs::write(watch.join("benchy.stl"), "solid benchy").unwrap();
        std::fs::write(watch.join("sub/cube.gcode"), "G1 X0").unwrap();
        std::fs::write(watch.join("readme.txt"), "not a model").unwrap();

        let report = scan_folder(&conn, &library, &config(&watch)).unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.ingested, 2);
        assert_eq!(report.skipped_extension, 1);
        assert_eq!(ops::files::count_files(&conn).unwrap(), 2);
    }

    #[test]
    fn test_rescan_hits_cache() {
        let conn = open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library = dir.path().join("library");
        let watch = dir.path().join("watch");
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::write(watch.join("benchy.stl"), "solid benchy").unwrap();

        let first = scan_folder(&conn, &library, &config(&watch)).unwrap();
        assert_eq!(first.ingested, 1);

        let second = scan_folder(&conn, &library, &config(&watch)).unwrap();
        assert_eq!(second.ingested, 0);
        assert_eq!(second.skipped_cached, 1);
        assert_eq!(ops::files::count_files(&conn).unwrap(), 1);
    }

    #[test]
    fn test_changed_content_reingested_as_new_checksum() {
        let conn = open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library = dir.path().join("library");
        let watch = dir.path().join("watch");
        std::fs::create_dir_all(&watch).unwrap();
        let model = watch.join("benchy.stl");
        std::fs::write(&model, "solid benchy v1").unwrap();

        scan_folder(&conn, &library, &config(&watch)).unwrap();
        std::fs::write(&model, "solid benchy v2 with more detail").unwrap();
        let report = scan_folder(&conn, &library, &config(&watch)).unwrap();

        assert_eq!(report.ingested, 1);
        assert_eq!(ops::files::count_files(&conn).unwrap(), 2);
    }
}
