use clap::Args;
use std::path::PathBuf;

use printvault_core::config::VaultConfig;
use printvault_library::scan::{self, ScanConfig};

#[derive(Args)]
pub struct ScanArgs {
    /// Folder to scan for models and G-code
    folder: PathBuf,
}

pub fn run(args: ScanArgs, json: bool) -> anyhow::Result<()> {
    let config = VaultConfig::load()?;
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;
    let library_root = config.library_root()?;

    let folder = std::fs::canonicalize(&args.folder)
        .map_err(|_| anyhow::anyhow!("folder does not exist: {}", args.folder.display()))?;

    let report = scan::scan_folder(
        &conn,
        &library_root,
        &ScanConfig {
            folder,
            settings: config.scan.clone(),
            show_progress: !json,
        },
    )?;

    if json {
        println!(
            "{{\"scanned\": {}, \"ingested\": {}, \"new_sources\": {}, \"cached\": {}, \"errors\": {}}}",
            report.scanned,
            report.ingested,
            report.new_sources,
            report.skipped_cached,
            report.errors.len(),
        );
    } else {
        println!(
            "Scanned {} files: {} added, {} re-observed, {} unchanged",
            report.scanned, report.ingested, report.new_sources, report.skipped_cached
        );
        for error in &report.errors {
            eprintln!("  error: {}", error);
        }
    }
    Ok(())
}
