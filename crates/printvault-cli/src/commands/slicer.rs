use clap::Subcommand;
use std::path::PathBuf;

use printvault_core::config::VaultConfig;
use printvault_core::models::slicer::{SlicerConfig, SlicerType};
use printvault_db::ops;
use printvault_slicer::{profiles, registry};

#[derive(Subcommand)]
pub enum SlicerAction {
    /// Probe known install locations for slicers
    Detect,
    /// Register a slicer at an explicit path
    Register {
        /// Slicer family: prusaslicer, orcaslicer, cura, or bambustudio
        slicer_type: String,
        /// Path to the slicer executable
        path: PathBuf,
    },
    /// Re-probe registered slicers and update availability
    Verify,
    /// List registered slicers
    List,
    /// Import native preset files as profiles
    Import {
        /// Slicer family the presets belong to
        slicer_type: String,
        /// Preset file or directory of .ini files
        path: PathBuf,
    },
    /// List imported profiles for a slicer
    Profiles {
        /// Slicer family
        slicer_type: String,
    },
    /// Mark a profile as the default for its slicer and type
    SetDefault {
        /// Profile id (from `printvault slicer profiles`)
        profile_id: String,
    },
}

pub fn run(action: SlicerAction, json: bool) -> anyhow::Result<()> {
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;

    match action {
        SlicerAction::Detect => {
            let report = registry::detect(&conn)?;
            if json {
                println!(
                    "{{\"available\": {}, \"unavailable\": {}}}",
                    report.available.len(),
                    report.unavailable.len()
                );
            } else if report.available.is_empty() && report.unavailable.is_empty() {
                println!("No slicers found.");
            } else {
                for s in &report.available {
                    println!(
                        "+ {} {} ({})",
                        s.slicer_type,
                        s.version.as_deref().unwrap_or("?"),
                        s.executable.display()
                    );
                }
                for s in &report.unavailable {
                    println!("- {} unavailable ({})", s.slicer_type, s.executable.display());
                }
            }
        }
        SlicerAction::Register { slicer_type, path } => {
            let slicer_type: SlicerType =
                slicer_type.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let slicer = registry::register_slicer(&conn, slicer_type, &path)?;
            if slicer.is_available {
                println!(
                    "Registered {} {} at {}",
                    slicer.slicer_type,
                    slicer.version.as_deref().unwrap_or("?"),
                    slicer.executable.display()
                );
            } else {
                println!(
                    "Registered {} at {} (currently unavailable)",
                    slicer.slicer_type,
                    slicer.executable.display()
                );
            }
        }
        SlicerAction::Verify => {
            let slicers = registry::verify_slicers(&conn)?;
            for s in &slicers {
                println!(
                    "{} {} {}",
                    if s.is_available { "+" } else { "-" },
                    s.slicer_type,
                    s.executable.display()
                );
            }
        }
        SlicerAction::List => {
            let slicers = ops::slicers::list_slicers(&conn)?;
            if json {
                let items: Vec<_> = slicers
                    .iter()
                    .map(|s| {
                        format!(
                            "{{\"type\": \"{}\", \"executable\": \"{}\", \"available\": {}, \"version\": {}}}",
                            s.slicer_type,
                            s.executable.display(),
                            s.is_available,
                            s.version
                                .as_ref()
                                .map(|v| format!("\"{}\"", v))
                                .unwrap_or_else(|| "null".to_string())
                        )
                    })
                    .collect();
                println!("[{}]", items.join(", "));
            } else if slicers.is_empty() {
                println!("No slicers registered. Run: printvault slicer detect");
            } else {
                println!("{:<14} {:<12} {:<10} EXECUTABLE", "TYPE", "VERSION", "STATUS");
                for s in &slicers {
                    println!(
                        "{:<14} {:<12} {:<10} {}",
                        s.slicer_type.to_string(),
                        s.version.as_deref().unwrap_or("-"),
                        if s.is_available { "ok" } else { "offline" },
                        s.executable.display()
                    );
                }
            }
        }
        SlicerAction::Import { slicer_type, path } => {
            let slicer = find_slicer(&conn, &slicer_type)?;
            let report = profiles::import_profiles(&conn, &slicer.id, &path)?;
            println!(
                "Imported {} profiles ({} skipped)",
                report.imported.len(),
                report.skipped.len()
            );
            for reason in &report.skipped {
                eprintln!("  skipped: {}", reason);
            }
        }
        SlicerAction::Profiles { slicer_type } => {
            let slicer = find_slicer(&conn, &slicer_type)?;
            let profiles = ops::slicers::list_profiles_for_slicer(&conn, &slicer.id)?;
            if json {
                let items: Vec<_> = profiles
                    .iter()
                    .map(|p| {
                        format!(
                            "{{\"id\": \"{}\", \"name\": \"{}\", \"type\": \"{}\", \"default\": {}}}",
                            p.id, p.name, p.profile_type, p.is_default
                        )
                    })
                    .collect();
                println!("[{}]", items.join(", "));
            } else if profiles.is_empty() {
                println!("No profiles imported for {}.", slicer.slicer_type);
            } else {
                println!("{:<38} {:<10} {:<8} NAME", "ID", "TYPE", "DEFAULT");
                for p in &profiles {
                    println!(
                        "{:<38} {:<10} {:<8} {}",
                        p.id.to_string(),
                        p.profile_type.to_string(),
                        if p.is_default { "yes" } else { "-" },
                        p.name
                    );
                }
            }
        }
        SlicerAction::SetDefault { profile_id } => {
            let id = parse_profile_id(&profile_id)?;
            let profile = ops::slicers::get_profile_by_id(&conn, &id)?
                .ok_or_else(|| anyhow::anyhow!("profile '{}' not found", profile_id))?;
            ops::slicers::set_default_profile(&conn, &profile.id)?;
            println!(
                "'{}' is now the default {} profile",
                profile.name, profile.profile_type
            );
        }
    }
    Ok(())
}

pub fn find_slicer(conn: &rusqlite::Connection, slicer_type: &str) -> anyhow::Result<SlicerConfig> {
    let wanted: SlicerType = slicer_type.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    ops::slicers::list_slicers(conn)?
        .into_iter()
        .find(|s| s.slicer_type == wanted)
        .ok_or_else(|| anyhow::anyhow!("no registered {} (run `printvault slicer detect`)", wanted))
}

pub fn parse_profile_id(
    raw: &str,
) -> anyhow::Result<printvault_core::models::slicer::ProfileId> {
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|_| anyhow::anyhow!("'{}' is not a valid profile id", raw))?;
    Ok(printvault_core::models::slicer::ProfileId::from_uuid(uuid))
}
