use clap::Subcommand;

use printvault_core::config::VaultConfig;
use printvault_db::ops;
use printvault_library::organize;

use super::add::short;

#[derive(Subcommand)]
pub enum FilesAction {
    /// List library files
    List,
    /// Show detailed file info
    Info {
        /// Checksum (or unique prefix) of the file
        checksum: String,
    },
    /// List stored duplicate copies of a file
    Duplicates {
        /// Checksum (or unique prefix) of the canonical file
        checksum: String,
    },
    /// Rename a file's display name
    Rename {
        /// Checksum (or unique prefix) of the file
        checksum: String,
        /// New display name (omit to clear)
        name: Option<String>,
    },
    /// Remove a file and all its associations from the library
    Rm {
        /// Checksum (or unique prefix) of the file
        checksum: String,
        /// Remove the stored duplicate copies instead of the canonical file
        #[arg(long)]
        duplicates: bool,
    },
}

pub fn run(action: FilesAction, json: bool) -> anyhow::Result<()> {
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;

    match action {
        FilesAction::List => {
            let files = ops::files::list_files(&conn)?;
            if json {
                let items: Vec<_> = files
                    .iter()
                    .map(|f| {
                        format!(
                            "{{\"checksum\": \"{}\", \"filename\": \"{}\", \"type\": \"{}\", \"status\": \"{}\", \"duplicates\": {}}}",
                            f.checksum, f.filename, f.file_type, f.status, f.duplicate_count
                        )
                    })
                    .collect();
                println!("[{}]", items.join(", "));
            } else if files.is_empty() {
                println!("Library is empty. Add files with: printvault add <path>");
            } else {
                println!(
                    "{:<14} {:<32} {:<8} {:<12} {:>6} {:>10}",
                    "CHECKSUM", "NAME", "TYPE", "STATUS", "DUPES", "SIZE"
                );
                for f in &files {
                    if f.is_duplicate {
                        continue;
                    }
                    println!(
                        "{:<14} {:<32} {:<8} {:<12} {:>6} {:>10}",
                        short(&f.checksum),
                        f.display_name.as_deref().unwrap_or(&f.filename),
                        f.file_type.to_string(),
                        f.status.to_string(),
                        f.duplicate_count,
                        format_bytes(f.file_size),
                    );
                }
            }
        }
        FilesAction::Info { checksum } => {
            let file = resolve_canonical(&conn, &checksum)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&file)?);
            } else {
                println!("File: {}", file.display_name.as_deref().unwrap_or(&file.filename));
                println!("  Checksum:  {}", file.checksum);
                println!("  Path:      {}", file.library_path.display());
                println!("  Type:      {}", file.file_type);
                println!("  Status:    {}", file.status);
                println!("  Size:      {}", format_bytes(file.file_size));
                println!("  Duplicates: {}", file.duplicate_count);
                println!("  Added:     {}", file.created_at.to_rfc3339());
                if let Some(analyzed) = file.last_analyzed {
                    println!("  Analyzed:  {}", analyzed.to_rfc3339());
                }
                if let Some(t) = file.metadata.print_time_seconds {
                    println!("  Est. print time: {}s", t);
                }
                let sources = ops::sources::list_sources_for_checksum(&conn, &file.checksum)?;
                println!("  Sources:   {}", sources.len());
                for s in &sources {
                    println!("    {} {} ({})", s.source_type, s.original_path, s.source_id);
                }
                let tags = ops::tags::list_tags_for_file(&conn, &file.checksum)?;
                if !tags.is_empty() {
                    let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
                    println!("  Tags:      {}", names.join(", "));
                }
            }
        }
        FilesAction::Duplicates { checksum } => {
            let file = resolve_canonical(&conn, &checksum)?;
            let duplicates = ops::files::list_duplicates_of(&conn, &file.checksum)?;
            if json {
                let items: Vec<_> = duplicates
                    .iter()
                    .map(|d| format!("\"{}\"", d.library_path.display()))
                    .collect();
                println!("[{}]", items.join(", "));
            } else if duplicates.is_empty() {
                println!("No duplicate copies of {}", short(&file.checksum));
            } else {
                for d in &duplicates {
                    println!("{}", d.library_path.display());
                }
            }
        }
        FilesAction::Rename { checksum, name } => {
            let file = resolve_canonical(&conn, &checksum)?;
            ops::files::set_display_name(&conn, &file.id, name.as_deref())?;
            match name {
                Some(name) => println!("Renamed {} to '{}'", short(&file.checksum), name),
                None => println!("Cleared display name of {}", short(&file.checksum)),
            }
        }
        FilesAction::Rm {
            checksum,
            duplicates,
        } => {
            let file = resolve_canonical(&conn, &checksum)?;
            if duplicates {
                let copies = ops::files::list_duplicates_of(&conn, &file.checksum)?;
                for copy in &copies {
                    organize::delete_file(&conn, &copy.id)?;
                }
                println!(
                    "Removed {} duplicate copies of {}",
                    copies.len(),
                    short(&file.checksum)
                );
            } else {
                let removed = organize::delete_file(&conn, &file.id)?;
                println!("Removed {} ({})", removed.filename, short(&removed.checksum));
            }
        }
    }
    Ok(())
}

/// Resolve a canonical file by full checksum or unique prefix.
pub fn resolve_canonical(
    conn: &rusqlite::Connection,
    checksum: &str,
) -> anyhow::Result<printvault_core::models::file::LibraryFile> {
    if let Some(file) = ops::files::get_canonical_by_checksum(conn, checksum)? {
        return Ok(file);
    }
    let mut matches: Vec<_> = ops::files::list_files(conn)?
        .into_iter()
        .filter(|f| !f.is_duplicate && f.checksum.starts_with(checksum))
        .collect();
    match matches.len() {
        0 => anyhow::bail!("no file with checksum '{}'", checksum),
        1 => Ok(matches.remove(0)),
        n => anyhow::bail!("checksum prefix '{}' is ambiguous ({} matches)", checksum, n),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
