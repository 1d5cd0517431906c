use clap::Subcommand;

use printvault_core::config::VaultConfig;
use printvault_db::ops;
use printvault_library::organize;

use super::add::short;
use super::files::resolve_canonical;

#[derive(Subcommand)]
pub enum TagAction {
    /// Tag a file (creates the tag if needed)
    Add {
        /// Checksum (or unique prefix) of the file
        checksum: String,
        /// Tag name
        tag: String,
    },
    /// Remove a tag from a file
    Rm {
        /// Checksum (or unique prefix) of the file
        checksum: String,
        /// Tag name
        tag: String,
    },
    /// List all tags with usage counts
    List,
    /// List files carrying a tag
    Files {
        /// Tag name
        tag: String,
    },
    /// Delete a tag everywhere
    Delete {
        /// Tag name
        tag: String,
    },
}

pub fn run(action: TagAction, json: bool) -> anyhow::Result<()> {
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;

    match action {
        TagAction::Add { checksum, tag } => {
            let file = resolve_canonical(&conn, &checksum)?;
            let tag = organize::ensure_tag(&conn, &tag)?;
            if organize::assign_tag(&conn, &file.checksum, &tag.id)? {
                println!("Tagged {} with '{}'", short(&file.checksum), tag.name);
            } else {
                println!("{} already tagged '{}'", short(&file.checksum), tag.name);
            }
        }
        TagAction::Rm { checksum, tag } => {
            let file = resolve_canonical(&conn, &checksum)?;
            let tag = ops::tags::get_tag_by_name(&conn, &tag)?
                .ok_or_else(|| anyhow::anyhow!("tag '{}' not found", tag))?;
            if organize::unassign_tag(&conn, &file.checksum, &tag.id)? {
                println!("Untagged '{}' from {}", tag.name, short(&file.checksum));
            } else {
                println!("{} was not tagged '{}'", short(&file.checksum), tag.name);
            }
        }
        TagAction::List => {
            let tags = ops::tags::list_tags(&conn)?;
            if json {
                let items: Vec<_> = tags
                    .iter()
                    .map(|t| format!("{{\"name\": \"{}\", \"files\": {}}}", t.name, t.usage_count))
                    .collect();
                println!("[{}]", items.join(", "));
            } else if tags.is_empty() {
                println!("No tags defined.");
            } else {
                println!("{:<30} {:>6}", "TAG", "FILES");
                for t in &tags {
                    println!("{:<30} {:>6}", t.name, t.usage_count);
                }
            }
        }
        TagAction::Files { tag } => {
            let tag = ops::tags::get_tag_by_name(&conn, &tag)?
                .ok_or_else(|| anyhow::anyhow!("tag '{}' not found", tag))?;
            let checksums = ops::tags::list_checksums_for_tag(&conn, &tag.id)?;
            if json {
                let items: Vec<_> = checksums.iter().map(|c| format!("\"{}\"", c)).collect();
                println!("[{}]", items.join(", "));
            } else {
                for checksum in &checksums {
                    match ops::files::get_canonical_by_checksum(&conn, checksum)? {
                        Some(f) => println!("{} {}", short(checksum), f.filename),
                        None => println!("{}", short(checksum)),
                    }
                }
            }
        }
        TagAction::Delete { tag } => {
            organize::delete_tag(&conn, &tag)?;
            println!("Deleted tag '{}'", tag);
        }
    }
    Ok(())
}
