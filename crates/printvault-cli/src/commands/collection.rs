use clap::Subcommand;

use printvault_core::config::VaultConfig;
use printvault_db::ops;
use printvault_library::organize;

use super::add::short;
use super::files::resolve_canonical;

#[derive(Subcommand)]
pub enum CollectionAction {
    /// Create a collection
    Create {
        /// Collection name
        name: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// Add a file to a collection
    Add {
        /// Collection name
        name: String,
        /// Checksum (or unique prefix) of the file
        checksum: String,
        /// Position within the collection
        #[arg(long, default_value_t = 0)]
        sort_order: i64,
    },
    /// Remove a file from a collection
    Rm {
        /// Collection name
        name: String,
        /// Checksum (or unique prefix) of the file
        checksum: String,
    },
    /// List collections
    List,
    /// Show a collection's members
    Show {
        /// Collection name
        name: String,
    },
    /// Set a member file as the collection thumbnail
    Thumbnail {
        /// Collection name
        name: String,
        /// Checksum (or unique prefix) of the member file
        checksum: String,
    },
    /// Delete a collection (members are kept in the library)
    Delete {
        /// Collection name
        name: String,
    },
}

pub fn run(action: CollectionAction, json: bool) -> anyhow::Result<()> {
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;

    match action {
        CollectionAction::Create { name, description } => {
            if ops::collections::get_collection_by_name(&conn, &name)?.is_some() {
                anyhow::bail!("collection '{}' already exists", name);
            }
            organize::create_collection(&conn, &name, description)?;
            println!("Created collection '{}'", name);
        }
        CollectionAction::Add {
            name,
            checksum,
            sort_order,
        } => {
            let collection = require(&conn, &name)?;
            let file = resolve_canonical(&conn, &checksum)?;
            if organize::add_member(&conn, &collection.id, &file.checksum, sort_order)? {
                println!("Added {} to '{}'", short(&file.checksum), name);
            } else {
                println!("{} already in '{}'", short(&file.checksum), name);
            }
        }
        CollectionAction::Rm { name, checksum } => {
            let collection = require(&conn, &name)?;
            let file = resolve_canonical(&conn, &checksum)?;
            if organize::remove_member(&conn, &collection.id, &file.checksum)? {
                println!("Removed {} from '{}'", short(&file.checksum), name);
            } else {
                println!("{} was not in '{}'", short(&file.checksum), name);
            }
        }
        CollectionAction::List => {
            let collections = ops::collections::list_collections(&conn)?;
            if json {
                let items: Vec<_> = collections
                    .iter()
                    .map(|c| {
                        format!(
                            "{{\"name\": \"{}\", \"thumbnail\": {}}}",
                            c.name,
                            c.thumbnail_checksum
                                .as_ref()
                                .map(|t| format!("\"{}\"", t))
                                .unwrap_or_else(|| "null".to_string())
                        )
                    })
                    .collect();
                println!("[{}]", items.join(", "));
            } else if collections.is_empty() {
                println!("No collections. Create one with: printvault collection create <name>");
            } else {
                for c in &collections {
                    let members = ops::collections::list_members(&conn, &c.id)?;
                    println!("{} ({} files)", c.name, members.len());
                    if let Some(ref desc) = c.description {
                        println!("  {}", desc);
                    }
                }
            }
        }
        CollectionAction::Show { name } => {
            let collection = require(&conn, &name)?;
            let members = ops::collections::list_members(&conn, &collection.id)?;
            if json {
                let items: Vec<_> = members
                    .iter()
                    .map(|m| format!("\"{}\"", m.checksum))
                    .collect();
                println!("[{}]", items.join(", "));
            } else {
                println!("Collection: {}", collection.name);
                if let Some(ref desc) = collection.description {
                    println!("  {}", desc);
                }
                for m in &members {
                    match ops::files::get_canonical_by_checksum(&conn, &m.checksum)? {
                        Some(f) => println!("  {} {}", short(&m.checksum), f.filename),
                        None => println!("  {}", short(&m.checksum)),
                    }
                }
            }
        }
        CollectionAction::Thumbnail { name, checksum } => {
            let collection = require(&conn, &name)?;
            let file = resolve_canonical(&conn, &checksum)?;
            organize::set_collection_thumbnail(&conn, &collection.id, &file.checksum)?;
            println!("Thumbnail of '{}' set to {}", name, short(&file.checksum));
        }
        CollectionAction::Delete { name } => {
            organize::delete_collection(&conn, &name)?;
            println!("Deleted collection '{}'", name);
        }
    }
    Ok(())
}

fn require(
    conn: &rusqlite::Connection,
    name: &str,
) -> anyhow::Result<printvault_core::models::collection::Collection> {
    ops::collections::get_collection_by_name(conn, name)?
        .ok_or_else(|| anyhow::anyhow!("collection '{}' not found", name))
}
