use clap::Args;
use std::path::PathBuf;

use printvault_core::config::VaultConfig;
use printvault_core::models::source::SourceType;
use printvault_library::ingest::{self, IngestOutcome, SourceDescriptor};

#[derive(Args)]
pub struct AddArgs {
    /// File to add to the library
    path: PathBuf,

    /// Store a second physical copy even when the content is already known
    #[arg(long)]
    copy: bool,

    /// Display name for the file
    #[arg(long)]
    name: Option<String>,
}

pub fn run(args: AddArgs, json: bool) -> anyhow::Result<()> {
    let config = VaultConfig::load()?;
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;
    let library_root = config.library_root()?;

    let canonical = std::fs::canonicalize(&args.path)
        .map_err(|_| anyhow::anyhow!("file does not exist: {}", args.path.display()))?;
    let source = SourceDescriptor::new(
        SourceType::Upload,
        "cli",
        &canonical.to_string_lossy(),
    );

    let outcome = ingest::ingest_path(&conn, &library_root, &canonical, source, args.copy)?;
    if let Some(name) = args.name.as_deref() {
        printvault_db::ops::files::set_display_name(&conn, &outcome.file().id, Some(name))?;
    }

    let file = outcome.file();
    if json {
        println!(
            "{{\"checksum\": \"{}\", \"path\": \"{}\", \"outcome\": \"{}\"}}",
            file.checksum,
            file.library_path.display(),
            outcome_label(&outcome),
        );
    } else {
        match &outcome {
            IngestOutcome::New(f) => {
                println!("Added {} ({})", f.filename, short(&f.checksum));
            }
            IngestOutcome::NewSource(f) => {
                println!(
                    "Already in library as {} ({}), recorded new source",
                    f.filename,
                    short(&f.checksum)
                );
            }
            IngestOutcome::Duplicate(f) => {
                println!(
                    "Stored duplicate copy {} of {}",
                    f.filename,
                    short(&f.checksum)
                );
            }
        }
    }
    Ok(())
}

fn outcome_label(outcome: &IngestOutcome) -> &'static str {
    match outcome {
        IngestOutcome::New(_) => "new",
        IngestOutcome::NewSource(_) => "new_source",
        IngestOutcome::Duplicate(_) => "duplicate",
    }
}

pub fn short(checksum: &str) -> &str {
    &checksum[..checksum.len().min(12)]
}
