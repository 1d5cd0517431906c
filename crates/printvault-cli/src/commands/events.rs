use clap::Args;

use printvault_core::config::VaultConfig;
use printvault_core::events::EventKind;
use printvault_db::ops;

#[derive(Args)]
pub struct EventsArgs {
    /// Only events of this kind (e.g. job_completed, printer_error)
    #[arg(long)]
    kind: Option<String>,

    #[arg(long, default_value_t = 50)]
    limit: u32,
}

pub fn run(args: EventsArgs, json: bool) -> anyhow::Result<()> {
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;

    let events = match args.kind {
        Some(kind) => {
            let kind: EventKind = kind.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            ops::events::list_events_by_kind(&conn, kind, args.limit)?
        }
        None => ops::events::list_events(&conn, args.limit)?,
    };

    if json {
        let items: Vec<_> = events
            .iter()
            .map(|e| {
                format!(
                    "{{\"kind\": \"{}\", \"at\": \"{}\", \"payload\": {}}}",
                    e.kind,
                    e.created_at.to_rfc3339(),
                    e.payload
                )
            })
            .collect();
        println!("[{}]", items.join(", "));
    } else if events.is_empty() {
        println!("No events recorded.");
    } else {
        for e in &events {
            println!("{} {:<18} {}", e.created_at.to_rfc3339(), e.kind, e.payload);
        }
    }
    Ok(())
}
