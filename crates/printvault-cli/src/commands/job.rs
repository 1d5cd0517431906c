use clap::Subcommand;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use printvault_core::config::VaultConfig;
use printvault_core::models::job::{JobId, JobStatus, SlicingJob};
use printvault_db::ops;
use printvault_slicer::scheduler::{self, Scheduler};
use printvault_slicer::transfer::NoopTransfer;
use printvault_slicer::cleanup;

use super::add::short;
use super::files::resolve_canonical;
use super::slicer::find_slicer;

#[derive(Subcommand)]
pub enum JobAction {
    /// Queue a slicing job
    Add {
        /// Checksum (or unique prefix) of the file to slice
        checksum: String,
        /// Slicer family to use
        #[arg(long)]
        slicer: String,
        /// Profile name (defaults to the slicer's default print profile)
        #[arg(long)]
        profile: Option<String>,
        /// Queue priority; higher runs first
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Target printer id; enables upload after slicing
        #[arg(long)]
        printer: Option<String>,
        /// Start the print after a successful upload
        #[arg(long)]
        auto_start: bool,
    },
    /// List jobs
    List {
        /// Only jobs in this status
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show one job
    Info {
        /// Job id
        id: String,
    },
    /// Cancel a queued or running job
    Cancel {
        /// Job id
        id: String,
    },
    /// Run the worker pool until the queue drains
    Run {
        /// Override the configured worker count
        #[arg(long)]
        workers: Option<u32>,
    },
    /// Purge old terminal jobs and their artifacts
    Cleanup,
}

pub fn run(action: JobAction, json: bool) -> anyhow::Result<()> {
    let config = VaultConfig::load()?;
    let db_path = VaultConfig::db_path()?;
    let conn = printvault_db::open_db(&db_path)?;

    match action {
        JobAction::Add {
            checksum,
            slicer,
            profile,
            priority,
            printer,
            auto_start,
        } => {
            let file = resolve_canonical(&conn, &checksum)?;
            let slicer = find_slicer(&conn, &slicer)?;
            let profile = resolve_profile(&conn, &slicer.id, profile.as_deref())?;

            let mut job = SlicingJob::new(file.checksum.clone(), slicer.id, profile.id)
                .with_priority(priority);
            if let Some(printer_id) = printer {
                job = job.with_printer(printer_id, true, auto_start);
            }
            let job = scheduler::submit(&conn, job)?;
            println!(
                "Queued job {} for {} (priority {})",
                job.id,
                short(&job.checksum),
                job.priority
            );
        }
        JobAction::List { status, limit } => {
            let jobs = match status {
                Some(s) => {
                    let status: JobStatus = s.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                    ops::jobs::list_jobs_by_status(&conn, status)?
                }
                None => ops::jobs::list_jobs(&conn, limit)?,
            };
            if json {
                let items: Vec<_> = jobs
                    .iter()
                    .map(|j| {
                        format!(
                            "{{\"id\": \"{}\", \"checksum\": \"{}\", \"status\": \"{}\", \"priority\": {}, \"retries\": {}}}",
                            j.id, j.checksum, j.status, j.priority, j.retry_count
                        )
                    })
                    .collect();
                println!("[{}]", items.join(", "));
            } else if jobs.is_empty() {
                println!("No jobs.");
            } else {
                println!(
                    "{:<38} {:<14} {:<10} {:>4} {:>8} {:>7}",
                    "ID", "FILE", "STATUS", "PRI", "RETRIES", "PROG"
                );
                for j in &jobs {
                    println!(
                        "{:<38} {:<14} {:<10} {:>4} {:>8} {:>6}%",
                        j.id.to_string(),
                        short(&j.checksum),
                        j.status.to_string(),
                        j.priority,
                        j.retry_count,
                        j.progress
                    );
                }
            }
        }
        JobAction::Info { id } => {
            let job = get_job(&conn, &id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                println!("Job: {}", job.id);
                println!("  File:     {}", short(&job.checksum));
                println!("  Status:   {}", job.status);
                println!("  Priority: {}", job.priority);
                println!("  Retries:  {}", job.retry_count);
                println!("  Created:  {}", job.created_at.to_rfc3339());
                if let Some(started) = job.started_at {
                    println!("  Started:  {}", started.to_rfc3339());
                }
                if let Some(completed) = job.completed_at {
                    println!("  Finished: {}", completed.to_rfc3339());
                }
                if let Some(ref output) = job.output_file_path {
                    println!("  Output:   {}", output.display());
                }
                if let Some(ref gcode) = job.output_gcode_checksum {
                    println!("  G-code:   {}", short(gcode));
                }
                if let Some(t) = job.estimated_print_time_seconds {
                    println!("  Est. print time: {}s", t);
                }
                if let Some(g) = job.estimated_filament_grams {
                    println!("  Est. filament:   {:.1} g", g);
                }
                if let Some(ref error) = job.error_message {
                    println!("  Error:    {}", error);
                }
            }
        }
        JobAction::Cancel { id } => {
            let job = get_job(&conn, &id)?;
            if scheduler::cancel(&conn, &job.id)? {
                println!("Cancelled job {}", job.id);
            } else {
                println!("Job {} already {}", job.id, job.status);
            }
        }
        JobAction::Run { workers } => {
            let mut slicing = config.slicing.clone();
            if let Some(workers) = workers {
                slicing.max_concurrent = workers;
            }
            let library_root = config.library_root()?;
            let poll = Duration::from_millis(slicing.poll_interval_ms.max(50));

            let conn = Arc::new(Mutex::new(conn));
            let scheduler = Scheduler::start(
                Arc::clone(&conn),
                library_root,
                slicing,
                Box::new(NoopTransfer),
            );
            println!("Workers running; draining the queue...");

            loop {
                std::thread::sleep(poll);
                let pending = {
                    let conn = conn
                        .lock()
                        .map_err(|_| anyhow::anyhow!("scheduler state poisoned"))?;
                    ops::jobs::count_by_status(&conn, JobStatus::Queued)?
                        + ops::jobs::count_by_status(&conn, JobStatus::Running)?
                };
                if pending == 0 {
                    break;
                }
            }
            scheduler.shutdown();
            println!("Queue drained.");
        }
        JobAction::Cleanup => {
            let report = cleanup::cleanup_jobs(&conn, &config.slicing)?;
            println!(
                "Purged {} jobs and {} artifacts",
                report.purged_jobs, report.purged_artifacts
            );
            for error in &report.errors {
                eprintln!("  kept: {}", error);
            }
        }
    }
    Ok(())
}

fn get_job(conn: &rusqlite::Connection, raw: &str) -> anyhow::Result<SlicingJob> {
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|_| anyhow::anyhow!("'{}' is not a valid job id", raw))?;
    ops::jobs::get_job(conn, &JobId::from_uuid(uuid))?
        .ok_or_else(|| anyhow::anyhow!("job '{}' not found", raw))
}

fn resolve_profile(
    conn: &rusqlite::Connection,
    slicer_id: &printvault_core::models::slicer::SlicerId,
    name: Option<&str>,
) -> anyhow::Result<printvault_core::models::slicer::SlicerProfile> {
    let profiles = ops::slicers::list_profiles_for_slicer(conn, slicer_id)?;
    match name {
        Some(name) => profiles
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| anyhow::anyhow!("profile '{}' not found", name)),
        None => profiles
            .into_iter()
            .find(|p| p.is_default)
            .ok_or_else(|| {
                anyhow::anyhow!("no default profile; pass --profile or set one with `printvault slicer set-default`")
            }),
    }
}
