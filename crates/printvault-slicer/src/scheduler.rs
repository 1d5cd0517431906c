use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use printvault_core::config::SlicingConfig;
use printvault_core::error::VaultError;
use printvault_core::events::Event;
use printvault_core::models::file::LibraryFile;
use printvault_core::models::job::{JobId, JobStatus, SlicingJob};
use printvault_core::models::slicer::{SlicerConfig, SlicerProfile};
use printvault_core::models::source::SourceType;
use printvault_db::ops;
use printvault_library::ingest::{self, SourceDescriptor};

use crate::runner::{self, RunOutcome};
use crate::transfer::PrinterTransfer;

/// Backpressure ceiling on the queued set. Submissions past this point are
/// refused synchronously rather than buffered without bound.
const MAX_QUEUED: u64 = 1000;

/// Validate a job's references and place it on the queue. Runs with or
/// without a live worker pool; workers pick it up whenever one is running.
pub fn submit(conn: &Connection, job: SlicingJob) -> anyhow::Result<SlicingJob> {
    ops::files::get_canonical_by_checksum(conn, &job.checksum)?.ok_or_else(|| {
        VaultError::FileNotFound {
            checksum: job.checksum.clone(),
        }
    })?;
    let slicer = ops::slicers::get_slicer_by_id(conn, &job.slicer_id)?.ok_or_else(|| {
        VaultError::SlicerNotFound {
            id: job.slicer_id.to_string(),
        }
    })?;
    ops::slicers::get_profile_by_id(conn, &job.profile_id)?.ok_or_else(|| {
        VaultError::ProfileNotFound {
            id: job.profile_id.to_string(),
        }
    })?;
    if !slicer.is_available {
        tracing::warn!(
            slicer = %slicer.slicer_type,
            "job submitted against a slicer currently marked unavailable"
        );
    }

    let queued = ops::jobs::count_by_status(conn, JobStatus::Queued)?;
    if queued >= MAX_QUEUED {
        return Err(VaultError::Capacity {
            message: format!("{queued} jobs already queued"),
        }
        .into());
    }

    ops::jobs::insert_job(conn, &job)?;
    tracing::info!(job = %job.id, checksum = %job.checksum, priority = job.priority, "job queued");
    Ok(job)
}

/// Cancel a job by id without a live scheduler: queued and running rows move
/// to `cancelled`, terminal rows are left alone. A running job's process is
/// only reaped when its scheduler is up; use [`Scheduler::cancel`] for that.
pub fn cancel(conn: &Connection, id: &JobId) -> anyhow::Result<bool> {
    ops::jobs::get_job(conn, id)?.ok_or_else(|| VaultError::JobNotFound { id: id.to_string() })?;
    ops::jobs::cancel_job(conn, id)
}

/// Fixed-size worker pool pulling from the queued set. Workers claim jobs
/// one at a time through the atomic queued -> running transition, run the
/// slicer out of line, and write results back under the shared connection.
pub struct Scheduler {
    inner: Arc<Inner>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

struct Inner {
    conn: Arc<Mutex<Connection>>,
    library_root: PathBuf,
    config: SlicingConfig,
    transfer: Box<dyn PrinterTransfer>,
    shutdown: AtomicBool,
    cancel_flags: Mutex<HashMap<JobId, Arc<AtomicBool>>>,
}

impl Scheduler {
    pub fn start(
        conn: Arc<Mutex<Connection>>,
        library_root: PathBuf,
        config: SlicingConfig,
        transfer: Box<dyn PrinterTransfer>,
    ) -> Self {
        let inner = Arc::new(Inner {
            conn,
            library_root,
            config,
            transfer,
            shutdown: AtomicBool::new(false),
            cancel_flags: Mutex::new(HashMap::new()),
        });

        let count = inner.config.max_concurrent.max(1) as usize;
        let workers = (0..count)
            .map(|n| {
                let inner = Arc::clone(&inner);
                std::thread::Builder::new()
                    .name(format!("slicer-worker-{n}"))
                    .spawn(move || worker_loop(inner))
            })
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or_default();
        tracing::info!(workers = workers.len(), "scheduler started");

        Self { inner, workers }
    }

    /// Cancel a job. For a running job this raises its cancel flag so the
    /// worker kills the slicer process; for a queued job it is a pure
    /// metadata transition.
    pub fn cancel(&self, id: &JobId) -> anyhow::Result<bool> {
        let cancelled = {
            let conn = lock(&self.inner.conn)?;
            ops::jobs::get_job(&conn, id)?
                .ok_or_else(|| VaultError::JobNotFound { id: id.to_string() })?;
            ops::jobs::cancel_job(&conn, id)?
        };
        if let Some(flag) = lock(&self.inner.cancel_flags)?.get(id) {
            flag.store(true, Ordering::SeqCst);
        }
        Ok(cancelled)
    }

    /// Stop claiming new jobs and wait for in-flight workers to finish their
    /// current job.
    pub fn shutdown(self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers {
            let _ = worker.join();
        }
        tracing::info!("scheduler stopped");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> anyhow::Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow::anyhow!("scheduler state poisoned"))
}

fn worker_loop(inner: Arc<Inner>) {
    let idle = Duration::from_millis(inner.config.poll_interval_ms);
    while !inner.shutdown.load(Ordering::SeqCst) {
        match claim(&inner) {
            Ok(Some(job)) => {
                let id = job.id.clone();
                if let Err(e) = run_one(&inner, job) {
                    tracing::error!(job = %id, error = %e, "worker failed to finalize job");
                }
                if let Ok(mut flags) = inner.cancel_flags.lock() {
                    flags.remove(&id);
                }
            }
            Ok(None) => std::thread::sleep(idle),
            Err(e) => {
                tracing::error!(error = %e, "job claim failed");
                std::thread::sleep(idle);
            }
        }
    }
}

fn claim(inner: &Arc<Inner>) -> anyhow::Result<Option<SlicingJob>> {
    let conn = lock(&inner.conn)?;
    let Some(job) = ops::jobs::claim_next_job(&conn)? else {
        return Ok(None);
    };
    ops::events::insert_event(&conn, &Event::job_started(&job))?;
    drop(conn);

    lock(&inner.cancel_flags)?.insert(job.id.clone(), Arc::new(AtomicBool::new(false)));
    tracing::info!(job = %job.id, checksum = %job.checksum, "job claimed");
    Ok(Some(job))
}

fn run_one(inner: &Arc<Inner>, job: SlicingJob) -> anyhow::Result<()> {
    let resolved = {
        let conn = lock(&inner.conn)?;
        resolve(&conn, &job)
    };
    let (file, slicer, profile) = match resolved {
        Ok(parts) => parts,
        // Broken references are a configuration problem, not a transient
        // slicing failure: fail immediately, no retry.
        Err(e) => {
            let conn = lock(&inner.conn)?;
            ops::jobs::fail_job(&conn, &job.id, &e.to_string())?;
            ops::events::insert_event(&conn, &Event::job_failed(&job.id, &e.to_string()))?;
            return Ok(());
        }
    };

    let cancel_flag = lock(&inner.cancel_flags)?
        .get(&job.id)
        .cloned()
        .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    // The slicer runs without holding the connection, so other workers and
    // submitters stay unblocked for the duration.
    let outcome = runner::invoke_slicer(
        &file.library_path,
        &slicer,
        &profile,
        &inner.config,
        &cancel_flag,
    )?;

    match outcome {
        RunOutcome::Completed(output) => finalize_success(inner, &job, output),
        RunOutcome::Failed { message } => finalize_failure(inner, &job, &message),
        RunOutcome::Cancelled => {
            tracing::info!(job = %job.id, "job cancelled, slicer process killed");
            Ok(())
        }
    }
}

fn resolve(
    conn: &Connection,
    job: &SlicingJob,
) -> anyhow::Result<(LibraryFile, SlicerConfig, SlicerProfile)> {
    let file = ops::files::get_canonical_by_checksum(conn, &job.checksum)?.ok_or_else(|| {
        VaultError::FileNotFound {
            checksum: job.checksum.clone(),
        }
    })?;
    let slicer = ops::slicers::get_slicer_by_id(conn, &job.slicer_id)?.ok_or_else(|| {
        VaultError::SlicerNotFound {
            id: job.slicer_id.to_string(),
        }
    })?;
    let profile = ops::slicers::get_profile_by_id(conn, &job.profile_id)?.ok_or_else(|| {
        VaultError::ProfileNotFound {
            id: job.profile_id.to_string(),
        }
    })?;
    Ok((file, slicer, profile))
}

fn finalize_success(
    inner: &Arc<Inner>,
    job: &SlicingJob,
    output: runner::SliceOutput,
) -> anyhow::Result<()> {
    let conn = lock(&inner.conn)?;

    // The artifact goes through the same dedup path as any other content.
    let artifact_name = output
        .artifact
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output.gcode".to_string());
    let source = SourceDescriptor::new(SourceType::Upload, "slicer", &artifact_name);
    let ingested = ingest::ingest_path(
        &conn,
        &inner.library_root,
        &output.artifact,
        source,
        false,
    )?;
    let artifact = ingested.file();

    let completed = ops::jobs::complete_job(
        &conn,
        &job.id,
        &artifact.library_path,
        Some(&artifact.checksum),
        output.estimated_print_time_seconds,
        output.estimated_filament_grams,
    )?;
    if !completed {
        // Cancelled between process exit and finalize; the artifact stays in
        // the library, the job row keeps its terminal state.
        tracing::info!(job = %job.id, "job no longer running at completion, leaving as-is");
        return Ok(());
    }

    let refreshed = ops::jobs::get_job(&conn, &job.id)?
        .ok_or_else(|| VaultError::JobNotFound {
            id: job.id.to_string(),
        })?;
    ops::events::insert_event(&conn, &Event::job_completed(&refreshed))?;
    tracing::info!(job = %job.id, artifact = %artifact.checksum, "job completed");

    // Post-steps never revert completed status; their failures are reported
    // as printer events.
    if refreshed.auto_upload {
        if let Some(printer_id) = refreshed.printer_id.as_deref() {
            deliver(inner, &conn, &refreshed, printer_id, &artifact.library_path)?;
        }
    }
    Ok(())
}

fn deliver(
    inner: &Arc<Inner>,
    conn: &Connection,
    job: &SlicingJob,
    printer_id: &str,
    artifact: &std::path::Path,
) -> anyhow::Result<()> {
    if let Err(e) = inner.transfer.upload(printer_id, artifact) {
        tracing::warn!(job = %job.id, printer = printer_id, error = %e, "artifact upload failed");
        ops::events::insert_event(conn, &Event::printer_error(printer_id, &e.to_string()))?;
        return Ok(());
    }
    if job.auto_start {
        if let Err(e) = inner.transfer.start_print(printer_id, artifact) {
            tracing::warn!(job = %job.id, printer = printer_id, error = %e, "print start failed");
            ops::events::insert_event(conn, &Event::printer_error(printer_id, &e.to_string()))?;
        }
    }
    Ok(())
}

fn finalize_failure(inner: &Arc<Inner>, job: &SlicingJob, message: &str) -> anyhow::Result<()> {
    let conn = lock(&inner.conn)?;
    if job.retry_count < inner.config.max_retries && inner.config.auto_retry {
        let requeued = ops::jobs::requeue_job(&conn, &job.id, message)?;
        if requeued {
            tracing::warn!(
                job = %job.id,
                retry = job.retry_count + 1,
                error = message,
                "job failed, requeued"
            );
            return Ok(());
        }
        // Cancelled mid-flight; nothing to requeue.
        return Ok(());
    }

    if ops::jobs::fail_job(&conn, &job.id, message)? {
        ops::events::insert_event(&conn, &Event::job_failed(&job.id, message))?;
        tracing::error!(job = %job.id, error = message, "job failed, retries exhausted");
    }
    Ok(())
}
