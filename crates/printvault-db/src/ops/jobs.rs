use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use printvault_core::models::job::{JobId, JobStatus, SlicingJob};
use printvault_core::models::slicer::{ProfileId, SlicerId};

use super::{fmt_dt, fmt_dt_opt, parse_dt, parse_dt_opt};

const JOB_COLUMNS: &str = "id, checksum, slicer_id, profile_id, printer_id, status, priority, progress, \
     retry_count, auto_upload, auto_start, output_file_path, output_gcode_checksum, \
     error_message, estimated_print_time_seconds, estimated_filament_grams, \
     created_at, started_at, completed_at";

pub fn insert_job(conn: &Connection, job: &SlicingJob) -> anyhow::Result<()> {
    conn.execute(
        &format!("INSERT INTO slicing_jobs ({JOB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"),
        params![
            job.id.0.to_string(),
            job.checksum,
            job.slicer_id.0.to_string(),
            job.profile_id.0.to_string(),
            job.printer_id,
            job.status.to_string(),
            job.priority,
            job.progress as i64,
            job.retry_count as i64,
            job.auto_upload as i32,
            job.auto_start as i32,
            job.output_file_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            job.output_gcode_checksum,
            job.error_message,
            job.estimated_print_time_seconds.map(|s| s as i64),
            job.estimated_filament_grams,
            fmt_dt(&job.created_at),
            fmt_dt_opt(&job.started_at),
            fmt_dt_opt(&job.completed_at),
        ],
    )?;
    Ok(())
}

pub fn get_job(conn: &Connection, id: &JobId) -> anyhow::Result<Option<SlicingJob>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM slicing_jobs WHERE id = ?1"
    ))?;
    let job = stmt
        .query_row(params![id.0.to_string()], row_to_job)
        .optional()?;
    Ok(job)
}

pub fn list_jobs(conn: &Connection, limit: u32) -> anyhow::Result<Vec<SlicingJob>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM slicing_jobs ORDER BY created_at DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit], row_to_job)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_jobs_by_status(
    conn: &Connection,
    status: JobStatus,
) -> anyhow::Result<Vec<SlicingJob>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM slicing_jobs WHERE status = ?1
         ORDER BY priority DESC, created_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![status.to_string()], row_to_job)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn count_by_status(conn: &Connection, status: JobStatus) -> anyhow::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM slicing_jobs WHERE status = ?1",
        params![status.to_string()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Atomically claim the next queued job: highest priority first, FIFO within
/// equal priority. The queued -> running transition is the sole mutual
/// exclusion point; the conditional UPDATE only succeeds while the row is
/// still queued, so no two workers can claim the same job.
pub fn claim_next_job(conn: &Connection) -> anyhow::Result<Option<SlicingJob>> {
    let tx = conn.unchecked_transaction()?;
    loop {
        let candidate: Option<String> = tx
            .query_row(
                "SELECT id FROM slicing_jobs WHERE status = 'queued'
                 ORDER BY priority DESC, created_at ASC, id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let id = match candidate {
            Some(id) => id,
            None => {
                tx.commit()?;
                return Ok(None);
            }
        };

        let claimed = tx.execute(
            "UPDATE slicing_jobs SET status = 'running', started_at = ?1, progress = 50
             WHERE id = ?2 AND status = 'queued'",
            params![fmt_dt(&Utc::now()), id],
        )?;
        if claimed == 1 {
            let mut stmt = tx.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM slicing_jobs WHERE id = ?1"
            ))?;
            let job = stmt.query_row(params![id], row_to_job)?;
            drop(stmt);
            tx.commit()?;
            return Ok(Some(job));
        }
        // Someone else won the race for this row; pick again.
    }
}

pub fn set_progress(conn: &Connection, id: &JobId, progress: u8) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE slicing_jobs SET progress = ?1 WHERE id = ?2 AND status = 'running'",
        params![progress.min(100) as i64, id.0.to_string()],
    )?;
    Ok(())
}

/// running -> completed.
pub fn complete_job(
    conn: &Connection,
    id: &JobId,
    output_file_path: &std::path::Path,
    output_gcode_checksum: Option<&str>,
    estimated_print_time_seconds: Option<u64>,
    estimated_filament_grams: Option<f64>,
) -> anyhow::Result<bool> {
    let updated = conn.execute(
        "UPDATE slicing_jobs SET status = 'completed', progress = 100, completed_at = ?1,
            output_file_path = ?2, output_gcode_checksum = ?3,
            estimated_print_time_seconds = ?4, estimated_filament_grams = ?5
         WHERE id = ?6 AND status = 'running'",
        params![
            fmt_dt(&Utc::now()),
            output_file_path.to_string_lossy().to_string(),
            output_gcode_checksum,
            estimated_print_time_seconds.map(|s| s as i64),
            estimated_filament_grams,
            id.0.to_string(),
        ],
    )?;
    Ok(updated == 1)
}

/// running -> queued with an incremented retry_count. Returns false if the job
/// was no longer running (e.g. cancelled mid-flight).
pub fn requeue_job(conn: &Connection, id: &JobId, error: &str) -> anyhow::Result<bool> {
    let updated = conn.execute(
        "UPDATE slicing_jobs SET status = 'queued', retry_count = retry_count + 1,
            started_at = NULL, progress = 0, error_message = ?1
         WHERE id = ?2 AND status = 'running'",
        params![error, id.0.to_string()],
    )?;
    Ok(updated == 1)
}

/// running -> failed, terminal.
pub fn fail_job(conn: &Connection, id: &JobId, error: &str) -> anyhow::Result<bool> {
    let updated = conn.execute(
        "UPDATE slicing_jobs SET status = 'failed', completed_at = ?1, error_message = ?2
         WHERE id = ?3 AND status = 'running'",
        params![fmt_dt(&Utc::now()), error, id.0.to_string()],
    )?;
    Ok(updated == 1)
}

/// queued|running -> cancelled. Terminal states are left untouched.
pub fn cancel_job(conn: &Connection, id: &JobId) -> anyhow::Result<bool> {
    let updated = conn.execute(
        "UPDATE slicing_jobs SET status = 'cancelled', completed_at = ?1
         WHERE id = ?2 AND status IN ('queued', 'running')",
        params![fmt_dt(&Utc::now()), id.0.to_string()],
    )?;
    Ok(updated == 1)
}

/// Terminal jobs older than the cutoff, for the cleanup sweep.
pub fn list_terminal_older_than(
    conn: &Connection,
    cutoff: DateTime<Utc>,
) -> anyhow::Result<Vec<SlicingJob>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOB_COLUMNS} FROM slicing_jobs
         WHERE status IN ('completed', 'failed', 'cancelled') AND created_at < ?1
         ORDER BY created_at"
    ))?;
    let rows = stmt.query_map(params![fmt_dt(&cutoff)], row_to_job)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// How many jobs still reference a G-code artifact by checksum. Guards the
/// cleanup sweep against deleting an artifact another job produced too.
pub fn count_jobs_with_output(conn: &Connection, gcode_checksum: &str) -> anyhow::Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM slicing_jobs WHERE output_gcode_checksum = ?1",
        params![gcode_checksum],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn delete_job(conn: &Connection, id: &JobId) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM slicing_jobs WHERE id = ?1",
        params![id.0.to_string()],
    )?;
    Ok(())
}

pub fn delete_jobs_for_checksum(conn: &Connection, checksum: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM slicing_jobs WHERE checksum = ?1",
        params![checksum],
    )?;
    Ok(())
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<SlicingJob> {
    let id_str: String = row.get(0)?;
    let slicer_str: String = row.get(2)?;
    let profile_str: String = row.get(3)?;
    let status_str: String = row.get(5)?;
    let progress: i64 = row.get(7)?;
    let retry_count: i64 = row.get(8)?;
    let auto_upload: i32 = row.get(9)?;
    let auto_start: i32 = row.get(10)?;
    let output_path: Option<String> = row.get(11)?;
    let est_time: Option<i64> = row.get(14)?;
    let created_str: String = row.get(16)?;
    let started_str: Option<String> = row.get(17)?;
    let completed_str: Option<String> = row.get(18)?;

    Ok(SlicingJob {
        id: JobId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        checksum: row.get(1)?,
        slicer_id: SlicerId::from_uuid(Uuid::parse_str(&slicer_str).unwrap_or_default()),
        profile_id: ProfileId::from_uuid(Uuid::parse_str(&profile_str).unwrap_or_default()),
        printer_id: row.get(4)?,
        status: status_str.parse().unwrap_or(JobStatus::Queued),
        priority: row.get(6)?,
        progress: progress as u8,
        retry_count: retry_count as u32,
        auto_upload: auto_upload != 0,
        auto_start: auto_start != 0,
        output_file_path: output_path.map(Into::into),
        output_gcode_checksum: row.get(12)?,
        error_message: row.get(13)?,
        estimated_print_time_seconds: est_time.map(|s| s as u64),
        estimated_filament_grams: row.get(15)?,
        created_at: parse_dt(&created_str),
        started_at: parse_dt_opt(started_str),
        completed_at: parse_dt_opt(completed_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;
    use crate::ops::slicers;
    use printvault_core::models::slicer::{ProfileType, SlicerConfig, SlicerProfile, SlicerType};
    use std::path::Path;

    fn fixture(conn: &Connection) -> (SlicerId, ProfileId) {
        let slicer = slicers::upsert_slicer(
            conn,
            &SlicerConfig::new(SlicerType::PrusaSlicer, "/usr/bin/prusa-slicer".into()),
        )
        .unwrap();
        let profile = SlicerProfile::new(
            slicer.id.clone(),
            "0.2mm".into(),
            ProfileType::Print,
            serde_json::json!({}),
        );
        slicers::upsert_profile(conn, &profile).unwrap();
        (slicer.id, profile.id)
    }

    fn queued_job(
        conn: &Connection,
        slicer_id: &SlicerId,
        profile_id: &ProfileId,
        checksum: &str,
        priority: i32,
        created_at: DateTime<Utc>,
    ) -> SlicingJob {
        let mut job = SlicingJob::new(checksum.into(), slicer_id.clone(), profile_id.clone())
            .with_priority(priority);
        job.created_at = created_at;
        insert_job(conn, &job).unwrap();
        job
    }

    #[test]
    fn test_claim_order_priority_then_fifo() {
        let conn = open_memory_db().unwrap();
        let (slicer_id, profile_id) = fixture(&conn);

        let base = Utc::now();
        let priorities = [1, 5, 3, 5, 2];
        let mut ids = Vec::new();
        for (i, p) in priorities.iter().enumerate() {
            let job = queued_job(
                &conn,
                &slicer_id,
                &profile_id,
                &format!("c{i}"),
                *p,
                base + chrono::Duration::seconds(i as i64),
            );
            ids.push(job.id);
        }

        // Both priority-5 jobs first, earlier-created one leading.
        let first = claim_next_job(&conn).unwrap().unwrap();
        assert_eq!(first.id, ids[1]);
        let second = claim_next_job(&conn).unwrap().unwrap();
        assert_eq!(second.id, ids[3]);
        let third = claim_next_job(&conn).unwrap().unwrap();
        assert_eq!(third.id, ids[2]);
        assert_eq!(third.priority, 3);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let conn = open_memory_db().unwrap();
        let (slicer_id, profile_id) = fixture(&conn);
        queued_job(&conn, &slicer_id, &profile_id, "c1", 0, Utc::now());

        assert!(claim_next_job(&conn).unwrap().is_some());
        assert!(claim_next_job(&conn).unwrap().is_none());
        assert_eq!(count_by_status(&conn, JobStatus::Running).unwrap(), 1);
    }

    #[test]
    fn test_retry_and_fail_transitions() {
        let conn = open_memory_db().unwrap();
        let (slicer_id, profile_id) = fixture(&conn);
        queued_job(&conn, &slicer_id, &profile_id, "c1", 0, Utc::now());

        let job = claim_next_job(&conn).unwrap().unwrap();
        assert!(requeue_job(&conn, &job.id, "slicer crashed").unwrap());

        let retried = get_job(&conn, &job.id).unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.started_at.is_none());

        let job = claim_next_job(&conn).unwrap().unwrap();
        assert!(fail_job(&conn, &job.id, "slicer crashed again").unwrap());
        let failed = get_job(&conn, &job.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("slicer crashed again")
        );

        // Terminal: no further transition applies.
        assert!(!cancel_job(&conn, &job.id).unwrap());
        assert!(!requeue_job(&conn, &job.id, "x").unwrap());
    }

    #[test]
    fn test_cancel_queued_and_running() {
        let conn = open_memory_db().unwrap();
        let (slicer_id, profile_id) = fixture(&conn);
        let queued = queued_job(&conn, &slicer_id, &profile_id, "c1", 0, Utc::now());
        queued_job(&conn, &slicer_id, &profile_id, "c2", 0, Utc::now());

        assert!(cancel_job(&conn, &queued.id).unwrap());
        let running = claim_next_job(&conn).unwrap().unwrap();
        assert_eq!(running.checksum, "c2");
        assert!(cancel_job(&conn, &running.id).unwrap());

        assert_eq!(count_by_status(&conn, JobStatus::Cancelled).unwrap(), 2);
    }

    #[test]
    fn test_complete_sets_artifacts() {
        let conn = open_memory_db().unwrap();
        let (slicer_id, profile_id) = fixture(&conn);
        queued_job(&conn, &slicer_id, &profile_id, "c1", 0, Utc::now());

        let job = claim_next_job(&conn).unwrap().unwrap();
        assert!(complete_job(
            &conn,
            &job.id,
            Path::new("/library/gcode/benchy.gcode"),
            Some("g1"),
            Some(5400),
            Some(13.5),
        )
        .unwrap());

        let done = get_job(&conn, &job.id).unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.output_gcode_checksum.as_deref(), Some("g1"));
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_cleanup_selects_only_old_terminal_jobs() {
        let conn = open_memory_db().unwrap();
        let (slicer_id, profile_id) = fixture(&conn);

        let old = Utc::now() - chrono::Duration::days(40);
        let old_job = queued_job(&conn, &slicer_id, &profile_id, "c1", 0, old);
        // Old but still queued: not eligible.
        queued_job(&conn, &slicer_id, &profile_id, "c2", 0, old);
        // Recent terminal: not eligible.
        let recent = queued_job(&conn, &slicer_id, &profile_id, "c3", 0, Utc::now());

        cancel_job(&conn, &old_job.id).unwrap();
        cancel_job(&conn, &recent.id).unwrap();

        let cutoff = Utc::now() - chrono::Duration::days(30);
        let eligible = list_terminal_older_than(&conn, cutoff).unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, old_job.id);
    }
}
