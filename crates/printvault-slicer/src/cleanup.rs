use chrono::{Duration, Utc};
use rusqlite::Connection;

use printvault_core::config::SlicingConfig;
use printvault_db::ops;
use printvault_library::organize;

/// Result of one cleanup sweep.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub purged_jobs: u64,
    pub purged_artifacts: u64,
    pub errors: Vec<String>,
}

/// Purge terminal jobs older than `slicing.cleanup_days`. Each purged job's
/// G-code artifact goes through the ordinary catalog delete path, so checksum
/// accounting (duplicate counters, tag counters, sources) stays consistent;
/// an artifact still referenced by a younger job is left in place.
pub fn cleanup_jobs(conn: &Connection, config: &SlicingConfig) -> anyhow::Result<CleanupReport> {
    let cutoff = Utc::now() - Duration::days(config.cleanup_days as i64);
    let mut report = CleanupReport::default();

    for job in ops::jobs::list_terminal_older_than(conn, cutoff)? {
        let artifact_checksum = job.output_gcode_checksum.clone();
        ops::jobs::delete_job(conn, &job.id)?;
        report.purged_jobs += 1;

        let Some(checksum) = artifact_checksum else {
            continue;
        };
        if ops::jobs::count_jobs_with_output(conn, &checksum)? > 0 {
            continue;
        }
        match ops::files::get_canonical_by_checksum(conn, &checksum)? {
            Some(file) => match organize::delete_file(conn, &file.id) {
                Ok(_) => report.purged_artifacts += 1,
                // Live duplicates or other holds keep the artifact around.
                Err(e) => report.errors.push(format!("{checksum}: {e}")),
            },
            None => {}
        }
    }

    tracing::info!(
        purged_jobs = report.purged_jobs,
        purged_artifacts = report.purged_artifacts,
        errors = report.errors.len(),
        "cleanup sweep finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printvault_core::models::job::{JobStatus, SlicingJob};
    use printvault_core::models::slicer::{
        ProfileId, ProfileType, SlicerConfig, SlicerId, SlicerProfile, SlicerType,
    };
    use printvault_core::models::source::SourceType;
    use printvault_library::ingest::{self, SourceDescriptor};
    use std::path::Path;
    use tempfile::TempDir;

    fn fixture(conn: &Connection) -> (SlicerId, ProfileId) {
        let slicer = ops::slicers::upsert_slicer(
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
        ops::slicers::upsert_profile(conn, &profile).unwrap();
        (slicer.id, profile.id)
    }

    fn completed_job_with_artifact(
        conn: &Connection,
        library_root: &Path,
        slicer_id: &SlicerId,
        profile_id: &ProfileId,
        model_checksum: &str,
        gcode_body: &str,
        age_days: i64,
    ) -> (SlicingJob, String) {
        let staging = TempDir::new().unwrap();
        let gcode = staging.path().join("out.gcode");
        std::fs::write(&gcode, gcode_body).unwrap();
        let artifact = ingest::ingest_path(
            conn,
            library_root,
            &gcode,
            SourceDescriptor::new(SourceType::Upload, "slicer", "out.gcode"),
            false,
        )
        .unwrap();
        let artifact = artifact.file().clone();

        let mut job = SlicingJob::new(
            model_checksum.to_string(),
            slicer_id.clone(),
            profile_id.clone(),
        );
        job.created_at = Utc::now() - Duration::days(age_days);
        ops::jobs::insert_job(conn, &job).unwrap();
        let claimed = ops::jobs::claim_next_job(conn).unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        ops::jobs::complete_job(
            conn,
            &job.id,
            &artifact.library_path,
            Some(&artifact.checksum),
            None,
            None,
        )
        .unwrap();
        (job, artifact.checksum)
    }

    fn ingest_model(conn: &Connection, library_root: &Path) -> String {
        let staging = TempDir::new().unwrap();
        let model = staging.path().join("benchy.stl");
        std::fs::write(&model, "solid benchy").unwrap();
        ingest::ingest_path(
            conn,
            library_root,
            &model,
            SourceDescriptor::new(SourceType::Upload, "cli", "benchy.stl"),
            false,
        )
        .unwrap()
        .file()
        .checksum
        .clone()
    }

    #[test]
    fn test_old_terminal_jobs_purged_with_artifacts() {
        let conn = printvault_db::open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library_root = dir.path().join("library");
        let (slicer_id, profile_id) = fixture(&conn);
        let model = ingest_model(&conn, &library_root);

        let (old_job, artifact_checksum) = completed_job_with_artifact(
            &conn,
            &library_root,
            &slicer_id,
            &profile_id,
            &model,
            "G1 X0\n",
            40,
        );

        let report = cleanup_jobs(&conn, &SlicingConfig::default()).unwrap();
        assert_eq!(report.purged_jobs, 1);
        assert_eq!(report.purged_artifacts, 1);
        assert!(report.errors.is_empty());
        assert!(ops::jobs::get_job(&conn, &old_job.id).unwrap().is_none());
        assert!(
            ops::files::get_canonical_by_checksum(&conn, &artifact_checksum)
                .unwrap()
                .is_none()
        );
        // The source model is untouched.
        assert!(ops::files::get_canonical_by_checksum(&conn, &model)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_recent_jobs_kept() {
        let conn = printvault_db::open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library_root = dir.path().join("library");
        let (slicer_id, profile_id) = fixture(&conn);
        let model = ingest_model(&conn, &library_root);

        completed_job_with_artifact(
            &conn,
            &library_root,
            &slicer_id,
            &profile_id,
            &model,
            "G1 X0\n",
            1,
        );

        let report = cleanup_jobs(&conn, &SlicingConfig::default()).unwrap();
        assert_eq!(report.purged_jobs, 0);
        assert_eq!(report.purged_artifacts, 0);
    }

    #[test]
    fn test_shared_artifact_survives_until_last_reference() {
        let conn = printvault_db::open_memory_db().unwrap();
        let dir = TempDir::new().unwrap();
        let library_root = dir.path().join("library");
        let (slicer_id, profile_id) = fixture(&conn);
        let model = ingest_model(&conn, &library_root);

        // Two jobs produced byte-identical G-code: one canonical artifact.
        let (_old, checksum_a) = completed_job_with_artifact(
            &conn,
            &library_root,
            &slicer_id,
            &profile_id,
            &model,
            "G1 X0\n",
            40,
        );
        let (_recent, checksum_b) = completed_job_with_artifact(
            &conn,
            &library_root,
            &slicer_id,
            &profile_id,
            &model,
            "G1 X0\n",
            0,
        );
        assert_eq!(checksum_a, checksum_b);

        let report = cleanup_jobs(&conn, &SlicingConfig::default()).unwrap();
        assert_eq!(report.purged_jobs, 1);
        assert_eq!(report.purged_artifacts, 0);
        assert!(ops::files::get_canonical_by_checksum(&conn, &checksum_a)
            .unwrap()
            .is_some());
    }
}
