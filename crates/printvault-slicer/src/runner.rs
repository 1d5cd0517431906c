use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use printvault_core::config::SlicingConfig;
use printvault_core::models::slicer::{SlicerConfig, SlicerProfile, SlicerType};
use tempfile::TempDir;

/// What one slicer invocation produced. The artifact lives in a scratch
/// directory owned by this value; it must be copied out (ingested) before the
/// value is dropped.
#[derive(Debug)]
pub struct SliceOutput {
    pub artifact: PathBuf,
    pub estimated_print_time_seconds: Option<u64>,
    pub estimated_filament_grams: Option<f64>,
    _workdir: TempDir,
}

/// Terminal result of one slicer invocation.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(SliceOutput),
    /// Launch failure, non-zero exit, timeout, or missing output. Retried by
    /// the scheduler per policy.
    Failed { message: String },
    /// The cancel flag was raised; the child process has been killed.
    Cancelled,
}

/// Run one slicer invocation to completion, killing the child process on
/// timeout or when `cancel` is raised. Launch failures and bad exits are
/// reported as `Failed`, never as `Err`; only environmental problems
/// (scratch-dir I/O) propagate.
pub fn invoke_slicer(
    input: &Path,
    slicer: &SlicerConfig,
    profile: &SlicerProfile,
    config: &SlicingConfig,
    cancel: &AtomicBool,
) -> anyhow::Result<RunOutcome> {
    let workdir = TempDir::new()?;
    let profile_path = workdir.path().join("profile.ini");
    write_profile_ini(&profile_path, profile)?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let output_path = workdir.path().join(format!("{stem}.gcode"));

    let stdout_log = std::fs::File::create(workdir.path().join("stdout.log"))?;
    let stderr_log = std::fs::File::create(workdir.path().join("stderr.log"))?;

    let mut command = Command::new(&slicer.executable);
    command
        .args(build_args(slicer.slicer_type, input, &profile_path, &output_path))
        .stdin(Stdio::null())
        .stdout(stdout_log)
        .stderr(stderr_log);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Ok(RunOutcome::Failed {
                message: format!("failed to launch {}: {e}", slicer.executable.display()),
            });
        }
    };

    let deadline = Instant::now() + Duration::from_secs(config.timeout_seconds);
    let poll = Duration::from_millis(config.poll_interval_ms);
    let status = loop {
        if cancel.load(Ordering::SeqCst) {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(RunOutcome::Cancelled);
        }
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Ok(RunOutcome::Failed {
                        message: format!(
                            "slicer timed out after {}s",
                            config.timeout_seconds
                        ),
                    });
                }
                std::thread::sleep(poll);
            }
        }
    };

    if !status.success() {
        let diagnostics = tail_of(&workdir.path().join("stderr.log"), 5);
        return Ok(RunOutcome::Failed {
            message: format!("slicer exited with {status}: {diagnostics}"),
        });
    }
    if !output_path.exists() {
        return Ok(RunOutcome::Failed {
            message: "slicer exited successfully but produced no output".to_string(),
        });
    }

    let (time, filament) = parse_gcode_estimates(&output_path)?;
    Ok(RunOutcome::Completed(SliceOutput {
        artifact: output_path,
        estimated_print_time_seconds: time,
        estimated_filament_grams: filament,
        _workdir: workdir,
    }))
}

/// CLI argument shape per slicer family. Orca and Bambu Studio follow the
/// PrusaSlicer console interface; CuraEngine has its own.
fn build_args(
    slicer_type: SlicerType,
    input: &Path,
    profile: &Path,
    output: &Path,
) -> Vec<std::ffi::OsString> {
    match slicer_type {
        SlicerType::PrusaSlicer | SlicerType::OrcaSlicer | SlicerType::BambuStudio => vec![
            "--export-gcode".into(),
            input.into(),
            "--load".into(),
            profile.into(),
            "--output".into(),
            output.into(),
        ],
        SlicerType::Cura => vec![
            "slice".into(),
            "-l".into(),
            input.into(),
            "-o".into(),
            output.into(),
        ],
    }
}

/// Render normalized settings back into the flat `key = value` form every
/// supported slicer accepts with `--load`.
fn write_profile_ini(path: &Path, profile: &SlicerProfile) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)?;
    if let Some(map) = profile.settings.as_object() {
        for (key, value) in map {
            match value {
                serde_json::Value::String(s) => writeln!(file, "{key} = {s}")?,
                other => writeln!(file, "{key} = {other}")?,
            }
        }
    }
    Ok(())
}

/// Pull print-time and filament-usage estimates out of the G-code comment
/// trailer. Absent estimates are not an error.
pub fn parse_gcode_estimates(path: &Path) -> anyhow::Result<(Option<u64>, Option<f64>)> {
    let file = std::fs::File::open(path)?;
    let mut time = None;
    let mut filament = None;
    for line in BufReader::new(file).lines() {
        let line = line?;
        let Some(comment) = line.trim().strip_prefix(';') else {
            continue;
        };
        let Some((key, value)) = comment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.starts_with("estimated printing time") && time.is_none() {
            time = parse_duration(value);
        } else if key.starts_with("filament used [g]") && filament.is_none() {
            filament = value.parse().ok();
        }
    }
    Ok((time, filament))
}

/// Parse slicer duration strings like `1d 2h 32m 10s` into seconds.
pub fn parse_duration(text: &str) -> Option<u64> {
    let mut total = 0u64;
    let mut matched = false;
    for token in text.split_whitespace() {
        let (number, unit) = token.split_at(token.len().checked_sub(1)?);
        let number: u64 = number.parse().ok()?;
        total += match unit {
            "d" => number * 86400,
            "h" => number * 3600,
            "m" => number * 60,
            "s" => number,
            _ => return None,
        };
        matched = true;
    }
    matched.then_some(total)
}

fn tail_of(path: &Path, lines: usize) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return "(no diagnostic output)".to_string();
    };
    let all: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = all.len().saturating_sub(lines);
    if all.is_empty() {
        "(no diagnostic output)".to_string()
    } else {
        all[start..].join(" | ")
    }
}
