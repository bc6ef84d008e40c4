//! Log and report artifact writing
//!
//! Every attempt writes uniquely named files (UTC timestamps with
//! millisecond precision), so concurrent executors against different refs
//! never collide as long as their directories are disjoint. Timestamps here
//! are for naming only; they never participate in state decisions.

use arbor_core::{Result, TaskReport};
use arbor_validation::TestResult;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

fn timestamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string()
}

/// Write a phase transcript log with labeled sections
///
/// File name: `<task_id>_<phase>_<timestamp>.log`
pub fn write_phase_log(
    log_dir: &Path,
    task_id: &str,
    phase: &str,
    sections: &[(&str, &str)],
) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(format!("{}_{}_{}.log", task_id, phase, timestamp()));

    let mut content = String::new();
    for (label, text) in sections {
        content.push_str(&format!("=== {} ===\n", label));
        content.push_str(text);
        if !text.ends_with('\n') {
            content.push('\n');
        }
        content.push('\n');
    }

    fs::write(&path, content)?;
    debug!("Wrote {} log: {}", phase, path.display());
    Ok(path)
}

/// Write the per-command failure log for a test step
///
/// File name: `<task_id>_test_<timestamp>.log`, one stdout/stderr section
/// pair per command, including the commands that passed.
pub fn write_test_log(log_dir: &Path, task_id: &str, results: &[TestResult]) -> Result<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let path = log_dir.join(format!("{}_test_{}.log", task_id, timestamp()));

    let mut content = String::new();
    for result in results {
        content.push_str(&format!(
            "=== COMMAND ({}) {} ===\nstatus: {}\n",
            result.kind,
            result.command,
            if result.passed { "pass" } else { "fail" }
        ));
        content.push_str("=== STDOUT ===\n");
        content.push_str(&result.stdout);
        if !result.stdout.ends_with('\n') {
            content.push('\n');
        }
        content.push_str("=== STDERR ===\n");
        content.push_str(&result.stderr);
        if !result.stderr.ends_with('\n') {
            content.push('\n');
        }
        content.push('\n');
    }

    fs::write(&path, content)?;
    debug!("Wrote test log: {}", path.display());
    Ok(path)
}

/// Write the JSON run report for a task's terminal state
///
/// File name: `<task_id>_run_<timestamp>.json`
pub fn write_report(report_dir: &Path, report: &TaskReport) -> Result<PathBuf> {
    fs::create_dir_all(report_dir)?;
    let path = report_dir.join(format!("{}_run_{}.json", report.task_id, timestamp()));

    fs::write(&path, serde_json::to_string_pretty(report)?)?;
    debug!("Wrote report: {}", path.display());
    Ok(path)
}
