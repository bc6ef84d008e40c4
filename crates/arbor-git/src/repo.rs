//! Typed repository operations over the executor trait
//!
//! Only the minimal capability set the engine needs: add-all-and-commit
//! (empty commits allowed), a filtered log read, diff-stat between two refs,
//! and ref resolution. Anything beyond this set is deliberately absent.

use crate::command::{GitExecutor, GitOutput};
use arbor_core::{ArborError, Result};
use tracing::{debug, instrument};

/// Log record format: commit id, subject, and full message separated by
/// unit separators, records separated by a record separator. Keeps bodies
/// with embedded newlines parseable from a single log read.
const LOG_FORMAT: &str = "--format=%H%x1f%s%x1f%B%x1e";

/// One commit from a log read, newest first
#[derive(Debug, Clone)]
pub struct CommitEntry {
    pub commit_id: String,
    pub subject: String,
    /// Full message: subject, body, trailers
    pub message: String,
}

/// Repository operations for task execution
pub struct GitRepo<E: GitExecutor> {
    executor: E,
}

impl<E: GitExecutor> GitRepo<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Stage everything and commit, allowing empty commits
    ///
    /// Empty commits matter: a failed implement attempt may change nothing,
    /// but the attempt itself must still be durably recorded.
    #[instrument(skip(self, message))]
    pub async fn commit_all(&self, message: &str) -> Result<()> {
        let add = self.executor.exec(&["add", "-A"]).await?;
        if !add.success {
            return Err(ArborError::GitCommand(format!(
                "Failed to stage changes: {}",
                add.stderr
            )));
        }

        let commit = self
            .executor
            .exec(&["commit", "--allow-empty", "-m", message])
            .await?;
        if !commit.success {
            return Err(ArborError::GitCommand(format!(
                "Failed to commit: {}",
                commit.stderr
            )));
        }

        debug!("Committed: {}", message.lines().next().unwrap_or(""));
        Ok(())
    }

    /// Read the commit log for a ref, newest first
    ///
    /// History order here is the single source of truth for task state; an
    /// unborn ref reads as an empty history rather than an error.
    #[instrument(skip(self))]
    pub async fn log(&self, ref_name: &str) -> Result<Vec<CommitEntry>> {
        let output = self.executor.exec(&["log", ref_name, LOG_FORMAT]).await?;

        if !output.success {
            if is_empty_history(&output) {
                return Ok(Vec::new());
            }
            return Err(ArborError::GitCommand(format!(
                "Failed to read log for {}: {}",
                ref_name, output.stderr
            )));
        }

        Ok(parse_log_records(&output.stdout))
    }

    /// Diff-stat between two refs
    pub async fn diff_stat(&self, from: &str, to: &str) -> Result<String> {
        let range = format!("{}..{}", from, to);
        let output = self.executor.exec(&["diff", "--stat", &range]).await?;

        if !output.success {
            return Err(ArborError::GitCommand(format!(
                "Failed to diff {}: {}",
                range, output.stderr
            )));
        }

        Ok(output.stdout)
    }

    /// Symbolic name of the current ref
    pub async fn current_ref(&self) -> Result<String> {
        let output = self
            .executor
            .exec(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;

        if !output.success {
            return Err(ArborError::GitCommand(format!(
                "Failed to resolve current ref: {}",
                output.stderr
            )));
        }

        Ok(output.stdout.trim().to_string())
    }

    /// Commit id of the current head
    pub async fn head(&self) -> Result<String> {
        let output = self.executor.exec(&["rev-parse", "HEAD"]).await?;

        if !output.success {
            return Err(ArborError::GitCommand(format!(
                "Failed to resolve HEAD: {}",
                output.stderr
            )));
        }

        Ok(output.stdout.trim().to_string())
    }
}

fn is_empty_history(output: &GitOutput) -> bool {
    output.stderr.contains("does not have any commits")
        || output.stderr.contains("unknown revision")
}

fn parse_log_records(stdout: &str) -> Vec<CommitEntry> {
    stdout
        .split('\x1e')
        .map(|record| record.trim_matches('\n'))
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let mut fields = record.splitn(3, '\x1f');
            let commit_id = fields.next()?.trim().to_string();
            let subject = fields.next()?.to_string();
            let message = fields.next()?.to_string();
            if commit_id.is_empty() {
                return None;
            }
            Some(CommitEntry {
                commit_id,
                subject,
                message,
            })
        })
        .collect()
}
