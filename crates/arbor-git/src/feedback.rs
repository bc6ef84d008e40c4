//! Retry feedback extraction from commit history
//!
//! A retried task needs to know why its previous attempt was rejected. That
//! context lives in the bodies of the task's review-rejected and test-fail
//! commits, so a process restarted between attempts reconstructs identical
//! feedback from history alone. No in-memory retry state exists anywhere.

use crate::command::GitExecutor;
use crate::repo::{CommitEntry, GitRepo};
use crate::trailer::{keys, message_body, parse_subject, parse_trailers};
use arbor_core::Result;
use tracing::{debug, instrument};

/// Extracts prior-failure context for retry prompts
pub struct FeedbackCollector<E: GitExecutor> {
    repo: GitRepo<E>,
}

impl<E: GitExecutor> FeedbackCollector<E> {
    pub fn new(executor: E) -> Self {
        Self {
            repo: GitRepo::new(executor),
        }
    }

    /// Formatted feedback from the task's most recent rejection and test
    /// failure, or an empty string when no prior failures exist
    #[instrument(skip(self))]
    pub async fn collect_feedback(&self, task_id: &str, ref_name: &str) -> Result<String> {
        let log = self.repo.log(ref_name).await?;

        let review = latest_matching(&log, task_id, |trailers| {
            trailers.get(keys::STEP).map(String::as_str) == Some("review")
                && trailers.get(keys::REVIEW).map(String::as_str) == Some("rejected")
        });
        let test = latest_matching(&log, task_id, |trailers| {
            trailers.get(keys::STEP).map(String::as_str) == Some("test")
                && trailers.get(keys::TEST).map(String::as_str) == Some("fail")
        });

        let mut sections = Vec::new();

        if let Some(entry) = review {
            let body = message_body(&entry.message);
            if !body.is_empty() {
                let attempt = attempt_of(entry);
                sections.push(format!(
                    "## Reviewer feedback from attempt {}\n\n{}",
                    attempt, body
                ));
            }
        }

        if let Some(entry) = test {
            let body = message_body(&entry.message);
            if !body.is_empty() {
                let attempt = attempt_of(entry);
                sections.push(format!(
                    "## Test failures from attempt {}\n\n{}",
                    attempt, body
                ));
            }
        }

        debug!("Collected {} feedback sections", sections.len());
        Ok(sections.join("\n\n"))
    }
}

fn latest_matching<'a, F>(
    log: &'a [CommitEntry],
    task_id: &str,
    predicate: F,
) -> Option<&'a CommitEntry>
where
    F: Fn(&crate::trailer::Trailers) -> bool,
{
    log.iter().find(|entry| {
        let Some(parts) = parse_subject(&entry.subject) else {
            return false;
        };
        if parts.task_id != task_id {
            return false;
        }
        predicate(&parse_trailers(&entry.message))
    })
}

fn attempt_of(entry: &CommitEntry) -> String {
    parse_trailers(&entry.message)
        .get(keys::RETRY)
        .cloned()
        .unwrap_or_else(|| "0".to_string())
}
