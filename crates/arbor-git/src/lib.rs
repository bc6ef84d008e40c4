//! # arbor-git
//!
//! Git integration layer for Arbor.
//!
//! This crate provides:
//! - Git command execution abstraction
//! - The task commit wire format (subject grammar + trailers)
//! - State reconstruction from commit history
//! - Retry feedback extraction from commit bodies
//!
//! Only a minimal capability surface is required of the VCS: add-all-and-commit
//! (supporting empty commits), a filtered log read with trailer extraction,
//! diff-stat between two refs, and current-ref resolution. Any backend exposing
//! that set through [`GitExecutor`] is sufficient.

mod command;
mod feedback;
mod repo;
mod scanner;
mod trailer;

pub use command::{GitCommand, GitExecutor, GitOutput, InMemoryGit, MockGitExecutor};
pub use feedback::FeedbackCollector;
pub use repo::{CommitEntry, GitRepo};
pub use scanner::{task_state_from_trailers, StateScanner};
pub use trailer::{
    format_commit_message, keys, parse_subject, parse_trailers, ReviewVerdict, Step, StepOutcome,
    SubjectParts, Trailers, MAX_BODY_BYTES,
};
