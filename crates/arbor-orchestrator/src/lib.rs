//! # arbor-orchestrator
//!
//! Task execution engine for Arbor.
//!
//! This crate provides:
//! - The single-task executor ("garden"): one ready task through
//!   implement → test → review with bounded retries, every transition
//!   durably committed
//! - The scheduling loop ("gardener"): repeat until nothing is ready
//! - Prompt construction for implement and review agents
//! - Log and report artifact writing
//!
//! Durability is the organizing principle: the executor holds no state a
//! crash could lose. Selection, resume point, and retry feedback are all
//! reconstructed from commit history on every invocation.

mod approval;
mod artifacts;
mod garden;
mod gardener;
mod prompt;

pub use approval::{ApprovalPolicy, MarkerApproval, APPROVAL_MARKER};
pub use artifacts::{write_phase_log, write_report, write_test_log};
pub use garden::{Garden, GardenConfig};
pub use gardener::Gardener;
pub use prompt::{build_implement_prompt, build_review_prompt};
