//! # arbor-core
//!
//! Core types for the Arbor task-tree execution engine.
//!
//! Arbor tends a dependency-ordered tree of work items: each leaf task is
//! implemented by an external coding agent, tested, and reviewed, with every
//! transition durably recorded as a commit so a run can be interrupted and
//! resumed at any point.
//!
//! ## Core Paradigm
//!
//! - Leaf tasks are the atomic scheduling units; group nodes only organize
//! - Execution order is a deterministic topological sort over depends_on
//! - Task state is DERIVED from commit trailers, never held in memory
//! - Terminal states (Complete/Failed) are written exactly once

mod error;
mod tree;
mod types;

pub use error::{ArborError, Result};
pub use tree::TaskTree;
pub use types::*;
