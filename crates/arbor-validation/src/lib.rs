//! # arbor-validation
//!
//! Test command execution for Arbor tasks.
//!
//! This crate provides:
//! - Timeout-bounded execution of a task's declared test commands
//! - Strict AND semantics across commands, with all outputs retained
//! - Best-effort pass/fail/skip count extraction per framework

mod parse;
mod runner;

pub use parse::{parse_counts, TestCounts};
pub use runner::{overall_passed, TestResult, TestRunner, DEFAULT_TEST_TIMEOUT};
