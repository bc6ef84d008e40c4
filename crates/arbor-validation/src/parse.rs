//! Best-effort test-count extraction
//!
//! Framework summary lines are matched with per-framework regexes. This is
//! deliberately lenient: output that matches no known pattern simply yields
//! no counts, and never fails an otherwise-passing test step.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Parsed pass/fail/skip counts from a test run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Frameworks tried in turn when none is declared
const KNOWN_FRAMEWORKS: &[&str] = &["cargo", "pytest", "jest"];

/// Extract counts from test output
///
/// With a framework hint only that framework's pattern is tried; otherwise
/// the known patterns are tried in turn and the first match wins.
pub fn parse_counts(output: &str, framework: Option<&str>) -> Option<TestCounts> {
    match framework {
        Some(framework) => parse_framework(output, framework),
        None => KNOWN_FRAMEWORKS
            .iter()
            .find_map(|framework| parse_framework(output, framework)),
    }
}

fn parse_framework(output: &str, framework: &str) -> Option<TestCounts> {
    match framework.to_lowercase().as_str() {
        "cargo" | "rust" => parse_cargo(output),
        "pytest" | "python" => parse_pytest(output),
        "jest" | "vitest" => parse_jest(output),
        _ => None,
    }
}

/// `test result: ok. 5 passed; 0 failed; 1 ignored; ...`
fn parse_cargo(output: &str) -> Option<TestCounts> {
    let re = Regex::new(r"(\d+) passed; (\d+) failed; (\d+) ignored").ok()?;
    let captures = re.captures(output)?;

    Some(TestCounts {
        passed: captures.get(1)?.as_str().parse().ok()?,
        failed: captures.get(2)?.as_str().parse().ok()?,
        skipped: captures.get(3)?.as_str().parse().ok()?,
    })
}

/// `=== 3 passed, 1 failed, 2 skipped in 0.12s ===` (pieces optional)
fn parse_pytest(output: &str) -> Option<TestCounts> {
    let passed = capture_count(output, r"(\d+) passed");
    let failed = capture_count(output, r"(\d+) failed");
    let skipped = capture_count(output, r"(\d+) skipped");

    // Cargo's summary also contains "passed"; require the pytest session
    // footer so the two do not shadow each other during auto-detection
    if !output.contains("====") {
        return None;
    }
    if passed.is_none() && failed.is_none() {
        return None;
    }

    Some(TestCounts {
        passed: passed.unwrap_or(0),
        failed: failed.unwrap_or(0),
        skipped: skipped.unwrap_or(0),
    })
}

/// `Tests:       1 failed, 2 skipped, 3 passed, 6 total`
fn parse_jest(output: &str) -> Option<TestCounts> {
    let line = output.lines().find(|l| l.trim_start().starts_with("Tests:"))?;

    let passed = capture_count(line, r"(\d+) passed");
    let failed = capture_count(line, r"(\d+) failed");
    let skipped = capture_count(line, r"(\d+) skipped");

    if passed.is_none() && failed.is_none() {
        return None;
    }

    Some(TestCounts {
        passed: passed.unwrap_or(0),
        failed: failed.unwrap_or(0),
        skipped: skipped.unwrap_or(0),
    })
}

fn capture_count(text: &str, pattern: &str) -> Option<u32> {
    let re = Regex::new(pattern).ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}
