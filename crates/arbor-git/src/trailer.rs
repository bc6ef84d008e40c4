//! The task commit wire format
//!
//! Every durable state transition is a commit shaped as:
//!
//! ```text
//! task(<ref>@<task_id>@<status>): <subject text>
//!
//! <optional body, tail-truncated>
//!
//! Key: value
//! Key: value
//! ```
//!
//! The text format is the stable contract for external tooling reading the
//! same history. Inside the engine, raw trailer strings are parsed exactly
//! once into the typed enums below and never leak further.

use std::collections::BTreeMap;

/// Trailer keys (fixed vocabulary)
pub mod keys {
    /// Lifecycle step that produced the commit
    pub const STEP: &str = "Step";
    /// Implement/complete step outcome
    pub const RESULT: &str = "Result";
    /// Test step outcome
    pub const TEST: &str = "Test";
    /// Review step verdict
    pub const REVIEW: &str = "Review";
    /// Zero-based attempt index
    pub const RETRY: &str = "Retry";
    /// Run report path
    pub const REPORT: &str = "Report";
    /// Failed-test log path
    pub const TEST_LOG: &str = "Test-Log";
    /// Review transcript log path
    pub const REVIEW_LOG: &str = "Review-Log";
    /// Kind of the primary test command
    pub const TEST_TYPE: &str = "Test-Type";
    pub const TEST_PASSED: &str = "Test-Passed";
    pub const TEST_FAILED: &str = "Test-Failed";
    pub const TEST_SKIPPED: &str = "Test-Skipped";
    /// Primary test command runtime in seconds
    pub const TEST_RUNTIME: &str = "Test-Runtime";
}

/// Parsed trailer map, ordered by key for stable output
pub type Trailers = BTreeMap<String, String>;

/// Commit bodies are tail-truncated to keep history readable
pub const MAX_BODY_BYTES: usize = 4000;

/// Lifecycle step recorded in a task commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Implement,
    Test,
    Review,
    Complete,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Implement => write!(f, "implement"),
            Self::Test => write!(f, "test"),
            Self::Review => write!(f, "review"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl std::str::FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "implement" => Ok(Self::Implement),
            "test" => Ok(Self::Test),
            "review" => Ok(Self::Review),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Invalid step: {}", s)),
        }
    }
}

/// Pass/fail outcome for implement, test, and complete steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    Pass,
    Fail,
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl std::str::FromStr for StepOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            _ => Err(format!("Invalid outcome: {}", s)),
        }
    }
}

/// Review step verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewVerdict {
    Approved,
    Rejected,
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ReviewVerdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid verdict: {}", s)),
        }
    }
}

/// Parsed pieces of a task commit subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectParts {
    pub ref_name: String,
    pub task_id: String,
    pub status: String,
}

/// Render a full task commit message in the wire format
pub fn format_commit_message(
    ref_name: &str,
    task_id: &str,
    step: Step,
    text: &str,
    body: Option<&str>,
    trailers: &[(&str, String)],
) -> String {
    let mut message = format!("task({}@{}@{}): {}\n", ref_name, task_id, step, text);

    if let Some(body) = body {
        let body = truncate_tail(body.trim(), MAX_BODY_BYTES);
        if !body.is_empty() {
            message.push('\n');
            message.push_str(&body);
            message.push('\n');
        }
    }

    if !trailers.is_empty() {
        message.push('\n');
        for (key, value) in trailers {
            message.push_str(&format!("{}: {}\n", key, value));
        }
    }

    message
}

/// Parse a task commit subject line; None for commits outside the convention
pub fn parse_subject(subject: &str) -> Option<SubjectParts> {
    let rest = subject.strip_prefix("task(")?;
    let close = rest.find("): ")?;
    let inner = &rest[..close];

    let mut parts = inner.splitn(3, '@');
    let ref_name = parts.next()?;
    let task_id = parts.next()?;
    let status = parts.next()?;
    if task_id.is_empty() {
        return None;
    }

    Some(SubjectParts {
        ref_name: ref_name.to_string(),
        task_id: task_id.to_string(),
        status: status.to_string(),
    })
}

/// Extract the trailer block from a full commit message
///
/// Trailers are the final run of `Key: value` lines. Commits outside the
/// convention yield an empty map.
pub fn parse_trailers(message: &str) -> Trailers {
    let mut trailers = Trailers::new();

    for line in trailer_lines(message) {
        if let Some((key, value)) = line.split_once(':') {
            trailers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    trailers
}

/// Extract the free-text body of a task commit message
///
/// The body is everything between the subject line and the trailer block.
pub fn message_body(message: &str) -> String {
    let trailer_count = trailer_lines(message).len();
    let lines: Vec<&str> = message.lines().collect();

    if lines.len() <= 1 {
        return String::new();
    }

    let body_end = lines.len() - trailer_count;
    lines[1..body_end].join("\n").trim().to_string()
}

/// The final run of `Key: value` lines in a message, preceded by a blank line
fn trailer_lines(message: &str) -> Vec<&str> {
    let lines: Vec<&str> = message.lines().collect();

    let mut start = lines.len();
    for (i, line) in lines.iter().enumerate().rev() {
        if line.trim().is_empty() {
            break;
        }
        if is_trailer_line(line) {
            start = i;
        } else {
            return Vec::new();
        }
    }

    // The subject line alone is never a trailer block
    if start == 0 || start >= lines.len() {
        return Vec::new();
    }

    lines[start..].to_vec()
}

fn is_trailer_line(line: &str) -> bool {
    match line.split_once(':') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

/// Keep the head of a string, dropping the tail past `max` bytes
fn truncate_tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &s[..end])
}
