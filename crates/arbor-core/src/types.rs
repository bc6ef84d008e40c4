//! Core type definitions for Arbor task execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable through which the opaque sandbox handle reaches
/// spawned agents and test commands; sandbox lifecycle is managed outside
/// this system and the handle is forwarded verbatim
pub const SANDBOX_ENV_VAR: &str = "ARBOR_SANDBOX";

/// Kind of test a command exercises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    #[default]
    Unit,
    Integration,
    E2e,
}

impl std::fmt::Display for TestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "unit"),
            Self::Integration => write!(f, "integration"),
            Self::E2e => write!(f, "e2e"),
        }
    }
}

impl std::str::FromStr for TestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unit" => Ok(Self::Unit),
            "integration" => Ok(Self::Integration),
            "e2e" | "end-to-end" => Ok(Self::E2e),
            _ => Err(format!("Invalid test kind: {}", s)),
        }
    }
}

/// A single declared test command for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCommand {
    /// What level of testing this command exercises
    pub kind: TestKind,
    /// Shell command to run
    pub command: String,
    /// Test framework hint for count parsing (e.g. "cargo", "pytest")
    pub framework: Option<String>,
    /// Per-command timeout; falls back to the runner default when absent
    pub timeout: Option<Duration>,
}

impl TestCommand {
    pub fn new(kind: TestKind, command: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
            framework: None,
            timeout: None,
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A node in the task tree
///
/// Leaf nodes (no children) are the atomic scheduling units. Non-leaf
/// "group" nodes are organizational only: their completion is derived from
/// their children and they never carry their own trailers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique task identifier (e.g. "T001")
    pub id: String,
    /// Short human-readable name
    pub name: String,
    /// Full task description handed to the implementing agent
    pub description: String,
    /// Parent node id, if any
    pub parent: Option<String>,
    /// Child node ids
    pub children: Vec<String>,
    /// Ids of tasks that must complete before this one may start
    pub depends_on: Vec<String>,
    /// Declared test commands, in execution order
    pub test_commands: Vec<TestCommand>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            parent: None,
            children: Vec::new(),
            depends_on: Vec::new(),
            test_commands: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = children;
        self
    }

    pub fn with_test_commands(mut self, test_commands: Vec<TestCommand>) -> Self {
        self.test_commands = test_commands;
        self
    }

    /// Leaf tasks are the atomic unit of scheduling
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Derived task state
///
/// Never persisted directly: the scanner derives it from the most recent
/// commit trailers for the task. Complete and Failed are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Implementing,
    Testing,
    Reviewing,
    Complete,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Implementing => write!(f, "implementing"),
            Self::Testing => write!(f, "testing"),
            Self::Reviewing => write!(f, "reviewing"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one single-task executor invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GardenResult {
    /// The task that was worked on, absent when no task was ready
    pub task_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Marker error for the "nothing to do" outcome
pub const NO_READY_TASK: &str = "no ready task";

impl GardenResult {
    pub fn completed(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            success: true,
            error: None,
        }
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            success: false,
            error: Some(error.into()),
        }
    }

    /// The normal "nothing to do" outcome; produces no commit
    pub fn no_ready_task() -> Self {
        Self {
            task_id: None,
            success: false,
            error: Some(NO_READY_TASK.to_string()),
        }
    }

    pub fn is_no_ready_task(&self) -> bool {
        self.error.as_deref() == Some(NO_READY_TASK)
    }
}

/// Outcome of a full scheduler run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerResult {
    pub success: bool,
    pub tasks_completed: usize,
    /// Task ids in completion order
    pub order: Vec<String>,
    pub error: Option<String>,
}

/// JSON run report written when a task reaches a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub result: String,
    pub retries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_kind_round_trip() {
        assert_eq!("unit".parse::<TestKind>().unwrap(), TestKind::Unit);
        assert_eq!("e2e".parse::<TestKind>().unwrap(), TestKind::E2e);
        assert_eq!(TestKind::Integration.to_string(), "integration");
        assert!("smoke".parse::<TestKind>().is_err());
    }

    #[test]
    fn test_task_node_is_leaf() {
        let leaf = TaskNode::new("T001", "Parse config");
        assert!(leaf.is_leaf());

        let group = TaskNode::new("G1", "Backend").with_children(vec!["T001".to_string()]);
        assert!(!group.is_leaf());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Complete.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Reviewing.is_terminal());
    }

    #[test]
    fn test_no_ready_task_marker() {
        let result = GardenResult::no_ready_task();
        assert!(!result.success);
        assert!(result.task_id.is_none());
        assert!(result.is_no_ready_task());

        let failed = GardenResult::failed("T001", "failed after 2 retries");
        assert!(!failed.is_no_ready_task());
    }
}
