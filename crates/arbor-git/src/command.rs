//! Git command execution abstraction

use arbor_core::{ArborError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Output from a git command
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    pub fn err(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

impl From<Output> for GitOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Trait for executing git commands (allows mocking in tests)
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Execute a git command with the given arguments
    async fn exec(&self, args: &[&str]) -> Result<GitOutput>;

    /// Get the repository root
    fn repo_root(&self) -> &PathBuf;
}

/// Real git command executor
#[derive(Clone)]
pub struct GitCommand {
    repo_root: PathBuf,
}

impl GitCommand {
    /// Create a new git command executor for the given repository
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Auto-detect repository root from current directory
    pub async fn detect() -> Result<Self> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .await
            .map_err(|e| ArborError::GitCommand(format!("Failed to run git rev-parse: {}", e)))?;

        if !output.status.success() {
            return Err(ArborError::GitCommand(
                "Not in a git repository".to_string(),
            ));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self::new(root))
    }
}

#[async_trait]
impl GitExecutor for GitCommand {
    #[instrument(skip(self), fields(repo = %self.repo_root.display()))]
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        debug!("Executing git {:?}", args);

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(|e| ArborError::GitCommand(format!("Failed to execute git: {}", e)))?;

        let git_output = GitOutput::from(output);

        if !git_output.success {
            debug!("git command failed: {}", git_output.stderr);
        }

        Ok(git_output)
    }

    fn repo_root(&self) -> &PathBuf {
        &self.repo_root
    }
}

/// Mock git executor with canned responses, for simple unit tests
#[derive(Clone)]
pub struct MockGitExecutor {
    repo_root: PathBuf,
    responses: std::collections::HashMap<String, GitOutput>,
}

impl Default for MockGitExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitExecutor {
    pub fn new() -> Self {
        Self {
            repo_root: PathBuf::from("/mock/repo"),
            responses: std::collections::HashMap::new(),
        }
    }

    pub fn with_response(mut self, command: &str, output: GitOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }
}

#[async_trait]
impl GitExecutor for MockGitExecutor {
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        let key = args.join(" ");
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| ArborError::GitCommand(format!("No mock response for: {}", key)))
    }

    fn repo_root(&self) -> &PathBuf {
        &self.repo_root
    }
}

#[derive(Debug, Clone)]
struct StoredCommit {
    id: String,
    message: String,
}

/// Stateful in-memory git fake
///
/// Interprets the minimal command set the engine relies on (add, commit, log,
/// rev-parse, diff) against an in-memory commit list, so full executor and
/// scheduler runs are deterministic in tests without touching a real
/// repository. Clones share history, which lets a test hand "the same repo"
/// to a freshly constructed engine the way a restarted process would see it.
///
/// A new instance starts with a single seed commit, matching a repository
/// that has been initialized before the engine runs against it.
#[derive(Clone)]
pub struct InMemoryGit {
    repo_root: PathBuf,
    branch: String,
    state: Arc<Mutex<InMemoryState>>,
}

struct InMemoryState {
    commits: Vec<StoredCommit>,
    next_id: u64,
}

impl Default for InMemoryGit {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGit {
    pub fn new() -> Self {
        let git = Self {
            repo_root: PathBuf::from("/memory/repo"),
            branch: "main".to_string(),
            state: Arc::new(Mutex::new(InMemoryState {
                commits: Vec::new(),
                next_id: 0,
            })),
        };
        git.push_commit("init");
        git
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Append a commit directly, bypassing exec (test setup helper)
    pub fn push_commit(&self, message: &str) -> String {
        let mut state = self.state.lock().expect("in-memory git lock");
        let id = format!("c{:06}", state.next_id);
        state.next_id += 1;
        state.commits.push(StoredCommit {
            id: id.clone(),
            message: message.to_string(),
        });
        id
    }

    /// All commit messages, newest first (test inspection helper)
    pub fn messages(&self) -> Vec<String> {
        let state = self.state.lock().expect("in-memory git lock");
        state
            .commits
            .iter()
            .rev()
            .map(|c| c.message.clone())
            .collect()
    }

    fn log_output(&self) -> String {
        let state = self.state.lock().expect("in-memory git lock");
        let mut out = String::new();
        for commit in state.commits.iter().rev() {
            let subject = commit.message.lines().next().unwrap_or("");
            out.push_str(&format!(
                "{}\x1f{}\x1f{}\x1e\n",
                commit.id, subject, commit.message
            ));
        }
        out
    }

    fn head(&self) -> Option<String> {
        let state = self.state.lock().expect("in-memory git lock");
        state.commits.last().map(|c| c.id.clone())
    }
}

#[async_trait]
impl GitExecutor for InMemoryGit {
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        match args.first().copied() {
            Some("add") => Ok(GitOutput::ok("")),
            Some("commit") => {
                let message = args
                    .iter()
                    .position(|a| *a == "-m")
                    .and_then(|i| args.get(i + 1));
                match message {
                    Some(message) => {
                        self.push_commit(message);
                        Ok(GitOutput::ok(""))
                    }
                    None => Ok(GitOutput::err("fatal: no commit message")),
                }
            }
            Some("log") => Ok(GitOutput::ok(self.log_output())),
            Some("rev-parse") => {
                if args.contains(&"--abbrev-ref") {
                    Ok(GitOutput::ok(format!("{}\n", self.branch)))
                } else {
                    match self.head() {
                        Some(head) => Ok(GitOutput::ok(format!("{}\n", head))),
                        None => Ok(GitOutput::err("fatal: unknown revision")),
                    }
                }
            }
            Some("diff") => Ok(GitOutput::ok(" 1 file changed\n")),
            _ => Ok(GitOutput::err(format!(
                "fatal: unsupported command: {:?}",
                args
            ))),
        }
    }

    fn repo_root(&self) -> &PathBuf {
        &self.repo_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_executor() {
        let executor = MockGitExecutor::new().with_response(
            "rev-parse HEAD",
            GitOutput::ok("abc123\n"),
        );

        let output = executor.exec(&["rev-parse", "HEAD"]).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "abc123\n");
    }

    #[tokio::test]
    async fn test_mock_executor_missing_response_is_error() {
        let executor = MockGitExecutor::new();
        assert!(executor.exec(&["status"]).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_commit_and_log() {
        let git = InMemoryGit::new();
        git.exec(&["commit", "--allow-empty", "-m", "subject line\n\nbody"])
            .await
            .unwrap();

        let log = git.exec(&["log", "main", "--format=x"]).await.unwrap();
        assert!(log.success);
        // Newest first: our commit precedes the seed commit
        let first = log.stdout.split('\x1e').next().unwrap();
        assert!(first.contains("subject line"));
    }

    #[tokio::test]
    async fn test_in_memory_clones_share_history() {
        let git = InMemoryGit::new();
        let clone = git.clone();

        git.exec(&["commit", "--allow-empty", "-m", "from original"])
            .await
            .unwrap();

        assert!(clone.messages().iter().any(|m| m == "from original"));
    }

    #[tokio::test]
    async fn test_in_memory_rev_parse() {
        let git = InMemoryGit::new().with_branch("work");
        let branch = git
            .exec(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .unwrap();
        assert_eq!(branch.stdout.trim(), "work");

        let head = git.exec(&["rev-parse", "HEAD"]).await.unwrap();
        assert_eq!(head.stdout.trim(), "c000000");
    }
}
