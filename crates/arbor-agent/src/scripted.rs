//! Scripted agent runner for deterministic tests

use crate::runner::AgentRunner;
use crate::types::RunResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Agent runner that replays a queue of canned results
///
/// Results are consumed front to back; once the queue is empty the last
/// result repeats, so "always approves" and "always rejects" runners are a
/// single `with_result` call. Received prompts are recorded for inspection,
/// which is how feedback-propagation tests observe what a retry was told.
/// Clones share the queue and the prompt log.
#[derive(Clone)]
pub struct ScriptedRunner {
    state: Arc<Mutex<ScriptedState>>,
}

struct ScriptedState {
    queue: VecDeque<RunResult>,
    last: RunResult,
    prompts: Vec<String>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedState {
                queue: VecDeque::new(),
                last: RunResult::ok(""),
                prompts: Vec::new(),
            })),
        }
    }

    /// Runner whose every call returns the given output successfully
    pub fn always(output: impl Into<String>) -> Self {
        Self::new().with_result(RunResult::ok(output))
    }

    pub fn with_result(self, result: RunResult) -> Self {
        {
            let mut state = self.state.lock().expect("scripted runner lock");
            state.last = result.clone();
            state.queue.push_back(result);
        }
        self
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("scripted runner lock")
            .prompts
            .clone()
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.state.lock().expect("scripted runner lock").prompts.len()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    async fn run(
        &self,
        prompt: &str,
        _timeout: Duration,
        _working_dir: &Path,
        _sandbox: Option<&str>,
    ) -> RunResult {
        let mut state = self.state.lock().expect("scripted runner lock");
        state.prompts.push(prompt.to_string());
        state.queue.pop_front().unwrap_or_else(|| state.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_repeat_last() {
        let runner = ScriptedRunner::new()
            .with_result(RunResult::failure("first fails"))
            .with_result(RunResult::ok("second passes"));

        let run = |r: &ScriptedRunner| {
            let r = r.clone();
            async move { r.run("p", Duration::from_secs(1), Path::new("."), None).await }
        };

        assert!(!run(&runner).await.success);
        assert!(run(&runner).await.success);
        // Queue exhausted: last result repeats
        assert!(run(&runner).await.success);
        assert_eq!(runner.calls(), 3);
    }

    #[tokio::test]
    async fn test_prompts_are_recorded() {
        let runner = ScriptedRunner::always("APPROVED");
        runner
            .run("review this diff", Duration::from_secs(1), Path::new("."), None)
            .await;

        assert_eq!(runner.prompts(), vec!["review this diff"]);
    }
}
