//! The agent runner capability trait

use crate::types::RunResult;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub use arbor_core::SANDBOX_ENV_VAR;

/// Capability interface for invoking a coding agent
///
/// The implement and review roles each hold one runner handle; the two
/// handles may be the same concrete value. Implementations must report
/// every call failure, including timeout expiry, as a failed [`RunResult`]
/// rather than an error, so the retry loop can consume it as an ordinary
/// step outcome.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent once with the given prompt
    ///
    /// `sandbox` is an opaque handle passed through verbatim; runners that
    /// have no execution environment to contain may ignore it.
    async fn run(
        &self,
        prompt: &str,
        timeout: Duration,
        working_dir: &Path,
        sandbox: Option<&str>,
    ) -> RunResult;
}
