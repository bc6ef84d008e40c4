//! # arbor-agent
//!
//! Coding-agent runners for Arbor task execution.
//!
//! ## Key Pattern
//!
//! Every agent invocation is completely stateless: no conversation history
//! is maintained between steps. Retry context comes from commit history
//! (via the feedback collector), never from runner memory. This is what
//! makes a killed-and-restarted process indistinguishable from one that
//! never stopped.
//!
//! All runner-call failures, including timeouts, surface as failed
//! [`RunResult`] values; the retry loop consumes them as ordinary step
//! outcomes rather than errors.

mod api;
mod auth;
mod process;
mod runner;
mod scripted;
mod types;

pub use api::{ApiRunner, Model};
pub use auth::get_auth_token;
pub use process::ProcessRunner;
pub use runner::{AgentRunner, SANDBOX_ENV_VAR};
pub use scripted::ScriptedRunner;
pub use types::RunResult;
