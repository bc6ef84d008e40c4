//! Authentication for the Anthropic API runner
//!
//! Supports two authentication methods:
//! 1. Claude Code OAuth token (CLAUDE_CODE_OAUTH_TOKEN) - zero API cost with subscription
//! 2. Anthropic API key (ANTHROPIC_API_KEY) - standard API access

use arbor_core::{ArborError, Result};
use std::env;

/// Get authentication token for the Anthropic API
///
/// Priority:
/// 1. CLAUDE_CODE_OAUTH_TOKEN (subscription, zero API cost)
/// 2. ANTHROPIC_API_KEY (standard API access)
pub fn get_auth_token() -> Result<String> {
    if let Ok(oauth_token) = env::var("CLAUDE_CODE_OAUTH_TOKEN") {
        tracing::info!("Using Claude Code OAuth token (subscription)");
        return Ok(oauth_token);
    }

    if let Ok(api_key) = env::var("ANTHROPIC_API_KEY") {
        tracing::info!("Using ANTHROPIC_API_KEY");
        return Ok(api_key);
    }

    Err(ArborError::AgentAuth(
        "No authentication found. Set either:\n\
         - CLAUDE_CODE_OAUTH_TOKEN=sk-ant-oat01-... (for subscription access)\n\
         - ANTHROPIC_API_KEY=sk-ant-api03-...       (for API access)"
            .to_string(),
    ))
}
