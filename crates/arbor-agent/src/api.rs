//! Anthropic API agent runner
//!
//! Key design: each invocation is completely stateless. No conversation
//! history is maintained - retry context arrives inside the prompt, built
//! from commit history by the caller.

use crate::auth;
use crate::runner::AgentRunner;
use crate::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse, RunResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: usize = 16000;

// Rate limit retry configuration
const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECS: u64 = 30;
const MAX_BACKOFF_SECS: u64 = 300;

/// Claude model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Model {
    Opus,
    #[default]
    Sonnet,
    Haiku,
}

impl Model {
    /// Get the API model name
    pub fn api_name(&self) -> &'static str {
        match self {
            Model::Opus => "claude-opus-4-20250514",
            Model::Sonnet => "claude-sonnet-4-5-20250929",
            Model::Haiku => "claude-haiku-3-5-20250929",
        }
    }
}

impl std::str::FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opus" => Ok(Model::Opus),
            "sonnet" => Ok(Model::Sonnet),
            "haiku" => Ok(Model::Haiku),
            _ => Err(format!("Invalid model: {}. Use opus, sonnet, or haiku.", s)),
        }
    }
}

/// Agent runner backed by the Anthropic Messages API
#[derive(Debug, Clone)]
pub struct ApiRunner {
    model: Model,
    max_tokens: usize,
}

impl ApiRunner {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn call(&self, prompt: &str) -> RunResult {
        let auth_token = match auth::get_auth_token() {
            Ok(token) => token,
            Err(e) => return RunResult::failure(e.to_string()),
        };

        let request = AnthropicRequest {
            model: self.model.api_name().to_string(),
            max_tokens: self.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        // Retry loop with exponential backoff for rate limits
        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            debug!("Sending request to Anthropic API (attempt {})", retries + 1);

            let client = reqwest::Client::new();
            let response = match client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &auth_token)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => return RunResult::failure(format!("Failed to send request: {}", e)),
            };

            let status = response.status();

            // Rate limit (429) and server errors retry with backoff
            if status.as_u16() == 429 || status.is_server_error() {
                retries += 1;
                if retries > MAX_RETRIES {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown".to_string());
                    return RunResult::failure(format!(
                        "API error {} after {} retries: {}",
                        status, MAX_RETRIES, error_text
                    ));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                warn!(
                    "API returned {}. Waiting {} seconds before retry {}/{}",
                    status, wait_secs, retries, MAX_RETRIES
                );

                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown".to_string());
                return RunResult::failure(format!("Anthropic API error {}: {}", status, error_text));
            }

            let anthropic_response: AnthropicResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => return RunResult::failure(format!("Failed to parse response: {}", e)),
            };

            let output = match anthropic_response.content.first() {
                Some(content) => content.text.clone(),
                None => return RunResult::failure("No content in response".to_string()),
            };

            debug!("Agent call complete ({} chars)", output.len());
            return RunResult::ok(output);
        }
    }
}

#[async_trait]
impl AgentRunner for ApiRunner {
    async fn run(
        &self,
        prompt: &str,
        timeout: Duration,
        _working_dir: &Path,
        _sandbox: Option<&str>,
    ) -> RunResult {
        // The whole call, including rate-limit backoff, is bounded by the
        // step timeout; expiry consumes one retry attempt upstream
        match tokio::time::timeout(timeout, self.call(prompt)).await {
            Ok(result) => result,
            Err(_) => RunResult::failure(format!("Agent timed out after {}s", timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_api_names() {
        assert_eq!(Model::Opus.api_name(), "claude-opus-4-20250514");
        assert_eq!(Model::Sonnet.api_name(), "claude-sonnet-4-5-20250929");
        assert_eq!(Model::Haiku.api_name(), "claude-haiku-3-5-20250929");
    }

    #[test]
    fn test_model_from_str() {
        assert_eq!("opus".parse::<Model>().unwrap(), Model::Opus);
        assert_eq!("SONNET".parse::<Model>().unwrap(), Model::Sonnet);
        assert!("invalid".parse::<Model>().is_err());
    }

    #[test]
    fn test_api_runner_builder() {
        let runner = ApiRunner::new(Model::Opus).with_max_tokens(8000);
        assert_eq!(runner.model, Model::Opus);
        assert_eq!(runner.max_tokens, 8000);
    }
}
