//! OpenAI-compatible chat completions client.
//!
//! Requests are sent by running `curl` as a subprocess, so the crate needs
//! no HTTP client of its own. The whole session log is posted on every turn;
//! the service keeps no conversation state.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::ChatService;
use crate::config::LlmSettings;
use crate::session::Message;

// =============================================================================
// API Errors
// =============================================================================

/// Errors from the chat completions endpoint.
#[derive(Error, Debug)]
pub enum ChatApiError {
    /// API key not found in environment.
    #[error("API key not found in environment variable '{env_var}'")]
    ApiKeyNotFound { env_var: String },

    /// `curl` is not installed.
    #[error("curl not found on PATH")]
    CurlMissing,

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// Authentication failed - check API key.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The endpoint rejected the request.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Network/connection error.
    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    /// Timeout waiting for response.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Invalid response from API.
    #[error("Invalid API response: {message}")]
    InvalidResponse { message: String },
}

impl ChatApiError {
    /// Classify an `{"error": {...}}` body returned by the endpoint.
    fn from_error_body(error: &serde_json::Value) -> Self {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        let error_type = error.get("type").and_then(|t| t.as_str()).unwrap_or("");

        if error_type.contains("rate_limit") || message.contains("rate limit") {
            Self::RateLimited { message }
        } else if error_type.contains("authentication") || message.contains("API key") {
            Self::AuthenticationFailed { message }
        } else {
            Self::InvalidRequest { message }
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

/// Pull the reply text out of a response body.
fn parse_response_body(body: &str) -> std::result::Result<String, ChatApiError> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = value.get("error") {
            return Err(ChatApiError::from_error_body(error));
        }
    }

    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| ChatApiError::InvalidResponse {
            message: format!("Failed to parse response: {e}"),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| ChatApiError::InvalidResponse {
            message: "response has no choices".to_string(),
        })
}

// =============================================================================
// Service
// =============================================================================

/// [`ChatService`] backed by an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatService {
    model: String,
    api_key_env: String,
    api_base: String,
    timeout_secs: u64,
}

impl Default for OpenAiChatService {
    fn default() -> Self {
        Self::from_settings(&LlmSettings::default())
    }
}

impl OpenAiChatService {
    #[must_use]
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            model: settings.model.clone(),
            api_key_env: settings.api_key_env.clone(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            timeout_secs: settings.timeout_secs,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Endpoint the requests are posted to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn api_key(&self) -> std::result::Result<String, ChatApiError> {
        env::var(&self.api_key_env).map_err(|_| ChatApiError::ApiKeyNotFound {
            env_var: self.api_key_env.clone(),
        })
    }

    fn request_body(&self, history: &[Message]) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: history.iter().map(ChatMessage::from).collect(),
        }
    }

    async fn post(&self, history: &[Message]) -> std::result::Result<String, ChatApiError> {
        let api_key = self.api_key()?;
        let curl = which::which("curl").map_err(|_| ChatApiError::CurlMissing)?;

        let body_json = serde_json::to_string(&self.request_body(history)).map_err(|e| {
            ChatApiError::InvalidRequest {
                message: format!("Failed to serialize request: {e}"),
            }
        })?;

        debug!(
            "Sending {} messages to {} ({} bytes)",
            history.len(),
            self.model,
            body_json.len()
        );

        // The body goes through stdin: a long session exceeds the
        // per-argument size limit of the OS.
        let mut child = tokio::process::Command::new(curl)
            .args([
                "-s",
                "-X",
                "POST",
                &self.endpoint(),
                "-H",
                &format!("Authorization: Bearer {api_key}"),
                "-H",
                "Content-Type: application/json",
                "--data-binary",
                "@-",
                "--max-time",
                &self.timeout_secs.to_string(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ChatApiError::ConnectionError {
                message: format!("Failed to execute curl: {e}"),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(body_json.as_bytes()).await {
                Ok(()) => {}
                // curl exited early; its status below says why
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("curl closed stdin before reading the whole body");
                }
                Err(e) => {
                    return Err(ChatApiError::ConnectionError {
                        message: format!("Failed to send request body to curl: {e}"),
                    })
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ChatApiError::ConnectionError {
                message: format!("Failed to wait for curl: {e}"),
            })?;

        if !output.status.success() {
            // curl exit code 28 is "operation timed out"
            if output.status.code() == Some(28) {
                return Err(ChatApiError::Timeout {
                    timeout_secs: self.timeout_secs,
                });
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChatApiError::ConnectionError {
                message: format!("curl failed: {}", stderr.trim()),
            });
        }

        parse_response_body(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl ChatService for OpenAiChatService {
    async fn complete_turn(&self, history: &[Message]) -> Result<String> {
        let reply = self.post(history).await?;
        debug!("Received {} chars from {}", reply.len(), self.model);
        Ok(reply)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
