//! Generation service abstraction.
//!
//! The [`ChatService`] trait is the only boundary to the text-generation
//! backend. It takes the full message log of a session and returns one
//! assistant reply. Failures are reported, never retried here.
//!
//! Two implementations ship with the crate:
//!
//! - [`OpenAiChatService`] posts to an OpenAI-compatible chat completions
//!   endpoint
//! - [`ScriptedChatService`] replays canned replies, for tests and offline
//!   runs

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::config::{LlmSettings, Provider, WorkspacePaths};
use crate::error::BenchError;
use crate::session::Message;

pub use openai::{ChatApiError, OpenAiChatService};

/// A conversational text-generation backend.
///
/// Object-safe and `Send + Sync`, so callers hold it as
/// `Box<dyn ChatService>` and pick the backend at runtime.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Produce the next assistant message for `history`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unreachable, rejects the
    /// request, or answers with something that is not a reply.
    async fn complete_turn(&self, history: &[Message]) -> Result<String>;

    /// Identifier of the model behind this service.
    fn model_name(&self) -> &str;
}

/// One entry of a reply script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScriptedReply {
    Reply(String),
    Failure { error: String },
}

/// Replays queued replies in order and records every log it receives.
///
/// # Example
///
/// ```
/// use benchwright::llm::{ChatService, ScriptedChatService};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let service = ScriptedChatService::from_replies(["first", "second"]);
/// let reply = rt.block_on(service.complete_turn(&[])).unwrap();
/// assert_eq!(reply, "first");
/// assert_eq!(service.remaining(), 1);
/// ```
#[derive(Debug)]
pub struct ScriptedChatService {
    queue: Mutex<VecDeque<ScriptedReply>>,
    received: Mutex<Vec<Vec<Message>>>,
    model: String,
}

impl Default for ScriptedChatService {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ScriptedChatService {
    #[must_use]
    pub fn new(entries: Vec<ScriptedReply>) -> Self {
        Self {
            queue: Mutex::new(entries.into()),
            received: Mutex::new(Vec::new()),
            model: "scripted".to_string(),
        }
    }

    /// Service answering with each reply in turn.
    #[must_use]
    pub fn from_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            replies
                .into_iter()
                .map(|r| ScriptedReply::Reply(r.into()))
                .collect(),
        )
    }

    /// Load a script: a JSON array of reply strings or `{"error": "..."}`
    /// objects.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        if !path.is_file() {
            return Err(BenchError::missing_file(path));
        }
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<ScriptedReply> = serde_json::from_str(&content).map_err(|e| {
            BenchError::config_with_path(format!("invalid reply script: {e}"), path.to_path_buf())
        })?;
        debug!("Loaded {} scripted replies from {}", entries.len(), path.display());
        Ok(Self::new(entries))
    }

    /// Queue a failure as the next answer.
    #[must_use]
    pub fn with_failure_first(self, error: &str) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_front(ScriptedReply::Failure {
                error: error.to_string(),
            });
        }
        self
    }

    /// Number of queued entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Every message log passed to [`ChatService::complete_turn`], in order.
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.received.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatService for ScriptedChatService {
    async fn complete_turn(&self, history: &[Message]) -> Result<String> {
        if let Ok(mut received) = self.received.lock() {
            received.push(history.to_vec());
        }

        let next = self
            .queue
            .lock()
            .map_err(|_| anyhow::anyhow!("reply script lock poisoned"))?
            .pop_front();

        match next {
            Some(ScriptedReply::Reply(text)) => Ok(text),
            Some(ScriptedReply::Failure { error }) => anyhow::bail!("{}", error),
            None => anyhow::bail!("reply script exhausted"),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the configured generation service.
pub fn build_chat_service(
    settings: &LlmSettings,
    paths: &WorkspacePaths,
) -> crate::error::Result<Box<dyn ChatService>> {
    match settings.provider {
        Provider::Openai => Ok(Box::new(OpenAiChatService::from_settings(settings))),
        Provider::Scripted => {
            let script = settings.script.as_ref().ok_or_else(|| {
                BenchError::invalid_config("llm.script", "the scripted provider needs a script file")
            })?;
            Ok(Box::new(ScriptedChatService::from_file(
                &paths.resolve(script),
            )?))
        }
    }
}
