//! Persistent multi-turn conversations with the generation service.
//!
//! A [`ConversationSession`] owns the message log of one stage. Each turn
//! sends the full log plus the new user prompt to a [`ChatService`]; only a
//! successful, non-empty reply is appended, and the log is written to disk
//! before the reply is handed back.
//!
//! [`ChatService`]: crate::llm::ChatService

pub mod persistence;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use persistence::HistoryStore;

use crate::error::{BenchError, Result};
use crate::llm::ChatService;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The assistant reply.
    pub text: String,
    /// Set when the reply was kept in memory but the history file could not
    /// be written.
    pub persist_warning: Option<String>,
}

/// The message log of one stage, bound to its history file.
#[derive(Debug)]
pub struct ConversationSession {
    store: HistoryStore,
    messages: Vec<Message>,
    resumed: bool,
}

impl ConversationSession {
    /// Load the history at `path`, or start a new log with `system_prompt`.
    ///
    /// An existing file is taken verbatim and `system_prompt` is ignored.
    /// Nothing is written until the first turn completes.
    pub fn load_or_init(path: impl Into<PathBuf>, system_prompt: &str) -> Result<Self> {
        let store = HistoryStore::new(path);
        match store.load()? {
            Some(messages) => {
                debug!(
                    "Resuming session {} ({} messages)",
                    store.path().display(),
                    messages.len()
                );
                Ok(Self {
                    store,
                    messages,
                    resumed: true,
                })
            }
            None => Ok(Self {
                store,
                messages: vec![Message::system(system_prompt)],
                resumed: false,
            }),
        }
    }

    /// Load an existing history, failing with [`BenchError::SessionMissing`]
    /// when there is none.
    pub fn resume(path: impl Into<PathBuf>) -> Result<Self> {
        let store = HistoryStore::new(path);
        let messages = store.load()?.ok_or_else(|| BenchError::SessionMissing {
            path: store.path().to_path_buf(),
        })?;
        Ok(Self {
            store,
            messages,
            resumed: true,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether the log was loaded from an existing file.
    #[must_use]
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Number of completed user/assistant exchanges.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    /// Send `prompt` and record the exchange.
    ///
    /// On a service failure or an empty reply the log is left exactly as it
    /// was. When the reply arrives but the history cannot be saved, the
    /// exchange stays in memory and the outcome carries a warning.
    pub async fn turn(&mut self, service: &dyn ChatService, prompt: &str) -> Result<TurnOutcome> {
        let mut candidate = self.messages.clone();
        candidate.push(Message::user(prompt));

        debug!(
            "Turn {} on {} ({} chars prompt, {} messages)",
            self.turn_count() + 1,
            self.store.path().display(),
            prompt.len(),
            candidate.len()
        );

        let reply = service
            .complete_turn(&candidate)
            .await
            .map_err(|e| BenchError::service(format!("{e:#}")))?;

        if reply.trim().is_empty() {
            return Err(BenchError::service(format!(
                "{} returned an empty reply",
                service.model_name()
            )));
        }

        candidate.push(Message::assistant(reply.as_str()));
        self.messages = candidate;

        let persist_warning = match self.store.save(&self.messages) {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    "Reply kept in memory but history {} was not saved: {}",
                    self.store.path().display(),
                    e
                );
                Some(e.to_string())
            }
        };

        Ok(TurnOutcome {
            text: reply,
            persist_warning,
        })
    }
}
