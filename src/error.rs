//! Custom error types for benchwright.
//!
//! Errors are grouped the way the pipeline reacts to them: precondition
//! failures stop a command before it mutates anything, patch and service
//! failures abort the current run, archival failures carry enough detail
//! for an operator to reconcile files by hand. Malformed reply segments
//! are not errors at all; see [`crate::protocol::SegmentError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::stage::Stage;

/// Main error type for benchwright operations
#[derive(Error, Debug)]
pub enum BenchError {
    // =========================================================================
    // Precondition Errors
    // =========================================================================
    /// A stage gate is not satisfied
    #[error("Stage '{stage}' has not been approved yet")]
    StageNotApproved { stage: Stage },

    /// A stage was already approved and cannot be restarted
    #[error("Stage '{stage}' is already approved")]
    StageAlreadyApproved { stage: Stage },

    /// A conversation for this stage is already in progress
    #[error("An unfinished '{stage}' conversation exists: {path}")]
    SessionExists { stage: Stage, path: PathBuf },

    /// No conversation exists to continue
    #[error("No conversation history found: {path}")]
    SessionMissing { path: PathBuf },

    /// A history file exists but cannot be read back
    #[error("Conversation history {path} is unreadable: {reason}")]
    CorruptHistory { path: PathBuf, reason: String },

    /// The stage state record has not been created yet
    #[error("No stage state found at {path}; run 'spec init' first")]
    StateMissing { path: PathBuf },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    /// The version artifact named for approval does not exist
    #[error("Version {version} of the {stage} artifact not found: {path}")]
    MissingArtifact {
        stage: Stage,
        version: u32,
        path: PathBuf,
    },

    /// Another command holds the workspace lock
    #[error("Workspace is busy: another command holds {path}")]
    WorkspaceBusy { path: PathBuf },

    // =========================================================================
    // Patch Errors
    // =========================================================================
    /// No start/end marker pair for the block id
    #[error("Block '{block_id}' not found")]
    BlockNotFound { block_id: String },

    /// Sanitized replacement text is empty
    #[error("Replacement for block '{block_id}' is empty after sanitizing")]
    EmptyReplacement { block_id: String },

    /// Replacement text would introduce a marker for the same block
    #[error("Replacement for block '{block_id}' contains its own marker line")]
    MarkerInReplacement { block_id: String },

    /// Patch target escapes the bench directory
    #[error("Invalid patch target: {path}")]
    InvalidPatchTarget { path: PathBuf },

    /// One or more patches of a task failed to apply
    #[error("Task '{task}': {failed} patch(es) failed to apply")]
    PatchesFailed { task: String, failed: usize },

    // =========================================================================
    // Generation Errors
    // =========================================================================
    /// The generation service call failed
    #[error("Generation service failed: {message}")]
    Service { message: String },

    /// Generated artifact could not be validated
    #[error("Generated artifact {path} is invalid: {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },

    // =========================================================================
    // Archive Errors
    // =========================================================================
    /// Archive rename failed; pre-approval files were restored
    #[error("Archive error: {message}")]
    Archive { message: String },

    /// Archive rename failed and so did the rollback
    #[error(
        "Archive rollback failed: reconcile {original} and {archived} manually ({message})"
    )]
    ArchiveRollbackFailed {
        original: PathBuf,
        archived: PathBuf,
        message: String,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// The stage state record is unreadable
    #[error("Stage state {path} is corrupt: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML error wrapper
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BenchError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a generation service error
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Create a missing file error
    pub fn missing_file(path: impl Into<PathBuf>) -> Self {
        Self::MissingFile { path: path.into() }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is a structural precondition failure.
    ///
    /// Precondition failures are raised before any file is mutated.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::StageNotApproved { .. }
                | Self::StageAlreadyApproved { .. }
                | Self::SessionExists { .. }
                | Self::SessionMissing { .. }
                | Self::CorruptHistory { .. }
                | Self::StateMissing { .. }
                | Self::MissingFile { .. }
                | Self::MissingArtifact { .. }
                | Self::WorkspaceBusy { .. }
        )
    }

    /// Check if the stage can be resumed with its continuation command
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Service { .. }
                | Self::InvalidArtifact { .. }
                | Self::BlockNotFound { .. }
                | Self::EmptyReplacement { .. }
                | Self::MarkerInReplacement { .. }
                | Self::InvalidPatchTarget { .. }
                | Self::PatchesFailed { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::WorkspaceBusy { .. } => 2,
            Self::StageNotApproved { .. }
            | Self::StageAlreadyApproved { .. }
            | Self::SessionExists { .. }
            | Self::SessionMissing { .. }
            | Self::CorruptHistory { .. }
            | Self::StateMissing { .. } => 3,
            Self::BlockNotFound { .. }
            | Self::EmptyReplacement { .. }
            | Self::MarkerInReplacement { .. }
            | Self::InvalidPatchTarget { .. }
            | Self::PatchesFailed { .. } => 4,
            Self::Service { .. } => 5,
            Self::MissingFile { .. } | Self::MissingArtifact { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } | Self::CorruptState { .. } => 7,
            Self::InvalidArtifact { .. } => 8,
            Self::Archive { .. } | Self::ArchiveRollbackFailed { .. } => 9,
            _ => 1,
        }
    }
}

/// Type alias for benchwright results
pub type Result<T> = std::result::Result<T, BenchError>;
