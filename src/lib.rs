//! Benchwright - staged test-bench generation
//!
//! Drives a conversational code generator through three gated stages:
//! a YAML design specification, a YAML verification plan, and a scaffold
//! run that fills marked regions of a skeleton test bench in place.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`] - Layered settings and workspace path resolution
//! - [`error`] - Custom error types and handling
//! - [`llm`] - The [`llm::ChatService`] seam and its backends
//! - [`orchestrator`] - Task sequencing, build context and run reports
//! - [`patch`] - Marker grammar and block-level patching
//! - [`prompts`] - Fixed prompt wording for every stage
//! - [`protocol`] - Parsing of structured model replies
//! - [`scaffold`] - The scaffold stage commands
//! - [`session`] - Persistent multi-turn conversations
//! - [`stage`] - Stage state machine, document workflow and approval
//! - [`workspace`] - Command lock and atomic writes
//!
//! # Example
//!
//! ```rust
//! use benchwright::patch::{BlockPatchEngine, MarkerSyntax};
//! use benchwright::protocol::{ProtocolSyntax, ReplyParser};
//!
//! let parser = ReplyParser::new(ProtocolSyntax::default());
//! let reply = parser.parse("benchwright:fill:driver.py:RUN\nawait self.bfm.drive(item)\n");
//!
//! let engine = BlockPatchEngine::new(MarkerSyntax::new("START", "END"), &ProtocolSyntax::default());
//! let patched = engine
//!     .patch("    # START: RUN\n    # END: RUN\n", "RUN", &reply.patches[0].text)
//!     .unwrap();
//! assert_eq!(patched, "    # START: RUN\n    await self.bfm.drive(item)\n    # END: RUN\n");
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod patch;
pub mod prompts;
pub mod protocol;
pub mod scaffold;
pub mod session;
pub mod stage;
pub mod workspace;

// Re-export commonly used types
pub use error::{BenchError, Result};

pub use config::{Provider, Settings, WorkspacePaths};

pub use llm::{build_chat_service, ChatService, OpenAiChatService, ScriptedChatService};

pub use orchestrator::{
    scaffold_pipeline, BuildContext, RunReport, RunStatus, Task, TaskOrchestrator, TaskReport,
};

pub use patch::{BlockLocator, BlockPatchEngine, BlockPatcher, MarkerSyntax};

pub use protocol::{ContextValue, ParsedReply, Patch, ProtocolSyntax, ReplyParser, SegmentError};

pub use scaffold::{ScaffoldOutcome, ScaffoldStage};

pub use session::{ConversationSession, Message, Role};

pub use stage::{
    approve, workspace_status, ApprovalOutcome, DocumentWorkflow, Feedback,
    GeneratedVersion, Stage, StageState, StateStore, YamlArtifact,
};

pub use workspace::WorkspaceLock;
