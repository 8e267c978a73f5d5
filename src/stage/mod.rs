//! Stage state machine and stage commands.
//!
//! The pipeline moves through three ordered stages:
//!
//! ```text
//! specification ──approve──▶ plan ──approve──▶ scaffold
//! ```
//!
//! The two document stages ([`Stage::Specification`], [`Stage::Plan`]) each
//! hold one conversation that produces numbered YAML versions; approving a
//! version archives it under a stable name and opens the next stage's gate.
//! The scaffold stage is driven by [`crate::scaffold`].

pub mod approval;
pub mod artifact;
pub mod state;
pub mod workflow;

use serde::{Deserialize, Serialize};

pub use approval::{approve, ApprovalOutcome};
pub use artifact::{ArtifactSummary, YamlArtifact};
pub use state::{StageState, StateStore};
pub use workflow::{
    workspace_status, DocumentWorkflow, Feedback, GeneratedVersion, PendingVersion, WorkspaceStatus,
};

/// One of the three ordered pipeline stages.
///
/// # Example
///
/// ```
/// use benchwright::stage::Stage;
///
/// assert_eq!(Stage::Specification.next(), Some(Stage::Plan));
/// assert_eq!(Stage::Plan.stem(), "verif_plan");
/// assert_eq!(Stage::Scaffold.to_string(), "scaffold");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Specification,
    Plan,
    Scaffold,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 3] = [Stage::Specification, Stage::Plan, Stage::Scaffold];

    /// File-name stem for this stage's history and artifacts.
    #[must_use]
    pub fn stem(&self) -> &'static str {
        match self {
            Stage::Specification => "design_spec",
            Stage::Plan => "verif_plan",
            Stage::Scaffold => "scaffold",
        }
    }

    /// The stage unlocked by approving this one.
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Specification => Some(Stage::Plan),
            Stage::Plan => Some(Stage::Scaffold),
            Stage::Scaffold => None,
        }
    }

    /// The stage whose approval gates this one.
    #[must_use]
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Stage::Specification => None,
            Stage::Plan => Some(Stage::Specification),
            Stage::Scaffold => Some(Stage::Plan),
        }
    }

    /// Whether the stage produces versioned YAML documents.
    #[must_use]
    pub fn is_document(&self) -> bool {
        matches!(self, Stage::Specification | Stage::Plan)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Specification => write!(f, "specification"),
            Stage::Plan => write!(f, "plan"),
            Stage::Scaffold => write!(f, "scaffold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Specification < Stage::Plan);
        assert!(Stage::Plan < Stage::Scaffold);
        assert_eq!(Stage::Plan.previous(), Some(Stage::Specification));
        assert_eq!(Stage::Scaffold.next(), None);
        assert_eq!(Stage::Specification.previous(), None);
    }

    #[test]
    fn test_stage_serde_names() {
        assert_eq!(
            serde_json::to_string(&Stage::Specification).unwrap(),
            "\"specification\""
        );
        let stage: Stage = serde_json::from_str("\"scaffold\"").unwrap();
        assert_eq!(stage, Stage::Scaffold);
    }

    #[test]
    fn test_document_stages() {
        assert!(Stage::Specification.is_document());
        assert!(Stage::Plan.is_document());
        assert!(!Stage::Scaffold.is_document());
    }
}
