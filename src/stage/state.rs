//! Persistent stage state record.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::Stage;
use crate::error::{BenchError, Result};
use crate::workspace::write_atomic;

/// Which stage is active and which document stages are approved.
///
/// Serialized as the JSON object
/// `{currentStage, specApproved, finalSpecFile, planApproved, finalPlanFile, moduleName}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageState {
    pub current_stage: Stage,
    pub spec_approved: bool,
    pub final_spec_file: Option<PathBuf>,
    pub plan_approved: bool,
    pub final_plan_file: Option<PathBuf>,
    pub module_name: Option<String>,
}

impl Default for StageState {
    fn default() -> Self {
        Self::new()
    }
}

impl StageState {
    /// A fresh record at the start of the specification stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_stage: Stage::Specification,
            spec_approved: false,
            final_spec_file: None,
            plan_approved: false,
            final_plan_file: None,
            module_name: None,
        }
    }

    /// Whether a document stage has been approved.
    #[must_use]
    pub fn is_approved(&self, stage: Stage) -> bool {
        match stage {
            Stage::Specification => self.spec_approved,
            Stage::Plan => self.plan_approved,
            Stage::Scaffold => false,
        }
    }

    /// Archived artifact of an approved document stage.
    #[must_use]
    pub fn final_file(&self, stage: Stage) -> Option<&Path> {
        match stage {
            Stage::Specification => self.final_spec_file.as_deref(),
            Stage::Plan => self.final_plan_file.as_deref(),
            Stage::Scaffold => None,
        }
    }

    /// Check that `stage` is approved and its archived artifact is on disk.
    pub fn require_approved(&self, stage: Stage) -> Result<&Path> {
        if !self.is_approved(stage) {
            return Err(BenchError::StageNotApproved { stage });
        }
        let path = self
            .final_file(stage)
            .ok_or_else(|| {
                BenchError::config(format!(
                    "{stage} is approved but the state names no archived artifact"
                ))
            })?;
        if !path.exists() {
            return Err(BenchError::missing_file(path));
        }
        Ok(path)
    }

    /// Record approval of a document stage and advance to the next stage.
    pub fn mark_approved(&mut self, stage: Stage, archived: PathBuf, module_name: &str) {
        match stage {
            Stage::Specification => {
                self.spec_approved = true;
                self.final_spec_file = Some(archived);
            }
            Stage::Plan => {
                self.plan_approved = true;
                self.final_plan_file = Some(archived);
            }
            Stage::Scaffold => return,
        }
        self.module_name = Some(module_name.to_string());
        if let Some(next) = stage.next() {
            if next > self.current_stage {
                self.current_stage = next;
            }
        }
    }
}

/// File-backed storage for [`StageState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the record, or `None` when it has not been created yet.
    pub fn load(&self) -> Result<Option<StageState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&content).map_err(|e| BenchError::CorruptState {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(state))
    }

    /// Load the record, failing when it does not exist.
    pub fn load_required(&self) -> Result<StageState> {
        self.load()?.ok_or_else(|| BenchError::StateMissing {
            path: self.path.clone(),
        })
    }

    /// Load the record or start a fresh one (not yet saved).
    pub fn load_or_default(&self) -> Result<StageState> {
        Ok(self.load()?.unwrap_or_default())
    }

    /// Persist the record atomically.
    pub fn save(&self, state: &StageState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Saved stage state to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_state_json_shape() {
        let state = StageState::new();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "currentStage": "specification",
                "specApproved": false,
                "finalSpecFile": null,
                "planApproved": false,
                "finalPlanFile": null,
                "moduleName": null
            })
        );
    }

    #[test]
    fn test_mark_approved_advances_stage() {
        let mut state = StageState::new();
        state.mark_approved(
            Stage::Specification,
            PathBuf::from("run/fifo.design_spec.final.yml"),
            "fifo",
        );
        assert!(state.spec_approved);
        assert_eq!(state.current_stage, Stage::Plan);
        assert_eq!(state.module_name.as_deref(), Some("fifo"));

        state.mark_approved(
            Stage::Plan,
            PathBuf::from("run/fifo.verif_plan.final.yml"),
            "fifo",
        );
        assert!(state.plan_approved);
        assert_eq!(state.current_stage, Stage::Scaffold);
        assert_eq!(
            state.final_file(Stage::Plan),
            Some(Path::new("run/fifo.verif_plan.final.yml"))
        );
    }

    #[test]
    fn test_require_approved() {
        let temp = TempDir::new().unwrap();
        let mut state = StageState::new();

        assert!(matches!(
            state.require_approved(Stage::Plan),
            Err(BenchError::StageNotApproved { stage: Stage::Plan })
        ));

        let archived = temp.path().join("fifo.verif_plan.final.yml");
        state.mark_approved(Stage::Plan, archived.clone(), "fifo");
        assert!(matches!(
            state.require_approved(Stage::Plan),
            Err(BenchError::MissingFile { .. })
        ));

        fs::write(&archived, "x: 1").unwrap();
        assert_eq!(state.require_approved(Stage::Plan).unwrap(), archived);
    }

    #[test]
    fn test_store_roundtrip_and_missing() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("run/.bench.state.json"));

        assert!(store.load().unwrap().is_none());
        assert!(matches!(
            store.load_required(),
            Err(BenchError::StateMissing { .. })
        ));

        let mut state = StageState::new();
        state.module_name = Some("uart".into());
        store.save(&state).unwrap();

        assert_eq!(store.load_required().unwrap(), state);
    }

    #[test]
    fn test_store_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let store = StateStore::new(&path);
        assert!(matches!(
            store.load(),
            Err(BenchError::CorruptState { .. })
        ));
        // Never deleted automatically
        assert!(path.exists());
    }
}
