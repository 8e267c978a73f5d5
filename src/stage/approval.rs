//! Approval of a document stage version.
//!
//! Approving version N of a stage:
//!
//! 1. checks that version N and the stage history exist (no mutation otherwise)
//! 2. renames both to `<module>.<stem>.final.yml` / `<module>.<stem>.history.json`
//! 3. deletes the remaining `<stem>.v*.yml` and `<stem>.v*.error.txt` files
//! 4. records the approval in the state record
//!
//! A failed rename is undone with a best-effort reverse rename.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::artifact::{is_valid_module_name, YamlArtifact};
use super::state::StateStore;
use super::Stage;
use crate::config::WorkspacePaths;
use crate::error::{BenchError, Result};

/// What an approval did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub stage: Stage,
    pub version: u32,
    pub module_name: String,
    pub archived_artifact: PathBuf,
    pub archived_history: PathBuf,
    /// Unapproved sibling versions that were deleted.
    pub removed: Vec<PathBuf>,
}

/// Approve `version` of a document stage.
pub fn approve(stage: Stage, version: u32, paths: &WorkspacePaths) -> Result<ApprovalOutcome> {
    if !stage.is_document() {
        return Err(BenchError::config(format!("the {stage} stage has no approval step")));
    }

    let store = StateStore::new(paths.state_file());
    let mut state = store.load_required()?;

    if state.is_approved(stage) {
        return Err(BenchError::StageAlreadyApproved { stage });
    }
    if let Some(previous) = stage.previous() {
        if !state.is_approved(previous) {
            return Err(BenchError::StageNotApproved { stage: previous });
        }
    }

    let artifact_path = paths.version_file(stage, version);
    if !artifact_path.is_file() {
        return Err(BenchError::MissingArtifact {
            stage,
            version,
            path: artifact_path,
        });
    }
    let history_path = paths.history_file(stage);
    if !history_path.is_file() {
        return Err(BenchError::SessionMissing { path: history_path });
    }

    let module_name = resolve_module_name(stage, &artifact_path, state.module_name.as_deref())?;

    let archived_artifact = paths.archived_artifact(stage, &module_name);
    let archived_history = paths.archived_history(stage, &module_name);
    archive_pair(
        (&artifact_path, &archived_artifact),
        (&history_path, &archived_history),
    )?;

    let removed = remove_siblings(stage, &paths.run_dir)?;

    state.mark_approved(stage, archived_artifact.clone(), &module_name);
    store.save(&state).map_err(|e| BenchError::Archive {
        message: format!(
            "{} archived at {} but the state record was not updated: {}",
            stage,
            archived_artifact.display(),
            e
        ),
    })?;

    info!(
        "Approved {} v{} for module {}",
        stage, version, module_name
    );
    Ok(ApprovalOutcome {
        stage,
        version,
        module_name,
        archived_artifact,
        archived_history,
        removed,
    })
}

/// Module name used in archive names: the specification's `module_name`
/// field, or the name recorded when the specification was approved.
fn resolve_module_name(stage: Stage, artifact: &Path, recorded: Option<&str>) -> Result<String> {
    let name = match stage {
        Stage::Specification => {
            let document = YamlArtifact::load(artifact)?;
            document
                .module_name()
                .map(String::from)
                .ok_or_else(|| BenchError::InvalidArtifact {
                    path: artifact.to_path_buf(),
                    reason: "missing 'module_name'".to_string(),
                })?
        }
        _ => recorded.map(String::from).ok_or_else(|| {
            BenchError::config("the state record names no module; approve the specification first")
        })?,
    };

    if !is_valid_module_name(&name) {
        return Err(BenchError::InvalidArtifact {
            path: artifact.to_path_buf(),
            reason: format!("module name '{name}' is not usable in file names"),
        });
    }
    Ok(name)
}

/// Rename the artifact, then the history; undo the first rename if the
/// second fails.
fn archive_pair(artifact: (&Path, &Path), history: (&Path, &Path)) -> Result<()> {
    archive_pair_with(artifact, history, |from, to| fs::rename(from, to))
}

fn archive_pair_with<F>(
    artifact: (&Path, &Path),
    history: (&Path, &Path),
    mut rename: F,
) -> Result<()>
where
    F: FnMut(&Path, &Path) -> std::io::Result<()>,
{
    let (artifact_from, artifact_to) = artifact;
    let (history_from, history_to) = history;

    rename(artifact_from, artifact_to).map_err(|e| BenchError::Archive {
        message: format!(
            "could not move {} to {}: {}",
            artifact_from.display(),
            artifact_to.display(),
            e
        ),
    })?;
    debug!("Archived {}", artifact_to.display());

    if let Err(e) = rename(history_from, history_to) {
        warn!(
            "Could not archive history {}: {}; restoring {}",
            history_from.display(),
            e,
            artifact_from.display()
        );
        if let Err(rollback) = rename(artifact_to, artifact_from) {
            error!(
                "Rollback failed: {} is still at {}",
                artifact_from.display(),
                artifact_to.display()
            );
            return Err(BenchError::ArchiveRollbackFailed {
                original: artifact_from.to_path_buf(),
                archived: artifact_to.to_path_buf(),
                message: format!("{e}; rollback: {rollback}"),
            });
        }
        return Err(BenchError::Archive {
            message: format!(
                "could not move {} to {}: {}",
                history_from.display(),
                history_to.display(),
                e
            ),
        });
    }
    debug!("Archived {}", history_to.display());
    Ok(())
}

fn sibling_globs(stage: Stage) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in [
        format!("{}.v*.yml", stage.stem()),
        format!("{}.v*.error.txt", stage.stem()),
    ] {
        builder.add(Glob::new(&pattern).map_err(anyhow::Error::from)?);
    }
    Ok(builder.build().map_err(anyhow::Error::from)?)
}

/// Delete unapproved version files of `stage` in `run_dir`.
fn remove_siblings(stage: Stage, run_dir: &Path) -> Result<Vec<PathBuf>> {
    let globs = sibling_globs(stage)?;
    let mut removed = Vec::new();

    for entry in fs::read_dir(run_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !globs.is_match(entry.file_name()) {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Could not delete {}: {}", path.display(), e),
        }
    }
    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::stage::state::StageState;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, WorkspacePaths) {
        let temp = TempDir::new().unwrap();
        let paths = Settings::default().paths(temp.path());
        fs::create_dir_all(&paths.run_dir).unwrap();
        StateStore::new(paths.state_file())
            .save(&StageState::new())
            .unwrap();
        (temp, paths)
    }

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_approve_spec() {
        let (_temp, paths) = workspace();
        let stage = Stage::Specification;
        write(&paths.version_file(stage, 1), "module_name: old\n");
        write(&paths.version_file(stage, 2), "module_name: fifo\n");
        write(&paths.error_file(stage, 3), "garbage");
        write(&paths.history_file(stage), "[]");

        let outcome = approve(stage, 2, &paths).unwrap();

        assert_eq!(outcome.module_name, "fifo");
        assert_eq!(
            fs::read_to_string(paths.run_dir.join("fifo.design_spec.final.yml")).unwrap(),
            "module_name: fifo\n"
        );
        assert!(paths.run_dir.join("fifo.design_spec.history.json").exists());
        assert!(!paths.history_file(stage).exists());
        assert!(!paths.version_file(stage, 1).exists());
        assert!(!paths.error_file(stage, 3).exists());
        assert_eq!(outcome.removed.len(), 2);

        let state = StateStore::new(paths.state_file()).load_required().unwrap();
        assert!(state.spec_approved);
        assert_eq!(state.current_stage, Stage::Plan);
        assert_eq!(state.module_name.as_deref(), Some("fifo"));
        assert_eq!(
            state.final_spec_file.as_deref(),
            Some(outcome.archived_artifact.as_path())
        );
    }

    #[test]
    fn test_missing_version_leaves_flag_unset() {
        let (_temp, paths) = workspace();
        let stage = Stage::Specification;
        write(&paths.version_file(stage, 1), "module_name: fifo\n");
        write(&paths.history_file(stage), "[]");

        let err = approve(stage, 2, &paths).unwrap_err();
        assert!(matches!(
            err,
            BenchError::MissingArtifact { version: 2, .. }
        ));

        let state = StateStore::new(paths.state_file()).load_required().unwrap();
        assert!(!state.spec_approved);
        assert!(paths.version_file(stage, 1).exists());
        assert!(paths.history_file(stage).exists());
    }

    #[test]
    fn test_missing_history() {
        let (_temp, paths) = workspace();
        write(&paths.version_file(Stage::Specification, 1), "module_name: fifo\n");
        assert!(matches!(
            approve(Stage::Specification, 1, &paths),
            Err(BenchError::SessionMissing { .. })
        ));
    }

    #[test]
    fn test_spec_without_module_name() {
        let (_temp, paths) = workspace();
        let stage = Stage::Specification;
        write(&paths.version_file(stage, 1), "ports: []\n");
        write(&paths.history_file(stage), "[]");

        assert!(matches!(
            approve(stage, 1, &paths),
            Err(BenchError::InvalidArtifact { .. })
        ));
        assert!(paths.version_file(stage, 1).exists());
    }

    #[test]
    fn test_plan_requires_spec_approval() {
        let (_temp, paths) = workspace();
        write(&paths.version_file(Stage::Plan, 1), "uvm_topology: {}\n");
        write(&paths.history_file(Stage::Plan), "[]");
        assert!(matches!(
            approve(Stage::Plan, 1, &paths),
            Err(BenchError::StageNotApproved {
                stage: Stage::Specification
            })
        ));
    }

    #[test]
    fn test_approve_plan_uses_recorded_module() {
        let (_temp, paths) = workspace();
        let store = StateStore::new(paths.state_file());
        let mut state = StageState::new();
        let spec_final = paths.archived_artifact(Stage::Specification, "fifo");
        write(&spec_final, "module_name: fifo\n");
        state.mark_approved(Stage::Specification, spec_final, "fifo");
        store.save(&state).unwrap();

        write(&paths.version_file(Stage::Plan, 1), "uvm_topology: {}\n");
        write(&paths.history_file(Stage::Plan), "[]");

        let outcome = approve(Stage::Plan, 1, &paths).unwrap();
        assert_eq!(
            outcome.archived_artifact,
            paths.run_dir.join("fifo.verif_plan.final.yml")
        );
        let state = store.load_required().unwrap();
        assert!(state.plan_approved);
        assert_eq!(state.current_stage, Stage::Scaffold);
    }

    #[test]
    fn test_already_approved() {
        let (_temp, paths) = workspace();
        let store = StateStore::new(paths.state_file());
        let mut state = StageState::new();
        state.mark_approved(Stage::Specification, paths.run_dir.join("x.yml"), "x");
        store.save(&state).unwrap();

        assert!(matches!(
            approve(Stage::Specification, 1, &paths),
            Err(BenchError::StageAlreadyApproved { .. })
        ));
    }

    #[test]
    fn test_history_rename_failure_rolls_back() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("design_spec.v1.yml");
        let archived = temp.path().join("m.design_spec.final.yml");
        write(&artifact, "module_name: m\n");

        let missing_history = temp.path().join("absent.history.json");
        let err = archive_pair(
            (&artifact, &archived),
            (&missing_history, &temp.path().join("m.history.json")),
        )
        .unwrap_err();

        assert!(matches!(err, BenchError::Archive { .. }));
        assert!(artifact.exists());
        assert!(!archived.exists());
    }

    #[test]
    fn test_failed_rollback_names_both_locations() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("design_spec.v1.yml");
        let archived = temp.path().join("m.design_spec.final.yml");
        let history = temp.path().join("design_spec.history.json");
        write(&artifact, "module_name: m\n");
        write(&history, "[]");

        // Only the first rename goes through
        let mut calls = 0;
        let err = archive_pair_with(
            (&artifact, &archived),
            (&history, &temp.path().join("m.design_spec.history.json")),
            |from, to| {
                calls += 1;
                if calls == 1 {
                    fs::rename(from, to)
                } else {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "read-only run directory",
                    ))
                }
            },
        )
        .unwrap_err();

        assert_eq!(calls, 3);
        match &err {
            BenchError::ArchiveRollbackFailed {
                original,
                archived: left_at,
                message,
            } => {
                assert_eq!(original, &artifact);
                assert_eq!(left_at, &archived);
                assert!(message.contains("read-only run directory"));
            }
            other => panic!("unexpected error: {other}"),
        }
        let text = err.to_string();
        assert!(text.contains(&artifact.display().to_string()));
        assert!(text.contains(&archived.display().to_string()));
        assert!(archived.exists());
        assert!(history.exists());
    }

    #[test]
    fn test_scaffold_has_no_approval() {
        let (_temp, paths) = workspace();
        assert!(approve(Stage::Scaffold, 1, &paths).is_err());
    }
}
