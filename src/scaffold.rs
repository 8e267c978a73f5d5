//! The scaffold stage: fill a skeleton test bench task by task.
//!
//! `build` seeds a [`BuildContext`] from the approved documents, copies the
//! skeleton tree into the bench directory and runs the fixed pipeline over
//! a fresh conversation. `fix` continues that conversation with a failing
//! run log and applies the corrections. Both write a [`RunReport`], also
//! when they fail part way.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{Settings, WorkspacePaths};
use crate::error::{BenchError, Result};
use crate::llm::ChatService;
use crate::orchestrator::{scaffold_pipeline, BuildContext, RunReport, TaskOrchestrator, TaskReport};
use crate::patch::{BlockPatchEngine, BlockPatcher};
use crate::prompts;
use crate::protocol::ReplyParser;
use crate::session::{ConversationSession, HistoryStore};
use crate::stage::{Stage, StageState, StateStore, YamlArtifact};

/// Reference labels used in task prompts.
const SPEC_REFERENCE: &str = "DESIGN SPECIFICATION";
const PLAN_REFERENCE: &str = "VERIFICATION PLAN";

/// Result of a scaffold command that ran to the end.
#[derive(Debug, Clone)]
pub struct ScaffoldOutcome {
    pub report: RunReport,
    pub report_path: PathBuf,
    /// Files copied from the skeleton tree, zero when none is configured.
    pub copied_files: usize,
}

/// Scaffold stage commands over one workspace.
pub struct ScaffoldStage<'a> {
    settings: &'a Settings,
    paths: &'a WorkspacePaths,
}

impl<'a> ScaffoldStage<'a> {
    #[must_use]
    pub fn new(settings: &'a Settings, paths: &'a WorkspacePaths) -> Self {
        Self { settings, paths }
    }

    /// Generate the test bench from the approved specification and plan.
    ///
    /// With `force`, an unfinished scaffold conversation is discarded
    /// instead of refusing to start.
    pub async fn build(&self, service: &dyn ChatService, force: bool) -> Result<ScaffoldOutcome> {
        let state = StateStore::new(self.paths.state_file()).load_required()?;
        let (spec, plan) = self.approved_documents(&state)?;

        if state.current_stage != Stage::Scaffold {
            warn!(
                "State record is at the {} stage; continuing with scaffold",
                state.current_stage
            );
        }

        let history = HistoryStore::new(self.paths.history_file(Stage::Scaffold));
        if history.exists() && !force {
            return Err(BenchError::SessionExists {
                stage: Stage::Scaffold,
                path: history.path().to_path_buf(),
            });
        }
        self.check_bench_source()?;

        // Preconditions hold; mutations start here
        if history.remove()? {
            warn!("Discarded previous scaffold conversation {}", history.path().display());
        }
        let copied_files = match &self.paths.skeleton_dir {
            Some(skeleton) => copy_skeleton(skeleton, &self.paths.bench_dir)?,
            None => 0,
        };

        let context = BuildContext::seeded(Some(spec.value()), Some(plan.value()));
        let mut orchestrator = self
            .orchestrator(service)
            .with_reference(SPEC_REFERENCE, spec.text())
            .with_reference(PLAN_REFERENCE, plan.text())
            .with_context(context);

        let system = prompts::system_prompt(Stage::Scaffold, &self.settings.protocol.prefix);
        let mut session = ConversationSession::load_or_init(history.path(), &system)?;

        let tasks = scaffold_pipeline();
        info!("Running {} scaffold tasks with {}", tasks.len(), service.model_name());
        let result = orchestrator.run(&mut session, &tasks).await;

        self.conclude(orchestrator.into_report(), result, copied_files)
    }

    /// Send a failing run log and apply the corrected blocks.
    pub async fn fix(&self, service: &dyn ChatService, log_file: &Path) -> Result<ScaffoldOutcome> {
        let state = StateStore::new(self.paths.state_file()).load_required()?;
        state.require_approved(Stage::Plan)?;

        if !log_file.is_file() {
            return Err(BenchError::missing_file(log_file));
        }
        let mut session = ConversationSession::resume(self.paths.history_file(Stage::Scaffold))?;
        let log = fs::read_to_string(log_file)?;

        let mut orchestrator = self.orchestrator(service);
        let prompt = prompts::scaffold_fix_prompt(&log, &self.settings.protocol.prefix);
        debug!("Fix prompt carries {} bytes of log", log.len());

        let result = match session.turn(service, &prompt).await {
            Ok(outcome) => {
                let mut task_report = TaskReport::new("fix", "*");
                task_report.persist_warning = outcome.persist_warning;
                orchestrator.apply_reply(&outcome.text, task_report)
            }
            Err(e) => Err(e),
        };
        orchestrator.finish(&result);

        self.conclude(orchestrator.into_report(), result, 0)
    }

    fn approved_documents(&self, state: &StageState) -> Result<(YamlArtifact, YamlArtifact)> {
        let plan_file = state.require_approved(Stage::Plan)?;
        let spec_file = state.require_approved(Stage::Specification)?;
        Ok((YamlArtifact::load(spec_file)?, YamlArtifact::load(plan_file)?))
    }

    /// The skeleton tree must exist when configured, the bench directory otherwise.
    fn check_bench_source(&self) -> Result<()> {
        let bench = &self.paths.bench_dir;
        match &self.paths.skeleton_dir {
            Some(skeleton) => {
                if !skeleton.is_dir() {
                    return Err(BenchError::missing_file(skeleton));
                }
                if self.paths.project_dir.starts_with(bench)
                    || self.paths.run_dir.starts_with(bench)
                    || skeleton.starts_with(bench)
                {
                    return Err(BenchError::invalid_config(
                        "benchDir",
                        "must not contain the project, run or skeleton directory",
                    ));
                }
            }
            None => {
                if !bench.is_dir() {
                    return Err(BenchError::missing_file(bench));
                }
            }
        }
        Ok(())
    }

    fn orchestrator<'s>(&self, service: &'s dyn ChatService) -> TaskOrchestrator<'s> {
        let engine = BlockPatchEngine::new(self.settings.markers.clone(), &self.settings.protocol);
        let patcher = BlockPatcher::new(&self.paths.bench_dir, engine);
        let parser = ReplyParser::new(self.settings.protocol.clone());
        TaskOrchestrator::new(service, patcher, parser)
            .with_strict_patches(self.settings.strict_patches)
    }

    /// Persist the report whatever the outcome, then surface the run result.
    fn conclude(
        &self,
        report: RunReport,
        result: Result<()>,
        copied_files: usize,
    ) -> Result<ScaffoldOutcome> {
        let report_path = self.paths.report_file();
        let saved = report.save(&report_path);

        if let Err(e) = result {
            match saved {
                Ok(()) => info!("Partial report written to {}", report_path.display()),
                Err(save_error) => warn!("Could not write report: {}", save_error),
            }
            return Err(e);
        }
        saved?;

        info!(
            "Scaffold run finished: {} patches applied, report at {}",
            report.applied_count(),
            report_path.display()
        );
        Ok(ScaffoldOutcome {
            report,
            report_path,
            copied_files,
        })
    }
}

/// Replace `target` with a copy of the `source` tree. Returns the number of
/// files copied.
pub fn copy_skeleton(source: &Path, target: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(BenchError::missing_file(source));
    }
    if target.exists() {
        debug!("Removing previous bench directory {}", target.display());
        fs::remove_dir_all(target)?;
    }
    fs::create_dir_all(target)?;

    let mut copied = 0;
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(anyhow::Error::from)?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &destination)?;
            copied += 1;
        }
    }

    info!(
        "Copied {} skeleton files from {} to {}",
        copied,
        source.display(),
        target.display()
    );
    Ok(copied)
}
