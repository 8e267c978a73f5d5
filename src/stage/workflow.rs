//! Init and iterate commands of the document stages, plus the workspace
//! status report.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::artifact::{ArtifactSummary, YamlArtifact};
use super::state::{StageState, StateStore};
use super::Stage;
use crate::config::{Settings, WorkspacePaths};
use crate::error::{BenchError, Result};
use crate::llm::ChatService;
use crate::prompts;
use crate::session::ConversationSession;
use crate::workspace::write_atomic;

const VERSION_SUFFIX: &str = ".yml";
const ERROR_SUFFIX: &str = ".error.txt";

/// Reviewer feedback for an iterate turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Message(String),
    /// A file whose whole content is the feedback.
    File(PathBuf),
}

impl Feedback {
    pub fn text(&self) -> Result<String> {
        match self {
            Feedback::Message(text) => Ok(text.clone()),
            Feedback::File(path) => {
                if !path.is_file() {
                    return Err(BenchError::missing_file(path));
                }
                Ok(fs::read_to_string(path)?)
            }
        }
    }
}

/// A document version written by init or iterate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedVersion {
    pub stage: Stage,
    pub version: u32,
    pub path: PathBuf,
    pub summary: ArtifactSummary,
    pub persist_warning: Option<String>,
}

/// Generation commands of one document stage.
pub struct DocumentWorkflow<'a> {
    stage: Stage,
    settings: &'a Settings,
    paths: &'a WorkspacePaths,
}

impl<'a> DocumentWorkflow<'a> {
    /// Fails for the scaffold stage, which has no document workflow.
    pub fn new(stage: Stage, settings: &'a Settings, paths: &'a WorkspacePaths) -> Result<Self> {
        if !stage.is_document() {
            return Err(BenchError::config(format!(
                "the {stage} stage does not produce documents"
            )));
        }
        Ok(Self {
            stage,
            settings,
            paths,
        })
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Start the specification conversation from RTL source and a description.
    pub async fn init_spec(
        &self,
        service: &dyn ChatService,
        rtl: &Path,
        description: &str,
    ) -> Result<GeneratedVersion> {
        self.expect_stage(Stage::Specification)?;

        if !rtl.is_file() {
            return Err(BenchError::missing_file(rtl));
        }
        let template = self.read_template()?;

        let store = StateStore::new(self.paths.state_file());
        let state = store.load_or_default()?;
        self.check_startable(&state)?;

        let rtl_source = fs::read_to_string(rtl)?;
        if !store.exists() {
            store.save(&state)?;
            info!("Created stage state {}", store.path().display());
        }

        let prompt = prompts::spec_init_prompt(&rtl_source, description, template.as_deref());
        self.start_session(service, &prompt).await
    }

    /// Start the plan conversation from the approved specification.
    pub async fn init_plan(&self, service: &dyn ChatService) -> Result<GeneratedVersion> {
        self.expect_stage(Stage::Plan)?;

        let state = StateStore::new(self.paths.state_file()).load_required()?;
        let spec_file = state.require_approved(Stage::Specification)?.to_path_buf();
        self.check_startable(&state)?;
        let template = self.read_template()?;

        let spec = YamlArtifact::load(&spec_file)?;
        let prompt = prompts::plan_init_prompt(spec.text(), template.as_deref());
        self.start_session(service, &prompt).await
    }

    /// Continue the stage conversation with feedback.
    ///
    /// Without an explicit version the next free number is used.
    pub async fn iterate(
        &self,
        service: &dyn ChatService,
        feedback: &Feedback,
        version: Option<u32>,
    ) -> Result<GeneratedVersion> {
        let state = StateStore::new(self.paths.state_file()).load_required()?;
        if state.is_approved(self.stage) {
            return Err(BenchError::StageAlreadyApproved { stage: self.stage });
        }

        let mut session = ConversationSession::resume(self.paths.history_file(self.stage))?;
        let feedback = feedback.text()?;

        let version = match version {
            Some(0) => {
                return Err(BenchError::invalid_config("version", "must be at least 1"));
            }
            Some(v) => v,
            None => self.next_version()?,
        };
        if self.paths.version_file(self.stage, version).exists() {
            warn!(
                "Version {} of the {} already exists and will be replaced",
                version, self.stage
            );
        }

        self.generate(service, &mut session, &prompts::iterate_prompt(&feedback), version)
            .await
    }

    /// Version numbers present in the run directory, valid or not, ascending.
    pub fn existing_versions(&self) -> Result<Vec<u32>> {
        let mut versions = scan_versions(&self.paths.run_dir, self.stage)?
            .into_iter()
            .map(|(version, _, _)| version)
            .collect::<Vec<_>>();
        versions.sort_unstable();
        versions.dedup();
        Ok(versions)
    }

    /// One past the highest existing version, and never below 2.
    pub fn next_version(&self) -> Result<u32> {
        let highest = self.existing_versions()?.last().copied().unwrap_or(0);
        Ok((highest + 1).max(2))
    }

    fn expect_stage(&self, stage: Stage) -> Result<()> {
        if self.stage != stage {
            return Err(BenchError::config(format!(
                "{} command used on the {} workflow",
                stage, self.stage
            )));
        }
        Ok(())
    }

    fn check_startable(&self, state: &StageState) -> Result<()> {
        if state.is_approved(self.stage) {
            return Err(BenchError::StageAlreadyApproved { stage: self.stage });
        }
        let history = self.paths.history_file(self.stage);
        if history.exists() {
            return Err(BenchError::SessionExists {
                stage: self.stage,
                path: history,
            });
        }
        Ok(())
    }

    fn read_template(&self) -> Result<Option<String>> {
        let Some(template) = self.settings.templates.for_stage(self.stage) else {
            return Ok(None);
        };
        let path = self.paths.resolve(template);
        if !path.is_file() {
            return Err(BenchError::missing_file(path));
        }
        debug!("Using {} template {}", self.stage, path.display());
        Ok(Some(fs::read_to_string(path)?))
    }

    async fn start_session(
        &self,
        service: &dyn ChatService,
        prompt: &str,
    ) -> Result<GeneratedVersion> {
        let system = prompts::system_prompt(self.stage, &self.settings.protocol.prefix);
        let mut session =
            ConversationSession::load_or_init(self.paths.history_file(self.stage), &system)?;
        self.generate(service, &mut session, prompt, 1).await
    }

    async fn generate(
        &self,
        service: &dyn ChatService,
        session: &mut ConversationSession,
        prompt: &str,
        version: u32,
    ) -> Result<GeneratedVersion> {
        let outcome = session.turn(service, prompt).await?;
        let error_path = self.paths.error_file(self.stage, version);

        match YamlArtifact::from_reply(&outcome.text) {
            Ok(document) => {
                let path = self.paths.version_file(self.stage, version);
                write_atomic(&path, document.text().as_bytes())?;
                if error_path.exists() {
                    fs::remove_file(&error_path)?;
                }
                info!("Wrote {} v{}: {}", self.stage, version, path.display());
                Ok(GeneratedVersion {
                    stage: self.stage,
                    version,
                    path,
                    summary: document.summary(),
                    persist_warning: outcome.persist_warning,
                })
            }
            Err(reason) => {
                write_atomic(&error_path, outcome.text.as_bytes())?;
                warn!(
                    "{} v{} is not valid YAML, raw reply kept in {}",
                    self.stage,
                    version,
                    error_path.display()
                );
                Err(BenchError::InvalidArtifact {
                    path: error_path,
                    reason,
                })
            }
        }
    }
}

/// Parse `<stem>.v<N>.yml` and `<stem>.v<N>.error.txt` names.
fn parse_version(file_name: &str, stem: &str) -> Option<(u32, bool)> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix(".v")?;
    if let Some(number) = rest.strip_suffix(ERROR_SUFFIX) {
        return number.parse().ok().map(|v| (v, true));
    }
    rest.strip_suffix(VERSION_SUFFIX)?
        .parse()
        .ok()
        .map(|v| (v, false))
}

/// `(version, invalid, path)` for every version file of `stage`.
fn scan_versions(run_dir: &Path, stage: Stage) -> Result<Vec<(u32, bool, PathBuf)>> {
    if !run_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(run_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some((version, invalid)) = name.to_str().and_then(|n| parse_version(n, stage.stem()))
        {
            found.push((version, invalid, entry.path()));
        }
    }
    found.sort();
    Ok(found)
}

/// An unapproved version file waiting in the run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVersion {
    pub stage: Stage,
    pub version: u32,
    pub path: PathBuf,
    /// The raw reply of a version that failed validation.
    pub invalid: bool,
}

/// Snapshot of the workspace for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    pub run_dir: PathBuf,
    pub state: Option<StageState>,
    /// Stages with a conversation in progress.
    pub open_sessions: Vec<Stage>,
    pub pending: Vec<PendingVersion>,
    pub report: Option<PathBuf>,
}

/// Collect the workspace status without modifying anything.
pub fn workspace_status(paths: &WorkspacePaths) -> Result<WorkspaceStatus> {
    let state = StateStore::new(paths.state_file()).load()?;

    let open_sessions = Stage::ALL
        .into_iter()
        .filter(|stage| paths.history_file(*stage).exists())
        .collect();

    let mut pending = Vec::new();
    for stage in Stage::ALL.into_iter().filter(Stage::is_document) {
        for (version, invalid, path) in scan_versions(&paths.run_dir, stage)? {
            pending.push(PendingVersion {
                stage,
                version,
                path,
                invalid,
            });
        }
    }

    let report = Some(paths.report_file()).filter(|p| p.exists());

    Ok(WorkspaceStatus {
        run_dir: paths.run_dir.clone(),
        state,
        open_sessions,
        pending,
        report,
    })
}
