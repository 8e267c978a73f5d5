//! Sequencing of generation tasks over one conversation.
//!
//! For each [`Task`] the [`TaskOrchestrator`]:
//!
//! 1. renders the task prompt against the [`BuildContext`]
//! 2. appends reference documents, dependency files and the target file
//! 3. runs one session turn
//! 4. parses the reply, applies every patch and merges context entries
//!
//! Tasks run strictly in order. A failing task aborts the run; patches
//! already written by earlier tasks stay on disk.

pub mod context;
pub mod pipeline;
pub mod report;
pub mod template;

use std::fs;

use tracing::{debug, info, warn};

pub use context::BuildContext;
pub use pipeline::scaffold_pipeline;
pub use report::{FailedPatch, RunReport, RunStatus, TaskReport};
pub use template::render_template;

use crate::error::{BenchError, Result};
use crate::llm::ChatService;
use crate::patch::BlockPatcher;
use crate::prompts::format_reminder;
use crate::protocol::ReplyParser;
use crate::session::ConversationSession;

/// One generation step targeting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    /// Path of the edited file, relative to the bench directory.
    pub target_file: String,
    /// Files shown to the model for reference, when they exist.
    pub dependency_files: Vec<String>,
    pub prompt_template: String,
}

impl Task {
    #[must_use]
    pub fn new(name: &str, target_file: &str, prompt_template: &str) -> Self {
        Self {
            name: name.to_string(),
            target_file: target_file.to_string(),
            dependency_files: Vec::new(),
            prompt_template: prompt_template.to_string(),
        }
    }

    #[must_use]
    pub fn with_dependency(mut self, file: &str) -> Self {
        self.dependency_files.push(file.to_string());
        self
    }

    #[must_use]
    pub fn with_dependencies<'a>(mut self, files: impl IntoIterator<Item = &'a str>) -> Self {
        self.dependency_files
            .extend(files.into_iter().map(String::from));
        self
    }
}

/// A document included in every task prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub label: String,
    pub content: String,
}

/// Drives tasks through a session and applies their replies.
pub struct TaskOrchestrator<'a> {
    service: &'a dyn ChatService,
    patcher: BlockPatcher,
    parser: ReplyParser,
    references: Vec<Reference>,
    context: BuildContext,
    strict: bool,
    report: RunReport,
}

impl<'a> TaskOrchestrator<'a> {
    #[must_use]
    pub fn new(service: &'a dyn ChatService, patcher: BlockPatcher, parser: ReplyParser) -> Self {
        let report = RunReport::start(service.model_name());
        Self {
            service,
            patcher,
            parser,
            references: Vec::new(),
            context: BuildContext::new(),
            strict: true,
            report,
        }
    }

    #[must_use]
    pub fn with_reference(mut self, label: &str, content: impl Into<String>) -> Self {
        self.references.push(Reference {
            label: label.to_string(),
            content: content.into(),
        });
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: BuildContext) -> Self {
        self.context = context;
        self
    }

    /// Abort on the first reply with a failed patch (default `true`).
    #[must_use]
    pub fn with_strict_patches(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[must_use]
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    #[must_use]
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    #[must_use]
    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Build the full prompt for `task` from the current state of the files.
    pub fn assemble_prompt(&self, task: &Task) -> Result<String> {
        let prefix = &self.parser.syntax().prefix;
        let mut prompt = render_template(&task.prompt_template, &self.context, prefix);

        for reference in &self.references {
            prompt.push_str(&format!(
                "\n\n--- REFERENCE: {label} ---\n{content}\n--- END REFERENCE: {label} ---",
                label = reference.label,
                content = reference.content.trim_end()
            ));
        }

        for dependency in &task.dependency_files {
            let path = self.patcher.resolve(dependency)?;
            if !path.is_file() {
                debug!("Dependency {} not present, omitted from prompt", dependency);
                continue;
            }
            let content = fs::read_to_string(&path)?;
            prompt.push_str(&format!(
                "\n\n--- DEPENDENCY FILE: {dependency} ---\n{}\n--- END FILE: {dependency} ---",
                content.trim_end()
            ));
        }

        let target = self.patcher.resolve(&task.target_file)?;
        if !target.is_file() {
            return Err(BenchError::missing_file(target));
        }
        let content = fs::read_to_string(&target)?;
        prompt.push_str(&format!(
            "\n\n--- CURRENT FILE: {file} ---\n{}\n--- END FILE: {file} ---",
            content.trim_end(),
            file = task.target_file
        ));

        prompt.push_str("\n\n");
        prompt.push_str(&format_reminder(prefix));
        Ok(prompt)
    }

    /// Run one task: prompt, turn, parse, patch, merge.
    pub async fn run_task(&mut self, session: &mut ConversationSession, task: &Task) -> Result<()> {
        info!("Task {}: {}", task.name, task.target_file);
        let prompt = self.assemble_prompt(task)?;
        let outcome = session.turn(self.service, &prompt).await?;

        let mut task_report = TaskReport::new(&task.name, &task.target_file);
        task_report.persist_warning = outcome.persist_warning;
        self.apply_reply(&outcome.text, task_report)
    }

    /// Parse a reply, apply its patches and merge its context.
    ///
    /// Every patch is attempted. In strict mode the reply fails with
    /// [`BenchError::PatchesFailed`] afterwards if any of them did not apply.
    pub fn apply_reply(&mut self, reply: &str, mut task_report: TaskReport) -> Result<()> {
        let parsed = self.parser.parse(reply);
        if parsed.is_empty() {
            warn!("Reply for {} contained no usable segments", task_report.task);
        }

        for patch in &parsed.patches {
            match self.patcher.apply(patch) {
                Ok(_) => task_report
                    .applied
                    .push(format!("{}:{}", patch.file, patch.block_id)),
                Err(e) => {
                    warn!("Patch {}:{} failed: {}", patch.file, patch.block_id, e);
                    task_report.failed.push(FailedPatch {
                        file: patch.file.clone(),
                        block_id: patch.block_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        task_report.context_keys = self.context.merge(&parsed.context);
        task_report.segment_errors = parsed.errors;

        let failed = task_report.failed.len();
        let task = task_report.task.clone();
        info!(
            "Task {}: {} patches applied, {} failed, {} context keys",
            task,
            task_report.applied.len(),
            failed,
            task_report.context_keys.len()
        );
        self.report.tasks.push(task_report);

        if self.strict && failed > 0 {
            return Err(BenchError::PatchesFailed { task, failed });
        }
        Ok(())
    }

    /// Run `tasks` in order, stopping at the first failure.
    pub async fn run(&mut self, session: &mut ConversationSession, tasks: &[Task]) -> Result<()> {
        for task in tasks {
            if let Err(e) = self.run_task(session, task).await {
                self.report.finish(RunStatus::Aborted(e.to_string()));
                return Err(e);
            }
        }
        self.report.finish(RunStatus::Completed);
        Ok(())
    }

    /// Mark the report finished after a single reply was applied.
    pub fn finish(&mut self, result: &Result<()>) {
        let status = match result {
            Ok(()) => RunStatus::Completed,
            Err(e) => RunStatus::Aborted(e.to_string()),
        };
        self.report.finish(status);
    }
}
