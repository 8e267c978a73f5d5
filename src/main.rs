//! Benchwright - staged test-bench generation
//!
//! Command-line front end: one subcommand group per stage plus `status`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgGroup, Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use benchwright::stage::{workspace_status, WorkspaceStatus};
use benchwright::{
    approve, build_chat_service, ApprovalOutcome, DocumentWorkflow, Feedback,
    GeneratedVersion, Result, RunReport, ScaffoldOutcome, ScaffoldStage, Settings, Stage,
    WorkspaceLock, WorkspacePaths,
};

#[derive(Parser)]
#[command(name = "benchwright")]
#[command(version)]
#[command(about = "Generate a verification test bench through reviewed, gated stages", long_about = None)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Design specification stage
    Spec {
        #[command(subcommand)]
        action: SpecAction,
    },

    /// Verification plan stage
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Test-bench scaffold stage
    Scaffold {
        #[command(subcommand)]
        action: ScaffoldAction,
    },

    /// Show stage state, open conversations and pending versions
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SpecAction {
    /// Start the specification conversation
    Init {
        /// RTL source file of the design
        #[arg(long)]
        rtl: PathBuf,

        /// Short functional description
        #[arg(long)]
        desc: String,
    },

    /// Generate a revised version from feedback
    Iterate(IterateArgs),

    /// Approve a version and unlock the plan stage
    Approve {
        /// Version number to approve
        #[arg(long)]
        version: u32,
    },
}

#[derive(Subcommand)]
enum PlanAction {
    /// Start the plan conversation from the approved specification
    Init,

    /// Generate a revised version from feedback
    Iterate(IterateArgs),

    /// Approve a version and unlock the scaffold stage
    Approve {
        /// Version number to approve
        #[arg(long)]
        version: u32,
    },
}

#[derive(Subcommand)]
enum ScaffoldAction {
    /// Copy the skeleton and fill it task by task
    Build {
        /// Discard an unfinished scaffold conversation
        #[arg(long)]
        force: bool,
    },

    /// Send a failing run log and apply the corrections
    Fix {
        /// Log file of the failing simulation
        #[arg(long)]
        feedback: PathBuf,
    },
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["message", "feedback"])
))]
struct IterateArgs {
    /// Feedback text
    #[arg(short, long)]
    message: Option<String>,

    /// File containing the feedback
    #[arg(short, long)]
    feedback: Option<PathBuf>,

    /// Version number to write (defaults to the next free one)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    version: Option<u32>,
}

impl IterateArgs {
    fn into_parts(self) -> (Feedback, Option<u32>) {
        let feedback = match (self.message, self.feedback) {
            (Some(text), _) => Feedback::Message(text),
            (None, Some(path)) => Feedback::File(path),
            (None, None) => Feedback::Message(String::new()),
        };
        (feedback, self.version)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    // Resolve project path
    let project_path = cli
        .project
        .canonicalize()
        .unwrap_or_else(|_| cli.project.clone());

    if !project_path.is_dir() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, &project_path).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if e.is_recoverable() {
            eprintln!(
                "{} The conversation history was kept; continue with the stage's iterate or fix command.",
                "Note:".yellow()
            );
        }
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "benchwright=debug,info"
    } else {
        "benchwright=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(command: Commands, project: &Path) -> Result<()> {
    let settings = Settings::load(project)?;
    let paths = settings.paths(project);
    debug!("Workspace run directory: {}", paths.run_dir.display());

    match command {
        Commands::Status { json } => print_status(&workspace_status(&paths)?, json),

        Commands::Spec { action } => {
            let _lock = WorkspaceLock::acquire(paths.lock_file())?;
            match action {
                SpecAction::Init { rtl, desc } => {
                    let service = build_chat_service(&settings.llm, &paths)?;
                    let workflow = DocumentWorkflow::new(Stage::Specification, &settings, &paths)?;
                    let generated = with_spinner(
                        "Generating design specification",
                        workflow.init_spec(service.as_ref(), &rtl, &desc),
                    )
                    .await?;
                    print_generated(&generated);
                    Ok(())
                }
                SpecAction::Iterate(args) => {
                    iterate_stage(Stage::Specification, args, &settings, &paths).await
                }
                SpecAction::Approve { version } => {
                    print_approval(&approve(Stage::Specification, version, &paths)?);
                    Ok(())
                }
            }
        }

        Commands::Plan { action } => {
            let _lock = WorkspaceLock::acquire(paths.lock_file())?;
            match action {
                PlanAction::Init => {
                    let service = build_chat_service(&settings.llm, &paths)?;
                    let workflow = DocumentWorkflow::new(Stage::Plan, &settings, &paths)?;
                    let generated = with_spinner(
                        "Generating verification plan",
                        workflow.init_plan(service.as_ref()),
                    )
                    .await?;
                    print_generated(&generated);
                    Ok(())
                }
                PlanAction::Iterate(args) => iterate_stage(Stage::Plan, args, &settings, &paths).await,
                PlanAction::Approve { version } => {
                    print_approval(&approve(Stage::Plan, version, &paths)?);
                    Ok(())
                }
            }
        }

        Commands::Scaffold { action } => {
            let _lock = WorkspaceLock::acquire(paths.lock_file())?;
            let service = build_chat_service(&settings.llm, &paths)?;
            let stage = ScaffoldStage::new(&settings, &paths);
            let result = match action {
                ScaffoldAction::Build { force } => {
                    with_spinner(
                        "Running scaffold pipeline",
                        stage.build(service.as_ref(), force),
                    )
                    .await
                }
                ScaffoldAction::Fix { feedback } => {
                    with_spinner(
                        "Requesting corrections",
                        stage.fix(service.as_ref(), &feedback),
                    )
                    .await
                }
            };
            match result {
                Ok(outcome) => {
                    print_scaffold(&outcome);
                    Ok(())
                }
                Err(e) => {
                    if paths.report_file().exists() && !e.is_precondition() {
                        eprintln!(
                            "{} Run report: {}",
                            "Note:".yellow(),
                            paths.report_file().display()
                        );
                    }
                    Err(e)
                }
            }
        }
    }
}

async fn iterate_stage(
    stage: Stage,
    args: IterateArgs,
    settings: &Settings,
    paths: &WorkspacePaths,
) -> Result<()> {
    let (feedback, version) = args.into_parts();
    let service = build_chat_service(&settings.llm, paths)?;
    let workflow = DocumentWorkflow::new(stage, settings, paths)?;
    let generated = with_spinner(
        &format!("Revising {stage}"),
        workflow.iterate(service.as_ref(), &feedback, version),
    )
    .await?;
    print_generated(&generated);
    Ok(())
}

/// Show a spinner on stderr while the generation service works.
async fn with_spinner<T>(message: &str, task: impl Future<Output = Result<T>>) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = task.await;
    spinner.finish_and_clear();
    result
}

fn command_group(stage: Stage) -> &'static str {
    match stage {
        Stage::Specification => "spec",
        Stage::Plan => "plan",
        Stage::Scaffold => "scaffold",
    }
}

fn print_generated(generated: &GeneratedVersion) {
    println!(
        "{} Wrote {} v{}: {}",
        "OK".green().bold(),
        generated.stage,
        generated.version,
        generated.path.display()
    );
    if let Some(module) = &generated.summary.module_name {
        println!("  module: {}", module.cyan());
    }
    if !generated.summary.top_level_keys.is_empty() {
        println!("  sections: {}", generated.summary.top_level_keys.join(", "));
    }
    if let Some(warning) = &generated.persist_warning {
        println!("{} History not saved: {}", "Warning:".yellow().bold(), warning);
    }

    let group = command_group(generated.stage);
    println!("\nNext steps:");
    println!("  benchwright {group} iterate --message \"...\"");
    println!(
        "  benchwright {group} approve --version {}",
        generated.version
    );
}

fn print_approval(outcome: &ApprovalOutcome) {
    println!(
        "{} Approved {} v{} for module {}",
        "OK".green().bold(),
        outcome.stage,
        outcome.version,
        outcome.module_name.cyan()
    );
    println!("  artifact: {}", outcome.archived_artifact.display());
    println!("  history:  {}", outcome.archived_history.display());
    if !outcome.removed.is_empty() {
        println!("  removed {} unapproved version file(s)", outcome.removed.len());
    }
    if let Some(next) = outcome.stage.next() {
        let hint = match next {
            Stage::Plan => "benchwright plan init",
            _ => "benchwright scaffold build",
        };
        println!("\nNext step ({next}): {hint}");
    }
}

fn print_report(report: &RunReport) {
    for task in &report.tasks {
        let marker = if task.is_clean() {
            "✓".green().to_string()
        } else if task.failed.is_empty() {
            "!".yellow().to_string()
        } else {
            "✗".red().to_string()
        };
        println!(
            "  {} {:<10} {} applied, {} failed, {} segment warnings",
            marker,
            task.task,
            task.applied.len(),
            task.failed.len(),
            task.segment_errors.len()
        );
        for failed in &task.failed {
            println!("      {}:{} {}", failed.file, failed.block_id, failed.error.red());
        }
        if let Some(warning) = &task.persist_warning {
            println!("      {} {}", "history not saved:".yellow(), warning);
        }
    }
}

fn print_scaffold(outcome: &ScaffoldOutcome) {
    if outcome.copied_files > 0 {
        println!("Copied {} skeleton files", outcome.copied_files);
    }
    print_report(&outcome.report);
    println!(
        "{} {} patches applied across {} task(s)",
        "OK".green().bold(),
        outcome.report.applied_count(),
        outcome.report.tasks.len()
    );
    println!("  report: {}", outcome.report_path.display());
    println!("\nRun the simulation; on failure: benchwright scaffold fix --feedback <log>");
}

fn print_status(status: &WorkspaceStatus, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    println!("{}", "Benchwright Status".bold());
    println!("{}", "─".repeat(40));
    println!("Run directory: {}", status.run_dir.display());

    let Some(state) = &status.state else {
        println!("\n{} No stage state yet; start with `benchwright spec init`", "Note:".yellow());
        return Ok(());
    };

    println!("Current stage: {}", state.current_stage.to_string().cyan());
    if let Some(module) = &state.module_name {
        println!("Module:        {module}");
    }
    for stage in [Stage::Specification, Stage::Plan] {
        let flag = if state.is_approved(stage) {
            "approved".green().to_string()
        } else {
            "pending".yellow().to_string()
        };
        match state.final_file(stage) {
            Some(path) => println!("  {:<14} {} ({})", stage.to_string(), flag, path.display()),
            None => println!("  {:<14} {}", stage.to_string(), flag),
        }
    }

    if !status.open_sessions.is_empty() {
        println!("\nOpen conversations:");
        for stage in &status.open_sessions {
            println!("  {stage}");
        }
    }
    if !status.pending.is_empty() {
        println!("\nUnapproved versions:");
        for pending in &status.pending {
            let note = if pending.invalid {
                " (invalid output)".red().to_string()
            } else {
                String::new()
            };
            println!(
                "  {} v{}: {}{}",
                pending.stage,
                pending.version,
                pending.path.display(),
                note
            );
        }
    }
    if let Some(report) = &status.report {
        println!("\nLast scaffold report: {}", report.display());
    }
    Ok(())
}
