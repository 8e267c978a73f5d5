//! Library-level tests of the scaffold pipeline over the shipped skeletons.

mod common;

use std::fs;
use std::path::Path;

use benchwright::orchestrator::RunStatus;
use benchwright::patch::{BlockPatchEngine, BlockPatcher, MarkerSyntax};
use benchwright::protocol::{ProtocolSyntax, ReplyParser, SegmentErrorKind};
use benchwright::{
    scaffold_pipeline, BenchError, BuildContext, ConversationSession, ScriptedChatService,
    TaskOrchestrator,
};
use tempfile::TempDir;

use common::{install_skeletons, scaffold_replies};

fn patcher(root: &Path) -> BlockPatcher {
    BlockPatcher::new(
        root,
        BlockPatchEngine::new(MarkerSyntax::default(), &ProtocolSyntax::default()),
    )
}

fn parser() -> ReplyParser {
    ReplyParser::new(ProtocolSyntax::default())
}

fn session(dir: &Path) -> ConversationSession {
    ConversationSession::load_or_init(dir.join("scaffold.history.json"), "system").unwrap()
}

#[test]
fn test_every_pipeline_block_exists_in_skeletons() {
    let temp = TempDir::new().unwrap();
    install_skeletons(temp.path());
    let patcher = patcher(temp.path());

    for task in scaffold_pipeline() {
        let template = &task.prompt_template;
        let marker = format!("{{{{protocol}}}}fill:{}:", task.target_file);
        for line in template.lines().filter(|l| l.contains(&marker)) {
            let block = line.rsplit(':').next().unwrap().trim();
            if block.starts_with('<') {
                continue;
            }
            patcher
                .read_block(&task.target_file, block)
                .unwrap_or_else(|e| panic!("{}: {}", task.name, e));
        }
        assert!(temp.path().join(&task.target_file).is_file());
    }
}

#[tokio::test]
async fn test_pipeline_fills_skeletons() {
    let temp = TempDir::new().unwrap();
    let bench = temp.path().join("tb");
    install_skeletons(&bench);

    let service = ScriptedChatService::from_replies(scaffold_replies());
    let mut context = BuildContext::new();
    context
        .insert("module_name", "fifo".into())
        .unwrap();
    let mut orchestrator = TaskOrchestrator::new(&service, patcher(&bench), parser())
        .with_reference("SPEC", "module_name: fifo")
        .with_context(context);

    let mut session = session(temp.path());
    orchestrator
        .run(&mut session, &scaffold_pipeline())
        .await
        .unwrap();

    let report = orchestrator.report();
    assert_eq!(report.outcome, RunStatus::Completed);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.applied_count(), 11);
    assert!(orchestrator.context().contains("bfm_methods"));
    assert!(orchestrator.context().contains("sequencers"));

    let tests = fs::read_to_string(bench.join("test_lib.py")).unwrap();
    assert!(tests.contains("class RandomTest(MyBaseTest):\n    async def main_phase(self):\n"));
    assert_eq!(session.turn_count(), 10);

    // Each prompt carried the current target file and the reference document
    let received = service.received();
    assert!(received[2]
        .last()
        .unwrap()
        .content
        .contains("--- CURRENT FILE: seq_item.py ---"));
    assert!(received[3]
        .last()
        .unwrap()
        .content
        .contains("--- DEPENDENCY FILE: base_bfm.py ---"));
    assert!(received[9].last().unwrap().content.contains("--- REFERENCE: SPEC ---"));
}

#[tokio::test]
async fn test_segment_errors_are_reported_not_fatal() {
    let temp = TempDir::new().unwrap();
    install_skeletons(temp.path());

    let mut replies = scaffold_replies();
    replies[0] = "Sure, here you go.\n\
                  benchwright:fill:Makefile:COCOTB_TOPLEVEL\n\
                  COCOTB_TOPLEVEL = fifo\n\
                  benchwright:explain:why\n\
                  because";
    let service = ScriptedChatService::from_replies(replies.into_iter().take(1));
    let mut orchestrator = TaskOrchestrator::new(&service, patcher(temp.path()), parser());

    let tasks = scaffold_pipeline();
    let mut session = session(temp.path());
    orchestrator.run_task(&mut session, &tasks[0]).await.unwrap();

    let task = &orchestrator.report().tasks[0];
    assert_eq!(task.applied, vec!["Makefile:COCOTB_TOPLEVEL".to_string()]);
    let kinds: Vec<&SegmentErrorKind> = task.segment_errors.iter().map(|e| &e.kind).collect();
    assert!(kinds.contains(&&SegmentErrorKind::StrayText));
    assert!(kinds.contains(&&SegmentErrorKind::UnknownCommand("explain".into())));
}

#[tokio::test]
async fn test_lenient_mode_continues_after_failed_patch() {
    let temp = TempDir::new().unwrap();
    install_skeletons(temp.path());

    let service = ScriptedChatService::from_replies([
        "benchwright:fill:Makefile:MISSING\nx = 1",
        "benchwright:fill:base_bfm.py:BFM_HANDLES\nself.clk = self.dut.clk",
    ]);
    let mut orchestrator = TaskOrchestrator::new(&service, patcher(temp.path()), parser())
        .with_strict_patches(false);

    let tasks: Vec<_> = scaffold_pipeline().into_iter().take(2).collect();
    let mut session = session(temp.path());
    orchestrator.run(&mut session, &tasks).await.unwrap();

    let report = orchestrator.report();
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.applied_count(), 1);
    assert_eq!(report.outcome, RunStatus::Completed);
}

#[tokio::test]
async fn test_service_failure_stops_pipeline_and_keeps_history() {
    let temp = TempDir::new().unwrap();
    install_skeletons(temp.path());

    let service = ScriptedChatService::from_replies(scaffold_replies().into_iter().take(2));
    let mut orchestrator = TaskOrchestrator::new(&service, patcher(temp.path()), parser());

    let mut session = session(temp.path());
    let err = orchestrator
        .run(&mut session, &scaffold_pipeline())
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::Service { .. }));
    assert!(matches!(orchestrator.report().outcome, RunStatus::Aborted(_)));
    assert_eq!(orchestrator.report().tasks.len(), 2);

    // Two completed turns survive on disk for a later fix round
    let resumed = ConversationSession::resume(temp.path().join("scaffold.history.json")).unwrap();
    assert_eq!(resumed.turn_count(), 2);
}
