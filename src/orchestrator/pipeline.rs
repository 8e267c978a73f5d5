//! The fixed scaffold task list.

use super::Task;
use crate::prompts::{
    TASK_BFM, TASK_COVERAGE, TASK_DRIVER, TASK_ENV, TASK_MAKEFILE, TASK_MONITOR,
    TASK_SCOREBOARD, TASK_SEQUENCES, TASK_SEQ_ITEM, TASK_TESTS,
};

/// The ten scaffold tasks, in execution order.
///
/// The BFM task reports `bfm_methods`, consumed by the driver and monitor
/// tasks; the environment task reports `sequencers`, consumed by the test
/// library task.
#[must_use]
pub fn scaffold_pipeline() -> Vec<Task> {
    vec![
        Task::new("makefile", "Makefile", TASK_MAKEFILE),
        Task::new("bfm", "base_bfm.py", TASK_BFM),
        Task::new("seq_item", "seq_item.py", TASK_SEQ_ITEM),
        Task::new("driver", "driver.py", TASK_DRIVER)
            .with_dependencies(["base_bfm.py", "seq_item.py"]),
        Task::new("monitor", "monitor.py", TASK_MONITOR)
            .with_dependencies(["base_bfm.py", "seq_item.py"]),
        Task::new("scoreboard", "scoreboard.py", TASK_SCOREBOARD).with_dependency("seq_item.py"),
        Task::new("env", "env.py", TASK_ENV).with_dependencies([
            "agent.py",
            "monitor.py",
            "scoreboard.py",
            "coverage.py",
        ]),
        Task::new("coverage", "coverage.py", TASK_COVERAGE).with_dependency("seq_item.py"),
        Task::new("sequences", "sequence_lib.py", TASK_SEQUENCES).with_dependency("seq_item.py"),
        Task::new("tests", "test_lib.py", TASK_TESTS).with_dependencies([
            "base_test.py",
            "env.py",
            "sequence_lib.py",
        ]),
    ]
}
