//! Fixed prompt wording for the three stages.
//!
//! Task prompts are templates: `{{protocol}}` expands to the segment prefix
//! and other `{{key}}` placeholders to build context values.

use crate::stage::Stage;

const SPEC_SYSTEM: &str = "\
You are a senior digital design engineer. You read RTL source and a short \
functional description and produce a precise design specification as YAML.

Rules:
- Answer with one YAML document and nothing else.
- Include `module_name`, `design_type`, `ports` (each with `name`, `direction`, \
`width`, `description`) and `key_signals` (clock and reset).
- Describe behaviour; do not invent ports that are not in the RTL.";

const PLAN_SYSTEM: &str = "\
You are a verification lead. From an approved design specification you write \
a verification plan as YAML.

Rules:
- Answer with one YAML document and nothing else.
- Include `uvm_topology` (agents, scoreboards, connections), `sequence_library` \
(one entry per stimulus scenario) and `coverage_points`.
- Every feature of the specification must be covered by at least one sequence.";

const SCAFFOLD_SYSTEM: &str = "\
You are a verification engineer filling a pyuvm/cocotb test-bench skeleton. \
The skeleton files contain marked regions that you must fill. You never \
rewrite whole files; you only answer with replacement text for named regions.

Answer format:
- `{{protocol}}fill:<file>:<BLOCK_ID>` on its own line, followed by the complete \
new content of that region, without the marker lines.
- `{{protocol}}context:<key>:<value>` on its own line to report a value a later \
task needs. Lists are written `[a, b, c]`.
- Several segments may follow each other in one answer. Do not add prose, and \
do not repeat a region's marker lines inside its content.

You will receive the specification, the plan and the current content of each \
file you edit, one task at a time.";

/// System prompt of a stage's conversation.
#[must_use]
pub fn system_prompt(stage: Stage, prefix: &str) -> String {
    match stage {
        Stage::Specification => SPEC_SYSTEM.to_string(),
        Stage::Plan => PLAN_SYSTEM.to_string(),
        Stage::Scaffold => SCAFFOLD_SYSTEM.replace("{{protocol}}", prefix),
    }
}

/// First prompt of the specification stage.
#[must_use]
pub fn spec_init_prompt(rtl: &str, description: &str, template: Option<&str>) -> String {
    let mut prompt = format!(
        "Write the design specification for this module.\n\n\
         --- RTL ---\n{rtl}\n--- END RTL ---\n\n\
         --- DESCRIPTION ---\n{description}\n--- END DESCRIPTION ---\n"
    );
    if let Some(template) = template {
        prompt.push_str(&format!(
            "\nFollow the structure of this template:\n--- TEMPLATE ---\n{template}\n--- END TEMPLATE ---\n"
        ));
    }
    prompt
}

/// First prompt of the plan stage.
#[must_use]
pub fn plan_init_prompt(spec_yaml: &str, template: Option<&str>) -> String {
    let mut prompt = format!(
        "Write the verification plan for the design below.\n\n\
         --- DESIGN SPECIFICATION ---\n{spec_yaml}\n--- END DESIGN SPECIFICATION ---\n"
    );
    if let Some(template) = template {
        prompt.push_str(&format!(
            "\nFollow the structure of this template:\n--- TEMPLATE ---\n{template}\n--- END TEMPLATE ---\n"
        ));
    }
    prompt
}

/// Continuation prompt for a document stage.
#[must_use]
pub fn iterate_prompt(feedback: &str) -> String {
    format!(
        "Revise your previous YAML document according to this feedback. \
         Answer with the complete revised document.\n\n\
         --- FEEDBACK ---\n{feedback}\n--- END FEEDBACK ---\n"
    )
}

/// Continuation prompt carrying a failing test-bench log.
#[must_use]
pub fn scaffold_fix_prompt(log: &str, prefix: &str) -> String {
    format!(
        "The test-bench failed to run. This is the complete log:\n\
         --- LOG START ---\n{log}\n--- LOG END ---\n\n\
         Compare the log with the code you generated earlier in this conversation. \
         Find the regions that cause the failure and answer with corrected, complete \
         content for each of them:\n\
         {prefix}fill:<file>:<BLOCK_ID>\n"
    )
}

/// Closing reminder appended to every scaffold task prompt.
#[must_use]
pub fn format_reminder(prefix: &str) -> String {
    format!(
        "Answer only with `{prefix}fill:<file>:<BLOCK_ID>` and \
         `{prefix}context:<key>:<value>` segments."
    )
}

// Scaffold pipeline task wording

pub(crate) const TASK_MAKEFILE: &str = "\
Task: fill the `COCOTB_TOPLEVEL` region of `Makefile` with the top-level \
module name ({{module_name}}).

Answer format:
{{protocol}}fill:Makefile:COCOTB_TOPLEVEL";

pub(crate) const TASK_BFM: &str = "\
Task: fill all four regions of `base_bfm.py`, inside `class BaseBfm`:
1. `BFM_HANDLES` from the specification's `key_signals` and ports ({{ports}})
2. `BFM_RESET_TASK` from `key_signals`
3. `BFM_DRIVER_TASKS`: one driving method per group of input ports
4. `BFM_MONITOR_TASKS_AND_GETTERS`: monitor and getter methods for inputs and outputs

Also report the names of every method you defined.

Answer format:
{{protocol}}context:bfm_methods:[reset, drive_input, ...]
{{protocol}}fill:base_bfm.py:<BLOCK_ID> (all four regions)";

pub(crate) const TASK_SEQ_ITEM: &str = "\
Task: fill all four regions of `seq_item.py`, inside `class MySeqItem`:
1. `SEQ_ITEM_FIELDS`: one field per data or control port
2. `SEQ_ITEM_RANDOMIZE`
3. `SEQ_ITEM_STR`
4. `SEQ_ITEM_EQ`: compare every output field

Answer format: {{protocol}}fill:seq_item.py:<BLOCK_ID> (all four regions)";

pub(crate) const TASK_DRIVER: &str = "\
Task: fill the `DRIVER_BFM_CALL` region of `driver.py`. The code runs inside \
the `while True` loop of `run_phase`.

BFM methods available from the BFM task: {{bfm_methods}}
Call the driving methods from that list only.

Answer format: {{protocol}}fill:driver.py:DRIVER_BFM_CALL";

pub(crate) const TASK_MONITOR: &str = "\
Task: fill the `MONITOR_BFM_CALL` region of `monitor.py`, inside the \
`while True` loop:
1. await the BFM monitor or getter methods ({{bfm_methods}})
2. copy the returned values into `mon_item = MySeqItem()`
3. finish with `self.ap.write(mon_item)`

Answer format: {{protocol}}fill:monitor.py:MONITOR_BFM_CALL";

pub(crate) const TASK_SCOREBOARD: &str = "\
Task: fill all three regions of `scoreboard.py`:
1. `REFERENCE_MODEL_INIT` in `build_phase`
2. `REFERENCE_MODEL_LOGIC`: reference model methods on `class Scoreboard`
3. `SB_RUN_RM` in `_expected_listener`, after `await fifo.get()`

Answer format: {{protocol}}fill:scoreboard.py:<BLOCK_ID> (all three regions)";

pub(crate) const TASK_ENV: &str = "\
Task: fill both regions of `env.py`:
1. `ENV_INSTANTIATION` from the plan's topology
2. `ENV_CONNECTIONS` from the plan's connections

Topology:
{{topology}}

Use `MyAgent`, `Scoreboard` and `Coverage`. Connect the monitor's `ap` port to \
`expected_fifo.analysis_export`, `actual_fifo.analysis_export` and the \
coverage `analysis_export`. Report the path of every sequencer you instantiate.

Answer format:
{{protocol}}context:sequencers:[self.env.input_agent.sequencer]
{{protocol}}fill:env.py:<BLOCK_ID> (both regions)";

pub(crate) const TASK_COVERAGE: &str = "\
Task: fill both regions of `coverage.py`:
1. `COVERAGE_DEFINITIONS`: `@CoverPoint` definitions for the plan's \
`coverage_points` and a `sample_coverage` function
2. `COVERAGE_SAMPLE_CALL`: call `sample_coverage(item)` in `write`

Answer format: {{protocol}}fill:coverage.py:<BLOCK_ID> (both regions)";

pub(crate) const TASK_SEQUENCES: &str = "\
Task: fill the `SEQUENCES` region of `sequence_lib.py` with one sequence per \
entry of the plan's `sequence_library`, using `MySeqItem`.

Sequences only do sequence work (`await self.start_item(...)`); they never \
touch `self.dut`, `self.bfm` or an agent. Import `cocotb` only when the plan \
asks for parallel stimulus, and only inside the region.

Answer format: {{protocol}}fill:sequence_lib.py:SEQUENCES";

pub(crate) const TASK_TESTS: &str = "\
Task: fill the `TESTS` region of `test_lib.py`. The file already imports \
`MyBaseTest` and `sequence_lib as seq_lib`.

Sequencer paths from the environment task: {{sequencers}}

For every `sequence_library` entry define a `@pyuvm.test()` class deriving \
from `MyBaseTest` that overrides `async def main_phase(self)`, creates the \
sequence through `seq_lib.` and starts it on one of the sequencers above.

Answer format: {{protocol}}fill:test_lib.py:TESTS";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_system_prompt_uses_prefix() {
        let prompt = system_prompt(Stage::Scaffold, "bw:");
        assert!(prompt.contains("bw:fill:<file>:<BLOCK_ID>"));
        assert!(!prompt.contains("{{protocol}}"));
    }

    #[test]
    fn test_document_prompts() {
        let prompt = spec_init_prompt("module m; endmodule", "a counter", Some("module_name: ~"));
        assert!(prompt.contains("module m; endmodule"));
        assert!(prompt.contains("--- TEMPLATE ---"));
        assert!(!plan_init_prompt("module_name: m", None).contains("TEMPLATE"));
        assert!(iterate_prompt("add a reset port").contains("add a reset port"));
    }

    #[test]
    fn test_fix_prompt_carries_log() {
        let prompt = scaffold_fix_prompt("AttributeError: no input_agent", "bw:");
        assert!(prompt.contains("AttributeError"));
        assert!(prompt.contains("bw:fill:"));
    }
}
