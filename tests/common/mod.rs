//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const RTL: &str = "\
module fifo (
    input  wire       clk,
    input  wire       rst_n,
    input  wire [7:0] data_in,
    output reg  [7:0] data_out
);
endmodule
";

pub const SPEC_V1: &str = "\
Here is the specification:
```yaml
module_name: fifo
design_type: sequential
ports:
  - name: clk
    direction: input
  - name: rst_n
    direction: input
  - name: data_in
    direction: input
```";

pub const SPEC_V2: &str = "\
module_name: fifo
design_type: sequential
ports:
  - name: clk
    direction: input
  - name: rst_n
    direction: input
  - name: data_in
    direction: input
  - name: data_out
    direction: output
";

pub const PLAN_V1: &str = "\
```yaml
uvm_topology:
  agents:
    - name: input_agent
      active: true
sequence_library:
  - name: RandomSeq
coverage_points:
  - data_in
```";

/// One reply per scaffold task, in pipeline order.
pub fn scaffold_replies() -> Vec<&'static str> {
    vec![
        "benchwright:fill:Makefile:COCOTB_TOPLEVEL\nCOCOTB_TOPLEVEL = fifo",
        "benchwright:context:bfm_methods:[reset, drive_input, get_output]\n\
         benchwright:fill:base_bfm.py:BFM_HANDLES\n\
         self.clk = self.dut.clk\n\
         self.rst_n = self.dut.rst_n\n\
         benchwright:fill:base_bfm.py:BFM_RESET_TASK\n\
         async def reset(self):\n\
         \x20   self.rst_n.value = 0\n\
         \x20   await self.wait_clock(5)\n\
         \x20   self.rst_n.value = 1",
        "benchwright:fill:seq_item.py:SEQ_ITEM_FIELDS\nself.data_in = 0\nself.data_out = 0",
        "benchwright:fill:driver.py:DRIVER_BFM_CALL\n```python\nawait self.bfm.drive_input(seq_item)\n```",
        "benchwright:fill:monitor.py:MONITOR_BFM_CALL\n\
         mon_item = MySeqItem()\n\
         mon_item.data_out = self.bfm.get_output()\n\
         self.ap.write(mon_item)",
        "benchwright:fill:scoreboard.py:SB_RUN_RM\nself.expected.append(item)",
        "benchwright:context:sequencers:[self.env.input_agent.sequencer]\n\
         benchwright:fill:env.py:ENV_INSTANTIATION\n\
         self.input_agent = MyAgent.create(\"input_agent\", self)\n\
         self.scoreboard = Scoreboard.create(\"scoreboard\", self)",
        "benchwright:fill:coverage.py:COVERAGE_SAMPLE_CALL\nsample_coverage(item)",
        "benchwright:fill:sequence_lib.py:SEQUENCES\n\
         class RandomSeq(uvm_sequence):\n\
         \x20   async def body(self):\n\
         \x20       item = MySeqItem()\n\
         \x20       await self.start_item(item)\n\
         \x20       await self.finish_item(item)",
        "benchwright:fill:test_lib.py:TESTS\n\
         @pyuvm.test()\n\
         class RandomTest(MyBaseTest):\n\
         \x20   async def main_phase(self):\n\
         \x20       await seq_lib.RandomSeq(\"seq\").start(self.env.input_agent.sequencer)",
    ]
}

/// The skeleton tree shipped with the crate.
pub fn skeleton_source() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("skeletons")
}

/// Copy the shipped skeletons into `target`.
pub fn install_skeletons(target: &Path) {
    fs::create_dir_all(target).unwrap();
    for entry in fs::read_dir(skeleton_source()).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), target.join(entry.file_name())).unwrap();
    }
}

/// Write the project settings for the scripted provider.
pub fn write_settings(project: &Path) {
    fs::create_dir_all(project.join(".benchwright")).unwrap();
    fs::write(
        project.join(".benchwright/settings.json"),
        r#"{
  "skeletonDir": "skeletons",
  "llm": { "provider": "scripted", "script": "replies.json" }
}"#,
    )
    .unwrap();
}

/// Replace the reply script read by the next command.
pub fn write_script(project: &Path, replies: &[&str]) {
    fs::write(
        project.join("replies.json"),
        serde_json::to_string(replies).unwrap(),
    )
    .unwrap();
}
