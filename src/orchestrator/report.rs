//! Per-run record of what each task did.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::SegmentError;
use crate::workspace::write_atomic;

/// A patch that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedPatch {
    pub file: String,
    pub block_id: String,
    pub error: String,
}

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task: String,
    pub target_file: String,
    /// `file:block` of every applied patch.
    pub applied: Vec<String>,
    pub failed: Vec<FailedPatch>,
    pub segment_errors: Vec<SegmentError>,
    pub context_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_warning: Option<String>,
}

impl TaskReport {
    #[must_use]
    pub fn new(task: &str, target_file: &str) -> Self {
        Self {
            task: task.to_string(),
            target_file: target_file.to_string(),
            applied: Vec::new(),
            failed: Vec::new(),
            segment_errors: Vec::new(),
            context_keys: Vec::new(),
            persist_warning: None,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.segment_errors.iter().all(SegmentError::is_warning_only)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum RunStatus {
    Running,
    Completed,
    Aborted(String),
}

/// Record of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub model: String,
    pub outcome: RunStatus,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    #[must_use]
    pub fn start(model: &str) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            model: model.to_string(),
            outcome: RunStatus::Running,
            tasks: Vec::new(),
        }
    }

    pub fn finish(&mut self, outcome: RunStatus) {
        self.finished_at = Some(Utc::now());
        self.outcome = outcome;
    }

    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.tasks.iter().map(|t| t.applied.len()).sum()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().map(|t| t.failed.len()).sum()
    }

    #[must_use]
    pub fn segment_error_count(&self) -> usize {
        self.tasks.iter().map(|t| t.segment_errors.len()).sum()
    }

    /// Write the report as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_counts_and_save() {
        let temp = TempDir::new().unwrap();
        let mut report = RunReport::start("scripted");

        let mut task = TaskReport::new("driver", "driver.py");
        task.applied.push("driver.py:DRIVER_BFM_CALL".into());
        task.failed.push(FailedPatch {
            file: "driver.py".into(),
            block_id: "MISSING".into(),
            error: "not found".into(),
        });
        report.tasks.push(task);
        report.finish(RunStatus::Aborted("1 patch failed".into()));

        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.tasks[0].is_clean());

        let path = temp.path().join("scaffold.report.json");
        report.save(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["outcome"]["status"], "aborted");
        assert_eq!(value["tasks"][0]["targetFile"], "driver.py");
        assert!(value["finishedAt"].is_string());
    }

    #[test]
    fn test_completed_status_shape() {
        let json = serde_json::to_value(RunStatus::Completed).unwrap();
        assert_eq!(json, serde_json::json!({"status": "completed"}));
    }
}
