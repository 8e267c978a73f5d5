//! YAML documents produced by the specification and plan stages.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_yaml::Value;

use crate::error::{BenchError, Result};

const FENCE: &str = "```";

/// A validated YAML document.
#[derive(Debug, Clone, PartialEq)]
pub struct YamlArtifact {
    text: String,
    value: Value,
}

/// Short description of a document, for console output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSummary {
    pub module_name: Option<String>,
    pub top_level_keys: Vec<String>,
}

impl YamlArtifact {
    /// Validate generated text as a YAML mapping.
    ///
    /// A surrounding code fence is removed first. Returns the reason on
    /// failure so the caller can decide where to keep the raw text.
    pub fn from_reply(reply: &str) -> std::result::Result<Self, String> {
        let text = strip_code_fence(reply);
        if text.trim().is_empty() {
            return Err("document is empty".to_string());
        }
        let value: Value = serde_yaml::from_str(&text).map_err(|e| e.to_string())?;
        if !value.is_mapping() {
            return Err("document is not a YAML mapping".to_string());
        }
        Ok(Self { text, value })
    }

    /// Load a document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(BenchError::missing_file(path));
        }
        let content = fs::read_to_string(path)?;
        Self::from_reply(&content).map_err(|reason| BenchError::InvalidArtifact {
            path: path.to_path_buf(),
            reason,
        })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The `module_name` field, when it is a non-empty string.
    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.value
            .get("module_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    #[must_use]
    pub fn summary(&self) -> ArtifactSummary {
        let top_level_keys = self
            .value
            .as_mapping()
            .map(|map| {
                map.keys()
                    .filter_map(|k| k.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        ArtifactSummary {
            module_name: self.module_name().map(String::from),
            top_level_keys,
        }
    }
}

/// Content of the first fenced block, or the whole text when unfenced.
#[must_use]
pub fn strip_code_fence(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized.split('\n').collect();
    let fences: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim_start().starts_with(FENCE))
        .map(|(i, _)| i)
        .take(2)
        .collect();

    let body = match fences.as_slice() {
        [open, close, ..] => lines[open + 1..*close].join("\n"),
        _ => lines
            .iter()
            .filter(|l| !l.trim_start().starts_with(FENCE))
            .copied()
            .collect::<Vec<_>>()
            .join("\n"),
    };
    let mut body = body.trim_matches('\n').to_string();
    body.push('\n');
    body
}

/// Whether a module name is safe to use in archive file names.
#[must_use]
pub fn is_valid_module_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
