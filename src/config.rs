//! Settings loading and workspace path resolution.
//!
//! Settings are resolved from three layers with increasing priority:
//!
//! 1. **Defaults** - compiled into [`Settings::default`]
//! 2. **User** - `~/.config/benchwright/settings.json` (platform config dir)
//! 3. **Project** - `<project>/.benchwright/settings.json`
//!
//! JSON objects are deep-merged before deserialization, so a project file
//! only needs to name the keys it overrides. Command-line flags are applied
//! by the binary on top of the resolved value.
//!
//! ```json
//! {
//!   "benchDir": "tb",
//!   "skeletonDir": "skeletons",
//!   "llm": { "model": "gpt-4o" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BenchError, Result};
use crate::patch::MarkerSyntax;
use crate::protocol::ProtocolSyntax;
use crate::stage::Stage;

/// Directory holding project-level settings.
pub const SETTINGS_DIR: &str = ".benchwright";

/// Settings file name, at both user and project level.
pub const SETTINGS_FILE: &str = "settings.json";

/// Generation service backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible chat completions endpoint.
    #[default]
    Openai,
    /// Canned replies read from a JSON file, for offline replays.
    Scripted,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Openai => write!(f, "openai"),
            Provider::Scripted => write!(f, "scripted"),
        }
    }
}

/// Generation service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct LlmSettings {
    pub provider: Provider,
    pub model: String,
    pub api_key_env: String,
    pub api_base: String,
    pub timeout_secs: u64,
    /// JSON array of replies consumed by the scripted provider.
    pub script: Option<PathBuf>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Openai,
            model: "gpt-4-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            timeout_secs: 120,
            script: None,
        }
    }
}

/// Optional YAML templates offered to the document stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateSettings {
    pub spec: Option<PathBuf>,
    pub plan: Option<PathBuf>,
}

impl TemplateSettings {
    /// Template configured for a document stage, if any.
    pub fn for_stage(&self, stage: Stage) -> Option<&Path> {
        match stage {
            Stage::Specification => self.spec.as_deref(),
            Stage::Plan => self.plan.as_deref(),
            Stage::Scaffold => None,
        }
    }
}

/// Resolved benchwright settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Settings {
    /// Working directory for stage state, histories and version artifacts.
    pub run_dir: PathBuf,
    /// Directory holding the files the scaffold pipeline patches.
    pub bench_dir: PathBuf,
    /// Skeleton tree copied into `bench_dir` by `scaffold build`.
    pub skeleton_dir: Option<PathBuf>,
    pub markers: MarkerSyntax,
    pub protocol: ProtocolSyntax,
    pub templates: TemplateSettings,
    /// Abort a scaffold run when any patch of a reply fails.
    pub strict_patches: bool,
    pub llm: LlmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("bench_run"),
            bench_dir: PathBuf::from("bench_tb"),
            skeleton_dir: None,
            markers: MarkerSyntax::default(),
            protocol: ProtocolSyntax::default(),
            templates: TemplateSettings::default(),
            strict_patches: true,
            llm: LlmSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings for a project, including the user-level file.
    pub fn load(project_dir: &Path) -> Result<Self> {
        Self::load_layers(project_dir, Self::user_settings_path().as_deref())
    }

    /// Load settings from an explicit user-level file (if any) and the project file.
    pub fn load_layers(project_dir: &Path, user_file: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;

        if let Some(user_file) = user_file {
            if let Some(layer) = read_layer(user_file)? {
                debug!("Applying user settings: {}", user_file.display());
                deep_merge(&mut merged, layer);
            }
        }

        let project_file = Self::settings_path(project_dir);
        if let Some(layer) = read_layer(&project_file)? {
            debug!("Applying project settings: {}", project_file.display());
            deep_merge(&mut merged, layer);
        }

        let settings: Settings = serde_json::from_value(merged)
            .map_err(|e| BenchError::config_with_path(e.to_string(), project_file))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Get the project settings path
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(SETTINGS_DIR).join(SETTINGS_FILE)
    }

    /// Get the user settings path, when the platform has a config dir
    pub fn user_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("benchwright").join(SETTINGS_FILE))
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let start = self.markers.start.trim();
        let end = self.markers.end.trim();
        if start.is_empty() || end.is_empty() {
            return Err(BenchError::invalid_config(
                "markers",
                "start and end tags must not be empty",
            ));
        }
        if start == end {
            return Err(BenchError::invalid_config(
                "markers",
                "start and end tags must differ",
            ));
        }
        if start.contains(':') || end.contains(':') {
            return Err(BenchError::invalid_config(
                "markers",
                "tags must not contain ':'",
            ));
        }

        let prefix = &self.protocol.prefix;
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(BenchError::invalid_config(
                "protocol.prefix",
                "must be a non-empty token without whitespace",
            ));
        }

        if self.llm.provider == Provider::Scripted && self.llm.script.is_none() {
            return Err(BenchError::invalid_config(
                "llm.script",
                "the scripted provider needs a script file",
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(BenchError::invalid_config(
                "llm.timeoutSecs",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Resolve every workspace location against the project root.
    pub fn paths(&self, project_dir: &Path) -> WorkspacePaths {
        WorkspacePaths {
            project_dir: project_dir.to_path_buf(),
            run_dir: project_dir.join(&self.run_dir),
            bench_dir: project_dir.join(&self.bench_dir),
            skeleton_dir: self.skeleton_dir.as_ref().map(|p| project_dir.join(p)),
        }
    }
}

/// Read one settings layer. Missing files are skipped.
fn read_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| BenchError::config_with_path(e.to_string(), path.to_path_buf()))?;
    if !value.is_object() {
        return Err(BenchError::config_with_path(
            "settings file must contain a JSON object",
            path.to_path_buf(),
        ));
    }
    Ok(Some(value))
}

/// Merge `overlay` into `base`; objects merge key by key, everything else replaces.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Every on-disk location used by the stage workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub project_dir: PathBuf,
    pub run_dir: PathBuf,
    pub bench_dir: PathBuf,
    pub skeleton_dir: Option<PathBuf>,
}

impl WorkspacePaths {
    /// Stage state record.
    pub fn state_file(&self) -> PathBuf {
        self.run_dir.join(".bench.state.json")
    }

    /// Workspace lock held by mutating commands.
    pub fn lock_file(&self) -> PathBuf {
        self.run_dir.join(".bench.lock")
    }

    /// Conversation history of a stage in progress.
    pub fn history_file(&self, stage: Stage) -> PathBuf {
        self.run_dir.join(format!("{}.history.json", stage.stem()))
    }

    /// Generated version `version` of a document stage's artifact.
    pub fn version_file(&self, stage: Stage, version: u32) -> PathBuf {
        self.run_dir
            .join(format!("{}.v{}.yml", stage.stem(), version))
    }

    /// Raw output kept when version `version` failed validation.
    pub fn error_file(&self, stage: Stage, version: u32) -> PathBuf {
        self.run_dir
            .join(format!("{}.v{}.error.txt", stage.stem(), version))
    }

    /// Stable archive name of an approved artifact.
    pub fn archived_artifact(&self, stage: Stage, module: &str) -> PathBuf {
        self.run_dir
            .join(format!("{}.{}.final.yml", module, stage.stem()))
    }

    /// Stable archive name of an approved stage's history.
    pub fn archived_history(&self, stage: Stage, module: &str) -> PathBuf {
        self.run_dir
            .join(format!("{}.{}.history.json", module, stage.stem()))
    }

    /// Report written by scaffold runs.
    pub fn report_file(&self) -> PathBuf {
        self.run_dir.join("scaffold.report.json")
    }

    /// Resolve a configured path relative to the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.project_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_project_settings(dir: &Path, json: &str) {
        std::fs::create_dir_all(dir.join(SETTINGS_DIR)).unwrap();
        std::fs::write(Settings::settings_path(dir), json).unwrap();
    }

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.run_dir, PathBuf::from("bench_run"));
        assert_eq!(settings.markers.start, "LLM_GENERATED_START");
        assert_eq!(settings.protocol.prefix, "benchwright:");
        assert!(settings.strict_patches);
        assert_eq!(settings.llm.provider, Provider::Openai);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_load_missing_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_layers(temp.path(), None).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_project_overrides_nested_keys() {
        let temp = TempDir::new().unwrap();
        write_project_settings(
            temp.path(),
            r#"{"benchDir": "tb", "llm": {"model": "gpt-4o"}}"#,
        );

        let settings = Settings::load_layers(temp.path(), None).unwrap();
        assert_eq!(settings.bench_dir, PathBuf::from("tb"));
        assert_eq!(settings.llm.model, "gpt-4o");
        // Untouched siblings keep their defaults
        assert_eq!(settings.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_settings_project_beats_user() {
        let temp = TempDir::new().unwrap();
        let user_file = temp.path().join("user.json");
        std::fs::write(
            &user_file,
            r#"{"runDir": "user_run", "llm": {"model": "user-model", "timeoutSecs": 30}}"#,
        )
        .unwrap();
        write_project_settings(temp.path(), r#"{"llm": {"model": "project-model"}}"#);

        let settings = Settings::load_layers(temp.path(), Some(&user_file)).unwrap();
        assert_eq!(settings.run_dir, PathBuf::from("user_run"));
        assert_eq!(settings.llm.model, "project-model");
        assert_eq!(settings.llm.timeout_secs, 30);
    }

    #[test]
    fn test_settings_rejects_unknown_keys() {
        let temp = TempDir::new().unwrap();
        write_project_settings(temp.path(), r#"{"benchDirectory": "tb"}"#);
        let err = Settings::load_layers(temp.path(), None).unwrap_err();
        assert!(matches!(err, BenchError::Config { .. }));
    }

    #[test]
    fn test_settings_rejects_non_object() {
        let temp = TempDir::new().unwrap();
        write_project_settings(temp.path(), "[1, 2]");
        assert!(Settings::load_layers(temp.path(), None).is_err());
    }

    #[test]
    fn test_validate_marker_tags() {
        let mut settings = Settings::default();
        settings.markers.end = settings.markers.start.clone();
        assert!(matches!(
            settings.validate(),
            Err(BenchError::InvalidConfig { .. })
        ));

        let mut settings = Settings::default();
        settings.markers.start = "  ".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_protocol_prefix() {
        let mut settings = Settings::default();
        settings.protocol.prefix = "two words:".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_scripted_needs_script() {
        let mut settings = Settings::default();
        settings.llm.provider = Provider::Scripted;
        assert!(settings.validate().is_err());
        settings.llm.script = Some(PathBuf::from("replies.json"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_workspace_paths() {
        let settings = Settings::default();
        let paths = settings.paths(Path::new("/proj"));

        assert_eq!(paths.run_dir, PathBuf::from("/proj/bench_run"));
        assert_eq!(
            paths.history_file(Stage::Plan),
            PathBuf::from("/proj/bench_run/verif_plan.history.json")
        );
        assert_eq!(
            paths.version_file(Stage::Specification, 3),
            PathBuf::from("/proj/bench_run/design_spec.v3.yml")
        );
        assert_eq!(
            paths.archived_artifact(Stage::Plan, "fifo"),
            PathBuf::from("/proj/bench_run/fifo.verif_plan.final.yml")
        );
        assert_eq!(
            paths.archived_history(Stage::Specification, "fifo"),
            PathBuf::from("/proj/bench_run/fifo.design_spec.history.json")
        );
        assert!(paths.skeleton_dir.is_none());
    }

    #[test]
    fn test_deep_merge_replaces_scalars_and_arrays() {
        let mut base = serde_json::json!({"a": {"b": 1, "c": [1, 2]}, "d": true});
        deep_merge(
            &mut base,
            serde_json::json!({"a": {"c": [3]}, "d": false, "e": "new"}),
        );
        assert_eq!(
            base,
            serde_json::json!({"a": {"b": 1, "c": [3]}, "d": false, "e": "new"})
        );
    }
}
