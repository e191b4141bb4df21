//! Worker configuration stored under `.worker/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::complexity::CycleBudget;

/// Typed configuration failures callers branch on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("oracle credential `{0}` is not set")]
    MissingCredential(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Worker configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Attempts per shell step, including the first.
    pub max_shell_attempts: usize,

    /// Wall-clock limit for a single shell command.
    pub shell_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Executed steps a cycle needs before its progress is committed.
    pub commit_min_steps: usize,

    /// Journal directory, relative to the workspace root unless absolute.
    pub runs_dir: PathBuf,

    pub cycle_budget: CycleBudgetConfig,
    pub validation: ValidationConfig,
    pub workspace: WorkspaceConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CycleBudgetConfig {
    /// Cycles for low/medium complexity.
    pub standard: u32,
    /// Cycles for high/epic complexity.
    pub extended: u32,
}

impl Default for CycleBudgetConfig {
    fn default() -> Self {
        let budget = CycleBudget::default();
        Self {
            standard: budget.standard,
            extended: budget.extended,
        }
    }
}

impl From<&CycleBudgetConfig> for CycleBudget {
    fn from(cfg: &CycleBudgetConfig) -> Self {
        CycleBudget {
            standard: cfg.standard,
            extended: cfg.extended,
        }
    }
}

/// Overrides for the detected build/test commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub summary_max_files: usize,
    pub candidate_limit: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            summary_max_files: 15,
            candidate_limit: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_shell_attempts: 5,
            shell_timeout_secs: 600,
            output_limit_bytes: 100_000,
            commit_min_steps: 3,
            runs_dir: PathBuf::from(".worker/runs"),
            cycle_budget: CycleBudgetConfig::default(),
            validation: ValidationConfig::default(),
            workspace: WorkspaceConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.max_shell_attempts == 0 {
            return invalid("max_shell_attempts must be > 0");
        }
        if self.shell_timeout_secs == 0 {
            return invalid("shell_timeout_secs must be > 0");
        }
        if self.output_limit_bytes == 0 {
            return invalid("output_limit_bytes must be > 0");
        }
        if self.cycle_budget.standard == 0 || self.cycle_budget.extended == 0 {
            return invalid("cycle_budget values must be > 0");
        }
        if self.oracle.timeout_secs == 0 {
            return invalid("oracle.timeout_secs must be > 0");
        }
        if self.oracle.api_key_env.trim().is_empty() {
            return invalid("oracle.api_key_env must be non-empty");
        }
        Ok(())
    }

    /// Journal directory resolved against the workspace root.
    pub fn runs_dir_in(&self, workspace: &Path) -> PathBuf {
        if self.runs_dir.is_absolute() {
            self.runs_dir.clone()
        } else {
            workspace.join(&self.runs_dir)
        }
    }
}

/// Path of the config file inside a workspace.
pub fn config_path(workspace: &Path) -> PathBuf {
    workspace.join(".worker").join("config.toml")
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WorkerConfig::default()`.
pub fn load_config(path: &Path) -> Result<WorkerConfig> {
    if !path.exists() {
        let cfg = WorkerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WorkerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WorkerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename over it.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, WorkerConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = config_path(temp.path());
        let mut cfg = WorkerConfig::default();
        cfg.validation.test_command = Some("true".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "commit_min_steps = 1\n[cycle_budget]\nstandard = 2\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.commit_min_steps, 1);
        assert_eq!(cfg.cycle_budget.standard, 2);
        assert_eq!(cfg.cycle_budget.extended, 100);
        assert_eq!(cfg.max_shell_attempts, 5);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let mut cfg = WorkerConfig::default();
        cfg.cycle_budget.extended = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn relative_runs_dir_resolves_under_workspace() {
        let cfg = WorkerConfig::default();
        assert_eq!(
            cfg.runs_dir_in(Path::new("/ws")),
            PathBuf::from("/ws/.worker/runs")
        );
    }
}
