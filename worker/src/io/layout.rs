//! Scaffolding for the `.worker/` state directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::config::{WorkerConfig, config_path, write_atomic, write_config};

/// Everything under `.worker/` is local state and stays out of commits.
const GITIGNORE: &str = "*\n";

/// Canonical paths within `.worker/` for a workspace.
#[derive(Debug, Clone)]
pub struct WorkerPaths {
    pub root: PathBuf,
    pub worker_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub task_tree_path: PathBuf,
}

impl WorkerPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let worker_dir = root.join(".worker");
        Self {
            gitignore_path: worker_dir.join(".gitignore"),
            config_path: config_path(&root),
            task_tree_path: worker_dir.join("task_tree.json"),
            worker_dir,
            root,
        }
    }
}

/// Create `.worker/` with its `.gitignore` if either is missing.
pub fn ensure_layout(paths: &WorkerPaths) -> Result<()> {
    fs::create_dir_all(&paths.worker_dir)
        .with_context(|| format!("create {}", paths.worker_dir.display()))?;
    if !paths.gitignore_path.exists() {
        write_atomic(&paths.gitignore_path, GITIGNORE)?;
    }
    Ok(())
}

/// `exec-worker init`: scaffold `.worker/`, writing a default config unless
/// one exists (or `force` is set). Returns true when the config was written.
pub fn init_layout(root: &Path, force: bool) -> Result<bool> {
    let paths = WorkerPaths::new(root);
    ensure_layout(&paths)?;
    if force {
        write_atomic(&paths.gitignore_path, GITIGNORE)?;
    }
    if !force && paths.config_path.exists() {
        debug!(path = %paths.config_path.display(), "config exists, leaving it");
        return Ok(false);
    }
    write_config(&paths.config_path, &WorkerConfig::default())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_writes_config_and_gitignore() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(init_layout(temp.path(), false).expect("init"));
        let paths = WorkerPaths::new(temp.path());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            GITIGNORE
        );
        assert_eq!(
            load_config(&paths.config_path).expect("load"),
            WorkerConfig::default()
        );
    }

    #[test]
    fn init_keeps_existing_config_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = WorkerPaths::new(temp.path());
        fs::create_dir_all(&paths.worker_dir).expect("mkdir");
        fs::write(&paths.config_path, "commit_min_steps = 1\n").expect("write");

        assert!(!init_layout(temp.path(), false).expect("init"));
        assert_eq!(load_config(&paths.config_path).expect("load").commit_min_steps, 1);

        assert!(init_layout(temp.path(), true).expect("init"));
        assert_eq!(load_config(&paths.config_path).expect("load").commit_min_steps, 3);
    }
}
