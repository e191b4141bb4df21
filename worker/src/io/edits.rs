//! Transactional find/replace edits over workspace files.
//!
//! [`apply_batch`] never rolls back on its own: it returns the pre-batch
//! [`Snapshot`] in both outcomes and the caller decides whether to call
//! [`rollback`]. [`apply_transactional`] is the usual composition.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::core::plan::FileEdit;

static MOD_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pub mod (\w+);").expect("module regex should compile"));

/// Typed edit failures.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("path `{0}` is outside the workspace")]
    OutsideRoot(String),
    #[error("anchor text not found in {path}")]
    AnchorNotFound { path: String },
    #[error("{path} is not valid UTF-8")]
    NotUtf8 { path: String },
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl EditError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        EditError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Prior {
    /// File existed with these bytes.
    Existed(Vec<u8>),
    /// File did not exist; these directories were created for it (deepest first).
    Absent { created_dirs: Vec<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SnapshotEntry {
    path: PathBuf,
    prior: Prior,
}

/// Pre-batch state of every file a batch touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }
}

/// Result of applying a batch. Both arms carry the snapshot for rollback.
#[derive(Debug)]
pub enum BatchOutcome {
    Applied {
        snapshot: Snapshot,
        /// Workspace-relative paths, in first-touch order.
        touched: Vec<String>,
    },
    Failed {
        snapshot: Snapshot,
        /// Index of the edit that failed.
        index: usize,
        error: EditError,
    },
}

/// Apply `edits` in order under `root`, stopping at the first failure.
#[instrument(skip_all, fields(edits = edits.len()))]
pub fn apply_batch(root: &Path, edits: &[FileEdit]) -> BatchOutcome {
    let mut snapshot = Snapshot::default();
    let mut touched = Vec::new();
    for (index, edit) in edits.iter().enumerate() {
        if let Err(error) = apply_one(root, edit, &mut snapshot) {
            warn!(index, path = %edit.path, err = %error, "edit failed");
            return BatchOutcome::Failed {
                snapshot,
                index,
                error,
            };
        }
        if !touched.contains(&edit.path) {
            touched.push(edit.path.clone());
        }
    }
    debug!(files = touched.len(), "edit batch applied");
    BatchOutcome::Applied { snapshot, touched }
}

/// Restore every snapshotted file: rewrite prior bytes, delete created files
/// and the directories created for them.
#[instrument(skip_all, fields(entries = snapshot.entries.len()))]
pub fn rollback(snapshot: &Snapshot) -> Result<(), EditError> {
    for entry in snapshot.entries.iter().rev() {
        match &entry.prior {
            Prior::Existed(bytes) => {
                fs::write(&entry.path, bytes).map_err(|e| EditError::io(&entry.path, e))?;
            }
            Prior::Absent { created_dirs } => {
                if entry.path.exists() {
                    fs::remove_file(&entry.path).map_err(|e| EditError::io(&entry.path, e))?;
                }
                for dir in created_dirs {
                    // Only directories left empty by the removal are ours to delete.
                    if let Err(err) = fs::remove_dir(dir) {
                        debug!(dir = %dir.display(), err = %err, "keeping directory");
                    }
                }
            }
        }
    }
    Ok(())
}

/// Apply a batch; on failure roll it back and return the edit error.
pub fn apply_transactional(root: &Path, edits: &[FileEdit]) -> Result<Vec<String>, EditError> {
    match apply_batch(root, edits) {
        BatchOutcome::Applied { touched, .. } => Ok(touched),
        BatchOutcome::Failed {
            snapshot, error, ..
        } => {
            if let Err(rollback_err) = rollback(&snapshot) {
                error!(err = %rollback_err, "rollback failed");
            }
            Err(error)
        }
    }
}

/// Resolve a workspace-relative path, rejecting anything that could escape.
pub fn resolve_in_root(root: &Path, rel: &str) -> Result<PathBuf, EditError> {
    let candidate = Path::new(rel);
    let escapes = rel.trim().is_empty()
        || candidate.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if escapes {
        return Err(EditError::OutsideRoot(rel.to_string()));
    }
    Ok(root.join(candidate))
}

fn apply_one(root: &Path, edit: &FileEdit, snapshot: &mut Snapshot) -> Result<(), EditError> {
    let target = resolve_in_root(root, &edit.path)?;

    if !target.exists() {
        let created_dirs = create_parents(root, &target)?;
        if !snapshot.contains(&target) {
            snapshot.entries.push(SnapshotEntry {
                path: target.clone(),
                prior: Prior::Absent { created_dirs },
            });
        }
        return fs::write(&target, edit.replace.as_bytes()).map_err(|e| EditError::io(&target, e));
    }

    let bytes = fs::read(&target).map_err(|e| EditError::io(&target, e))?;
    if !snapshot.contains(&target) {
        snapshot.entries.push(SnapshotEntry {
            path: target.clone(),
            prior: Prior::Existed(bytes.clone()),
        });
    }
    let content = String::from_utf8(bytes).map_err(|_| EditError::NotUtf8 {
        path: edit.path.clone(),
    })?;

    let updated = if edit.find.is_empty() {
        format!("{content}{}", edit.replace)
    } else if content.contains(&edit.find) {
        content.replacen(&edit.find, &edit.replace, 1)
    } else if let Some(updated) = module_declaration_fallback(&edit.path, &content, &edit.replace) {
        updated
    } else {
        return Err(EditError::AnchorNotFound {
            path: edit.path.clone(),
        });
    };
    fs::write(&target, updated).map_err(|e| EditError::io(&target, e))
}

/// A missing anchor in a crate/module root whose replacement declares a
/// module appends the declaration if it is not already present.
fn module_declaration_fallback(path: &str, content: &str, replacement: &str) -> Option<String> {
    let file_name = Path::new(path).file_name()?.to_str()?;
    if file_name != "lib.rs" && file_name != "mod.rs" {
        return None;
    }
    let name = MOD_DECL.captures(replacement)?.get(1)?.as_str();
    let declaration = format!("pub mod {name};");
    if content.contains(&declaration) {
        return Some(content.to_string());
    }
    Some(format!("{}\n{declaration}\n", content.trim_end()))
}

fn create_parents(root: &Path, target: &Path) -> Result<Vec<PathBuf>, EditError> {
    let mut missing = Vec::new();
    let mut current = target.parent();
    while let Some(dir) = current {
        if dir == root || dir.exists() {
            break;
        }
        missing.push(dir.to_path_buf());
        current = dir.parent();
    }
    if let Some(top) = target.parent()
        && !missing.is_empty()
    {
        fs::create_dir_all(top).map_err(|e| EditError::io(top, e))?;
    }
    // `missing` is already deepest first.
    Ok(missing)
}
