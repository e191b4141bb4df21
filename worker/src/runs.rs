//! Markdown index over the run journals.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::io::config::write_atomic;
use crate::io::journal::{list_journals, load_run_log};

pub const INDEX_FILE: &str = "index.md";

/// Rewrite `<runs_dir>/index.md` with one row per parseable journal.
/// Unreadable journals are skipped. Returns the index path.
#[instrument(skip_all, fields(runs_dir = %runs_dir.display()))]
pub fn regenerate_runs_index(runs_dir: &Path) -> Result<PathBuf> {
    let mut out = String::from(
        "# Runs\n\n| run | ticket | status | compiled | commits | file |\n|---|---|---|---|---|---|\n",
    );
    let mut rows = 0;
    for path in list_journals(runs_dir)? {
        let log = match load_run_log(&path) {
            Ok(log) => log,
            Err(err) => {
                warn!(path = %path.display(), err = %format!("{err:#}"), "skipping journal");
                continue;
            }
        };
        let compiled = match log.validation.as_ref().and_then(|v| v.compiled) {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push_str(&format!(
            "| {} | {} | {} | {compiled} | {} | [{file}]({file}) |\n",
            log.run_id,
            log.task_id,
            log.status.as_str(),
            log.commits.len(),
        ));
        rows += 1;
    }
    let index = runs_dir.join(INDEX_FILE);
    write_atomic(&index, &out)?;
    info!(rows, "runs index written");
    Ok(index)
}
