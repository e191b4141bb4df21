//! Crash-safe run journal: one JSON artifact per run, rewritten in place.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::core::types::RunLog;
use crate::io::config::write_atomic;

/// Fresh run identifier (`r-<uuid>`).
pub fn new_run_id() -> String {
    format!("r-{}", Uuid::new_v4())
}

/// ISO-8601 UTC timestamp used for `start_ts`/`end_ts`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `HHMMSS-YYYYMMDD-{ticket}-{suffix}.json`, where the suffix is the last
/// segment of the run id.
pub fn journal_file_name(now: DateTime<Utc>, ticket_id: &str, run_id: &str) -> String {
    let suffix = run_id.rsplit('-').next().unwrap_or(run_id);
    format!(
        "{}-{}-{}.json",
        now.format("%H%M%S-%Y%m%d"),
        sanitize(ticket_id),
        sanitize(suffix)
    )
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Handle to the single artifact of one run. The path is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn create(runs_dir: &Path, now: DateTime<Utc>, ticket_id: &str, run_id: &str) -> Self {
        Self {
            path: runs_dir.join(journal_file_name(now, ticket_id, run_id)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically overwrite the artifact with the current run state.
    pub fn write(&self, log: &RunLog) -> Result<()> {
        debug!(
            path = %self.path.display(),
            status = log.status.as_str(),
            commands = log.commands.len(),
            "writing journal"
        );
        let mut buf = serde_json::to_string_pretty(log).context("serialize run log")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
            .with_context(|| format!("write journal {}", self.path.display()))
    }
}

/// Load a journal artifact from disk.
pub fn load_run_log(path: &Path) -> Result<RunLog> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read journal {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse journal {}", path.display()))
}

/// Every `*.json` file in the runs directory, sorted by name.
pub fn list_journals(runs_dir: &Path) -> Result<Vec<PathBuf>> {
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in
        fs::read_dir(runs_dir).with_context(|| format!("read runs dir {}", runs_dir.display()))?
    {
        let path = entry.context("read runs dir entry")?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CommandResult, Complexity, DeepPlan, RunStatus};
    use chrono::TimeZone;

    fn deep_plan() -> DeepPlan {
        DeepPlan {
            requirements: vec!["say hello".to_string()],
            success_criteria: vec!["compiles".to_string()],
            risks: Vec::new(),
            strategy: "incremental".to_string(),
            estimated_complexity: Complexity::Low,
        }
    }

    #[test]
    fn file_name_is_time_first() {
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).single().expect("time");
        let name = journal_file_name(now, "42", "r-9b2c4e1a-0000-4000-8000-123456789abc");
        assert_eq!(name, "050607-20250304-42-123456789abc.json");
        assert_eq!(journal_file_name(now, "a/b", "r-x"), "050607-20250304-a_b-x.json");
    }

    /// Repeated writes overwrite one artifact instead of creating new ones.
    #[test]
    fn repeated_writes_keep_one_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runs = temp.path().join("runs");
        let run_id = new_run_id();
        let journal = Journal::create(&runs, Utc::now(), "7", &run_id);

        let mut log = RunLog::new(run_id, "7", timestamp(Utc::now()), deep_plan());
        journal.write(&log).expect("write");
        log.commands.push(CommandResult::synthesized("echo", "hi"));
        journal.write(&log).expect("write");
        log.finish(RunStatus::Completed, timestamp(Utc::now()));
        journal.write(&log).expect("write");

        let files = list_journals(&runs).expect("list");
        assert_eq!(files, vec![journal.path().to_path_buf()]);
        let loaded = load_run_log(journal.path()).expect("load");
        assert_eq!(loaded, log);
    }

    #[test]
    fn missing_runs_dir_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(list_journals(&temp.path().join("none")).expect("list").is_empty());
    }

    #[test]
    fn run_ids_are_prefixed_uuids() {
        let id = new_run_id();
        assert!(id.starts_with("r-"));
        assert!(Uuid::parse_str(&id[2..]).is_ok());
    }
}
