//! Shared deterministic types for the ticket-execution engine.
//!
//! Field names on the serialized types are part of the run journal's
//! compatibility surface and must not be renamed.

use serde::{Deserialize, Serialize};

/// File or module the current cycle concentrates on (entity of interest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Focus {
    pub label: String,
    pub path: String,
}

impl Focus {
    /// Focus derived from a bare path; the label is the final path component.
    pub fn from_path(path: &str) -> Self {
        let label = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(path)
            .to_string();
        Self {
            label,
            path: path.to_string(),
        }
    }
}

/// External unit of work driving one run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub title: String,
    pub description: String,
    /// Optional pinned focus target.
    pub eoi: Option<Focus>,
}

/// Estimated ticket complexity; bounds the cycle budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
    Epic,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
            Complexity::Epic => "epic",
        }
    }

    /// True for the classes that earn the extended cycle budget.
    pub fn is_extended(self) -> bool {
        matches!(self, Complexity::High | Complexity::Epic)
    }
}

/// One-time upfront analysis of a ticket. Never regenerated within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepPlan {
    pub requirements: Vec<String>,
    pub success_criteria: Vec<String>,
    pub risks: Vec<String>,
    pub strategy: String,
    pub estimated_complexity: Complexity,
}

/// Outcome of one executed (or synthesized) command. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub cmd: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandResult {
    /// Result for work done in-process (search, edits, skipped steps).
    pub fn synthesized(cmd: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    /// Failed in-process result carrying the error text.
    pub fn failed(cmd: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            exit_code: -1,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Failure text used for diagnosis: stderr, or stdout when stderr is empty.
    pub fn failure_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestsSummary {
    pub passed: bool,
    pub summary: String,
}

/// Build/test verdict for one cycle. `compiled` is tri-state: `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub compiled: Option<bool>,
    pub tests: Option<TestsSummary>,
}

impl ValidationResult {
    pub fn compiled(&self) -> bool {
        self.compiled == Some(true)
    }

    pub fn tests_passed(&self) -> bool {
        self.tests.as_ref().is_some_and(|t| t.passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Partial,
    Done,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub commits: Vec<String>,
    pub files: Vec<String>,
}

/// Progress summary for task-tree bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedNode {
    pub id: String,
    pub status: NodeStatus,
    pub coverage_pct: u8,
    pub evidence: Evidence,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reflection {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl Reflection {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// Run lifecycle status. `InProgress` transitions to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "failed_max_cycles")]
    FailedMaxCycles,
    #[serde(rename = "CRASHED")]
    Crashed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::FailedMaxCycles => "failed_max_cycles",
            RunStatus::Crashed => "CRASHED",
        }
    }
}

/// Aggregate root for one execution; this is the journal payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    /// Ticket id (kept as `task_id` in the artifact).
    pub task_id: String,
    pub start_ts: String,
    pub end_ts: Option<String>,
    pub eoi: Option<Focus>,
    pub commands: Vec<CommandResult>,
    pub commits: Vec<String>,
    pub validation: Option<ValidationResult>,
    pub affected_nodes: Vec<AffectedNode>,
    pub reflections: Vec<Reflection>,
    pub status: RunStatus,
    pub plan_steps: usize,
    pub current_step: usize,
    pub error: Option<String>,
    pub deep_plan: Option<DeepPlan>,
}

impl RunLog {
    pub fn new(run_id: String, ticket_id: &str, start_ts: String, deep_plan: DeepPlan) -> Self {
        Self {
            run_id,
            task_id: ticket_id.to_string(),
            start_ts,
            end_ts: None,
            eoi: None,
            commands: Vec::new(),
            commits: Vec::new(),
            validation: None,
            affected_nodes: Vec::new(),
            reflections: Vec::new(),
            status: RunStatus::InProgress,
            plan_steps: 0,
            current_step: 0,
            error: None,
            deep_plan: Some(deep_plan),
        }
    }

    /// Move to a terminal status. Returns false (and changes nothing) if the
    /// run already left `in_progress` or `status` is not terminal.
    pub fn finish(&mut self, status: RunStatus, end_ts: String) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.end_ts = Some(end_ts);
        true
    }
}
