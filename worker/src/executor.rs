//! Plan Executor: runs one cycle's plan steps in order.
//!
//! A failing step never aborts the plan. Its error becomes a failed
//! [`CommandResult`] and execution moves on, unless [`is_fatal`] says otherwise.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::plan::{
    EditArgs, PlanStep, SearchArgs, ShellArgs, StepAction, ValidateArgs, VcsAction, VcsArgs,
};
use crate::core::recovery::{diagnose, fallback_command};
use crate::core::types::CommandResult;
use crate::io::codebase::Codebase;
use crate::io::edits::apply_transactional;
use crate::io::git::Git;
use crate::io::process::Shell;

/// Collaborators a plan runs against.
pub struct Toolbox<'a, S, C> {
    pub root: &'a Path,
    pub ticket_id: &'a str,
    pub shell: &'a S,
    pub codebase: &'a C,
    /// `None` when the workspace is not a git repository.
    pub git: Option<&'a Git>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Attempts per shell step, including the first.
    pub max_shell_attempts: usize,
    /// Matches reported by a search step.
    pub search_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_shell_attempts: 5,
            search_limit: 10,
        }
    }
}

/// What one step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Position in the plan (0-based).
    pub index: usize,
    pub result: CommandResult,
    /// False for skipped (unsupported) steps.
    pub executed: bool,
    /// Commit made by an edit step.
    pub commit: Option<String>,
    /// Files changed by an edit step.
    pub files: Vec<String>,
    /// Internal error text when the step itself failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOutcome {
    pub records: Vec<StepRecord>,
    /// Set when a fatal step failure stopped the plan.
    pub fatal: Option<String>,
}

impl PlanOutcome {
    /// Steps that ran (skipped steps excluded), successful or not.
    pub fn executed_steps(&self) -> usize {
        self.records.iter().filter(|r| r.executed).count()
    }

    pub fn commits(&self) -> Vec<String> {
        self.records.iter().filter_map(|r| r.commit.clone()).collect()
    }

    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for file in self.records.iter().flat_map(|r| &r.files) {
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
        files
    }
}

/// Whether a step failure should stop the rest of the plan. Nothing is fatal,
/// so partial progress within a plan is always kept.
pub fn is_fatal(_record: &StepRecord) -> bool {
    false
}

/// Execute `steps` in order, calling `on_step` after each one. An error from
/// `on_step` aborts execution and is returned as-is.
#[instrument(skip_all, fields(steps = steps.len()))]
pub fn execute_plan<S, C, F>(
    tools: &Toolbox<'_, S, C>,
    config: &ExecutorConfig,
    steps: &[PlanStep],
    mut on_step: F,
) -> Result<PlanOutcome>
where
    S: Shell,
    C: Codebase,
    F: FnMut(&StepRecord) -> Result<()>,
{
    let mut outcome = PlanOutcome::default();
    for (index, step) in steps.iter().enumerate() {
        debug!(index, kind = step.action.kind(), description = %step.description, "running step");
        let record = match run_step(tools, config, step) {
            Ok(mut record) => {
                record.index = index;
                record
            }
            Err(err) => {
                let text = format!("{err:#}");
                warn!(index, err = %text, "step failed");
                StepRecord {
                    index,
                    result: CommandResult::failed(step.description.clone(), text.clone()),
                    executed: true,
                    commit: None,
                    files: Vec::new(),
                    error: Some(text),
                }
            }
        };
        on_step(&record)?;
        let fatal = record.error.is_some() && is_fatal(&record);
        let error = record.error.clone();
        outcome.records.push(record);
        if fatal {
            outcome.fatal = error;
            break;
        }
    }
    info!(
        executed = outcome.executed_steps(),
        fatal = outcome.fatal.is_some(),
        "plan finished"
    );
    Ok(outcome)
}

fn run_step<S: Shell, C: Codebase>(
    tools: &Toolbox<'_, S, C>,
    config: &ExecutorConfig,
    step: &PlanStep,
) -> Result<StepRecord> {
    let record = match &step.action {
        StepAction::Search(args) => executed(run_search(tools.codebase, args, config.search_limit)?),
        StepAction::Edit(args) => run_edit(tools, args)?,
        StepAction::Shell(ShellArgs { cmd }) => executed(run_shell_with_recovery(
            tools.shell,
            cmd,
            config.max_shell_attempts,
        )),
        StepAction::Vcs(args) => executed(run_vcs(tools.git, args)?),
        StepAction::Validate(args) => executed(run_validate(tools.shell, args)),
        StepAction::Unsupported { kind } => {
            debug!(kind = %kind, "skipping unsupported step");
            StepRecord {
                executed: false,
                ..executed(CommandResult::synthesized(
                    format!("SKIP {kind}"),
                    format!("unsupported step kind `{kind}` skipped"),
                ))
            }
        }
    };
    Ok(record)
}

fn executed(result: CommandResult) -> StepRecord {
    StepRecord {
        index: 0,
        result,
        executed: true,
        commit: None,
        files: Vec::new(),
        error: None,
    }
}

fn run_search<C: Codebase>(codebase: &C, args: &SearchArgs, limit: usize) -> Result<CommandResult> {
    if args.semantic {
        let query = args.query.as_deref().unwrap_or(&args.pattern);
        let hits = codebase.semantic_search(query, limit)?;
        let preview: Vec<String> = hits
            .iter()
            .map(|h| format!("{}:{}: {} {}", h.path, h.line, h.kind, h.name))
            .collect();
        return Ok(CommandResult::synthesized(
            format!("SEMANTIC_SEARCH {query}"),
            preview.join("\n"),
        ));
    }
    let hits = codebase.grep(&args.pattern, &args.globs)?;
    let preview: Vec<String> = hits
        .iter()
        .take(limit)
        .map(|h| format!("{}:{}: {}", h.path, h.line, h.text))
        .collect();
    Ok(CommandResult::synthesized(
        format!("SEARCH {}", args.pattern),
        preview.join("\n"),
    ))
}

fn run_edit<S, C>(tools: &Toolbox<'_, S, C>, args: &EditArgs) -> Result<StepRecord> {
    if args.edits.is_empty() {
        return Err(anyhow!("edit step has no usable edits"));
    }
    let files = apply_transactional(tools.root, &args.edits).context("apply edits")?;
    let mut result = CommandResult::synthesized(
        "edit_engine.apply_edits",
        format!("applied {} edit(s) to {}", args.edits.len(), files.join(", ")),
    );
    let mut commit = None;
    if let Some(git) = tools.git {
        let message = args
            .message
            .clone()
            .unwrap_or_else(|| format!("chore: apply edits for {}", tools.ticket_id));
        match git.commit_all(&message) {
            Ok(sha) => commit = sha,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "committing edits failed");
                result.stderr = format!("commit failed: {err:#}");
            }
        }
    }
    Ok(StepRecord {
        commit,
        files,
        ..executed(result)
    })
}

fn run_vcs(git: Option<&Git>, args: &VcsArgs) -> Result<CommandResult> {
    let git = git.ok_or_else(|| anyhow!("workspace is not a git repository"))?;
    let result = match args.action {
        VcsAction::Status => CommandResult::synthesized("git status", git.status_text()?),
        VcsAction::Push => {
            let out = git.push()?;
            CommandResult {
                exit_code: if out.success { 0 } else { 1 },
                ..CommandResult::synthesized("git push", out.text)
            }
        }
    };
    Ok(result)
}

/// Run `cmd`, retrying failures up to `max_attempts` times in total.
///
/// After a failure, the next attempt uses the recovery engine's suggestions
/// for the original command (attempt `n` picks suggestion `n`, clamped), or a
/// deterministic rewrite when nothing can be applied automatically. Returns
/// the first success, otherwise the last failure.
#[instrument(skip_all, fields(cmd = %cmd))]
pub fn run_shell_with_recovery<S: Shell>(shell: &S, cmd: &str, max_attempts: usize) -> CommandResult {
    let max_attempts = max_attempts.max(1);
    let mut current = cmd.to_string();
    let mut attempt = 0;
    loop {
        let result = shell.run(&current);
        if result.succeeded() {
            if attempt > 0 {
                info!(attempts = attempt + 1, "command recovered");
            }
            return result;
        }
        debug!(attempt = attempt + 1, exit_code = result.exit_code, "shell attempt failed");
        if attempt + 1 >= max_attempts {
            warn!(attempts = max_attempts, "command failed after all attempts");
            return result;
        }
        let suggestions = diagnose(result.failure_text(), &current).replacement_commands(cmd);
        current = match suggestions.get(attempt.min(suggestions.len().saturating_sub(1))) {
            Some(suggested) => suggested.clone(),
            None => fallback_command(&current, &result.stdout, &result.stderr, attempt),
        };
        attempt += 1;
    }
}

fn run_validate<S: Shell>(shell: &S, args: &ValidateArgs) -> CommandResult {
    let parts = split_compound(&args.cmd);
    if parts.len() <= 1 {
        let result = shell.run(&args.cmd);
        return if result.succeeded() {
            result
        } else {
            annotate_failure(&args.cmd, &args.cmd, result)
        };
    }

    let mut stdout = String::new();
    let mut duration_ms = 0;
    let mut first_failure: Option<(String, CommandResult)> = None;
    for part in &parts {
        let result = shell.run(part);
        duration_ms += result.duration_ms;
        stdout.push_str(&format!(
            "$ {part} (exit {})\n{}",
            result.exit_code, result.stdout
        ));
        if !stdout.ends_with('\n') {
            stdout.push('\n');
        }
        if !result.succeeded() && first_failure.is_none() {
            first_failure = Some((part.clone(), result));
        }
    }
    match first_failure {
        None => CommandResult {
            duration_ms,
            ..CommandResult::synthesized(args.cmd.clone(), stdout)
        },
        Some((part, failed)) => CommandResult {
            duration_ms,
            ..annotate_failure(&args.cmd, &part, failed)
        },
    }
}

fn annotate_failure(cmd: &str, part: &str, failed: CommandResult) -> CommandResult {
    let diagnosis = diagnose(failed.failure_text(), part);
    let mut stdout = diagnosis.annotation();
    if part != cmd {
        stdout.push_str(&format!("\nFailed sub-command: {part}"));
    }
    CommandResult {
        cmd: format!("VALIDATE_WITH_ANALYSIS: {cmd}"),
        exit_code: failed.exit_code,
        stdout,
        stderr: failed.stderr,
        duration_ms: failed.duration_ms,
    }
}

/// Split a compound command on `&&`, `||` and `;` outside quotes.
pub fn split_compound(cmd: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = cmd.chars().peekable();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.push(c);
            }
            (None, ';') => push_part(&mut parts, &mut current),
            (None, '&' | '|') if chars.peek() == Some(&c) => {
                chars.next();
                push_part(&mut parts, &mut current);
            }
            (None, c) => current.push(c),
        }
    }
    push_part(&mut parts, &mut current);
    parts
}

fn push_part(parts: &mut Vec<String>, current: &mut String) {
    let part = current.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
    current.clear();
}
