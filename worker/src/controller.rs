//! Cycle Controller: drives one ticket from deep planning to a terminal status.
//!
//! Per-run state lives in an explicit [`RunContext`] threaded through the
//! cycle helpers, and every state change is flushed to the run journal
//! immediately. A killed process loses at most the step in flight.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::core::complexity::cycle_budget;
use crate::core::gates::{is_ready, node_progress, should_commit};
use crate::core::plan::PlanStep;
use crate::core::types::{DeepPlan, Focus, Reflection, RunLog, RunStatus, Ticket, ValidationResult};
use crate::executor::{ExecutorConfig, PlanOutcome, Toolbox, execute_plan};
use crate::io::codebase::Codebase;
use crate::io::config::WorkerConfig;
use crate::io::git::Git;
use crate::io::journal::{Journal, new_run_id, timestamp};
use crate::io::layout::{WorkerPaths, ensure_layout};
use crate::io::oracle::Oracle;
use crate::io::process::Shell;
use crate::io::prompt::{CyclePromptInputs, render_cycle_prompt};
use crate::io::task_tree::{CycleRecord, TaskTree, node_id};
use crate::planner::deep_plan;
use crate::validate::{Toolchain, detect_toolchain, validate_against_success_criteria, validate_project};

/// Collaborators and settings for executing tickets in one workspace.
pub struct Engine<'a, O, S, C> {
    pub root: &'a Path,
    pub config: &'a WorkerConfig,
    pub oracle: &'a O,
    pub shell: &'a S,
    pub codebase: &'a C,
}

/// Mutable state of one run: the run log and the journal it is flushed to.
struct RunContext {
    run_log: RunLog,
    journal: Journal,
}

impl RunContext {
    fn flush(&self) -> Result<()> {
        self.journal.write(&self.run_log)
    }
}

/// Per-run collaborators resolved once after planning.
struct Workbench {
    paths: WorkerPaths,
    git: Option<Git>,
    toolchain: Option<Toolchain>,
    task_tree: TaskTree,
    node_id: String,
    max_cycles: u32,
}

impl<O: Oracle, S: Shell, C: Codebase> Engine<'_, O, S, C> {
    /// Run `ticket` to a terminal status and return the final run log.
    ///
    /// On an unhandled error the journal is finalized as `CRASHED` before the
    /// error is returned. Either way exactly one journal file holds the run.
    #[instrument(skip_all, fields(ticket = %ticket.ticket_id))]
    pub fn execute_ticket(&self, ticket: &Ticket) -> Result<RunLog> {
        let started = Utc::now();
        let run_id = new_run_id();
        let runs_dir = self.config.runs_dir_in(self.root);
        let journal = Journal::create(&runs_dir, started, &ticket.ticket_id, &run_id);
        info!(run_id = %run_id, journal = %journal.path().display(), "starting run");

        let summary = self.workspace_summary();
        let plan = deep_plan(self.oracle, ticket, &summary);
        let mut ctx = RunContext {
            run_log: RunLog::new(run_id, &ticket.ticket_id, timestamp(started), plan),
            journal,
        };

        match self.run_cycles(&mut ctx, ticket) {
            Ok(()) => Ok(ctx.run_log),
            Err(err) => {
                ctx.run_log.error = Some(format!("Agent crashed with exception: {err:#}"));
                ctx.run_log.finish(RunStatus::Crashed, timestamp(Utc::now()));
                if let Err(flush_err) = ctx.flush() {
                    error!(err = %format!("{flush_err:#}"), "could not flush crashed run");
                }
                error!(
                    err = %format!("{err:#}"),
                    journal = %ctx.journal.path().display(),
                    "run crashed"
                );
                Err(err)
            }
        }
    }

    fn run_cycles(&self, ctx: &mut RunContext, ticket: &Ticket) -> Result<()> {
        let mut bench = self.prepare(ctx, ticket)?;
        let mut ready = false;
        let mut cycle = 0;
        while !ready && cycle < bench.max_cycles {
            cycle += 1;
            info!(cycle, max_cycles = bench.max_cycles, "starting cycle");
            match self.run_cycle(ctx, &mut bench, ticket, cycle)? {
                CycleEnd::Continue { ready: r } => ready = r,
                CycleEnd::Fatal => return Ok(()),
            }
        }

        let now = timestamp(Utc::now());
        if ready {
            ctx.run_log.finish(RunStatus::Completed, now);
        } else {
            ctx.run_log.error = Some(format!(
                "Agent failed to complete ticket after {} cycles",
                bench.max_cycles
            ));
            ctx.run_log.finish(RunStatus::FailedMaxCycles, now);
        }
        ctx.run_log.reflections.push(Reflection::new(
            "decision",
            format!("finished after {cycle} cycle(s) with status {}", ctx.run_log.status.as_str()),
        ));
        ctx.flush()?;
        info!(cycles = cycle, status = ctx.run_log.status.as_str(), "run finished");
        Ok(())
    }

    fn prepare(&self, ctx: &mut RunContext, ticket: &Ticket) -> Result<Workbench> {
        let paths = WorkerPaths::new(self.root);
        ensure_layout(&paths)?;
        ctx.flush()?;

        let git = Git::new(self.root);
        let git = if git.is_repo() {
            Some(git)
        } else {
            warn!("workspace is not a git repository, commits disabled");
            ctx.run_log.reflections.push(Reflection::new(
                "warning",
                "workspace is not a git repository; commits disabled",
            ));
            None
        };

        let plan = ctx
            .run_log
            .deep_plan
            .clone()
            .context("run log has no deep plan")?;
        let task_tree = TaskTree::load_or_create(&paths.task_tree_path, ticket, &plan)?;
        task_tree.save(&paths.task_tree_path)?;

        let max_cycles = cycle_budget(plan.estimated_complexity, (&self.config.cycle_budget).into());
        ctx.run_log.reflections.push(Reflection::new(
            "plan",
            format!(
                "complexity {} allows {max_cycles} cycles",
                plan.estimated_complexity.as_str()
            ),
        ));
        ctx.flush()?;

        Ok(Workbench {
            toolchain: detect_toolchain(self.root, &self.config.validation),
            paths,
            git,
            task_tree,
            node_id: node_id(&ticket.ticket_id),
            max_cycles,
        })
    }

    fn run_cycle(
        &self,
        ctx: &mut RunContext,
        bench: &mut Workbench,
        ticket: &Ticket,
        cycle: u32,
    ) -> Result<CycleEnd> {
        let focus = self.select_focus(ticket);
        ctx.run_log.eoi = focus.clone();
        ctx.flush()?;

        let summary = self.workspace_summary();
        let plan = ctx
            .run_log
            .deep_plan
            .clone()
            .context("run log has no deep plan")?;
        let tree_snapshot = bench.task_tree.snapshot();
        let prompt = render_cycle_prompt(&CyclePromptInputs {
            ticket,
            focus: focus.as_ref(),
            task_tree: &tree_snapshot,
            workspace_summary: &summary,
            deep_plan: &plan,
        })?;
        let steps = self.oracle.generate_plan(&prompt).context("generate plan")?;
        ctx.run_log.plan_steps = steps.len();
        ctx.run_log.current_step = 0;
        ctx.flush()?;
        debug!(steps = steps.len(), "plan received");

        let outcome = self.execute(ctx, bench, ticket, &steps)?;
        if let Some(fatal) = &outcome.fatal {
            ctx.run_log.error = Some(fatal.clone());
            ctx.run_log.finish(RunStatus::Failed, timestamp(Utc::now()));
            ctx.flush()?;
            return Ok(CycleEnd::Fatal);
        }

        let validation = validate_project(self.shell, bench.toolchain.as_ref());
        ctx.run_log.validation = Some(validation.clone());
        ctx.flush()?;

        let mut commits = outcome.commits();
        if should_commit(&validation, outcome.executed_steps(), self.config.commit_min_steps) {
            if let Some(sha) = self.commit_progress(ctx, bench.git.as_ref(), ticket, cycle) {
                commits.push(sha);
            }
        } else {
            debug!(executed = outcome.executed_steps(), "deferring commit");
        }

        let ready = self.check_ready(ticket, &plan, &validation, &summary);

        let (status, coverage_pct) = node_progress(&validation, outcome.executed_steps(), ready);
        let note = format!(
            "cycle {cycle}: {} step(s) executed; {}",
            outcome.executed_steps(),
            validation
                .tests
                .as_ref()
                .map(|t| t.summary.as_str())
                .unwrap_or("not validated")
        );
        let affected = bench.task_tree.record_cycle(
            &bench.node_id,
            &CycleRecord {
                status,
                coverage_pct,
                commits,
                files: outcome.files(),
                note,
            },
        );
        bench.task_tree.save(&bench.paths.task_tree_path)?;
        ctx.run_log.affected_nodes = affected.into_iter().collect();
        ctx.flush()?;

        Ok(CycleEnd::Continue { ready })
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        bench: &Workbench,
        ticket: &Ticket,
        steps: &[PlanStep],
    ) -> Result<PlanOutcome> {
        let tools = Toolbox {
            root: self.root,
            ticket_id: &ticket.ticket_id,
            shell: self.shell,
            codebase: self.codebase,
            git: bench.git.as_ref(),
        };
        let config = ExecutorConfig {
            max_shell_attempts: self.config.max_shell_attempts,
            ..ExecutorConfig::default()
        };
        let RunContext { run_log, journal } = ctx;
        execute_plan(&tools, &config, steps, |record| {
            run_log.commands.push(record.result.clone());
            run_log.current_step = record.index + 1;
            if let Some(sha) = &record.commit {
                run_log.commits.push(sha.clone());
            }
            if let Some(err) = &record.error {
                run_log.error = Some(err.clone());
            }
            journal.write(run_log)
        })
    }

    /// Selector first, with the pinned target offered as the first candidate;
    /// the pinned target is also the fallback.
    fn select_focus(&self, ticket: &Ticket) -> Option<Focus> {
        let mut candidates: Vec<String> = ticket.eoi.iter().map(|f| f.path.clone()).collect();
        match self
            .codebase
            .candidate_focus_paths(self.config.workspace.candidate_limit)
        {
            Ok(paths) => {
                for path in paths {
                    if !candidates.contains(&path) {
                        candidates.push(path);
                    }
                }
            }
            Err(err) => warn!(err = %format!("{err:#}"), "listing focus candidates failed"),
        }
        match self.oracle.choose_focus(ticket, &candidates) {
            Ok(Some(focus)) => Some(focus),
            Ok(None) => ticket.eoi.clone(),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "focus selection failed, using pinned target");
                ticket.eoi.clone()
            }
        }
    }

    /// Progress commit: only when the tree is dirty; push failures are logged.
    /// Commit errors become a reflection rather than ending the run.
    fn commit_progress(
        &self,
        ctx: &mut RunContext,
        git: Option<&Git>,
        ticket: &Ticket,
        cycle: u32,
    ) -> Option<String> {
        let git = git?;
        let attempt = || -> Result<Option<String>> {
            if git.status_porcelain()?.is_empty() {
                return Ok(None);
            }
            let sha = git.commit_all(&format!(
                "feat({}): progress (cycle {cycle})",
                ticket.ticket_id
            ))?;
            if sha.is_some() {
                git.push()?;
            }
            Ok(sha)
        };
        match attempt() {
            Ok(Some(sha)) => {
                info!(sha = %sha, "committed progress");
                ctx.run_log.commits.push(sha.clone());
                if let Err(err) = ctx.flush() {
                    warn!(err = %format!("{err:#}"), "journal write after commit failed");
                }
                Some(sha)
            }
            Ok(None) => {
                debug!("nothing to commit");
                None
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "progress commit failed");
                ctx.run_log
                    .reflections
                    .push(Reflection::new("warning", format!("progress commit failed: {err:#}")));
                None
            }
        }
    }

    /// Strict readiness. The semantic check only runs on a green build.
    fn check_ready(
        &self,
        ticket: &Ticket,
        plan: &DeepPlan,
        validation: &ValidationResult,
        summary: &str,
    ) -> bool {
        if !(validation.compiled() && validation.tests_passed()) {
            debug!("not ready: build or tests failing");
            return false;
        }
        let verdict =
            validate_against_success_criteria(self.oracle, self.codebase, ticket, plan, summary);
        debug!(met = verdict.met, reason = %verdict.reason, "semantic check");
        is_ready(validation, verdict.met)
    }

    fn workspace_summary(&self) -> String {
        self.codebase
            .workspace_summary(self.config.workspace.summary_max_files)
            .unwrap_or_else(|err| {
                warn!(err = %format!("{err:#}"), "workspace summary failed");
                String::new()
            })
    }
}

enum CycleEnd {
    Continue { ready: bool },
    Fatal,
}
