//! Test-only collaborators: a temporary git repository, a scripted shell and
//! a scripted oracle.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::core::plan::PlanStep;
use crate::core::types::{CommandResult, DeepPlan, Focus, Ticket};
use crate::io::oracle::{CompletionVerdict, Oracle};
use crate::io::process::Shell;

/// Ticket whose description repeats its title.
pub fn ticket(id: &str, title: &str) -> Ticket {
    Ticket {
        ticket_id: id.to_string(),
        title: title.to_string(),
        description: title.to_string(),
        eoi: None,
    }
}

/// Temporary git repository with one commit and a local identity.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git(&["init", "--quiet"])?;
        repo.git(&["config", "user.name", "Test Worker"])?;
        repo.git(&["config", "user.email", "worker@example.com"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.root().join("README.md"), "# fixture\n").context("write README")?;
        repo.git(&["add", "-A"])?;
        repo.git(&["commit", "--quiet", "-m", "initial"])?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> Result<usize> {
        let out = self.git(&["rev-list", "--count", "HEAD"])?;
        out.trim().parse().context("parse commit count")
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.root())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

struct ShellRule {
    pattern: String,
    stderr: String,
    /// Remaining failures; `None` fails forever.
    remaining: Option<usize>,
}

/// Shell that records commands and fails the ones matching its rules.
/// Everything else succeeds; `echo` prints its arguments.
#[derive(Default)]
pub struct ScriptedShell {
    rules: RefCell<Vec<ShellRule>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` always fail with `stderr`.
    pub fn fail_matching(self, pattern: &str, stderr: &str) -> Self {
        self.push_rule(pattern, stderr, None)
    }

    /// Commands containing `pattern` fail the first `times` runs.
    pub fn fail_times(self, pattern: &str, times: usize, stderr: &str) -> Self {
        self.push_rule(pattern, stderr, Some(times))
    }

    fn push_rule(self, pattern: &str, stderr: &str, remaining: Option<usize>) -> Self {
        self.rules.borrow_mut().push(ShellRule {
            pattern: pattern.to_string(),
            stderr: stderr.to_string(),
            remaining,
        });
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl Shell for ScriptedShell {
    fn run(&self, cmd: &str) -> CommandResult {
        self.commands.borrow_mut().push(cmd.to_string());
        let mut rules = self.rules.borrow_mut();
        for rule in &mut *rules {
            if !cmd.contains(&rule.pattern) {
                continue;
            }
            match rule.remaining.as_mut() {
                None => return failure(cmd, &rule.stderr),
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return failure(cmd, &rule.stderr);
                }
            }
        }
        let stdout = cmd
            .strip_prefix("echo ")
            .map(|text| format!("{}\n", text.trim_matches(['\'', '"'])))
            .unwrap_or_default();
        CommandResult::synthesized(cmd, stdout)
    }
}

fn failure(cmd: &str, stderr: &str) -> CommandResult {
    CommandResult {
        exit_code: 1,
        ..CommandResult::failed(cmd, stderr)
    }
}

/// Oracle with canned answers. Unset analysis answers fail, so callers fall
/// back to their heuristics; plans come from a queue and are empty once it
/// runs dry.
#[derive(Default)]
pub struct ScriptedOracle {
    requirements: Option<Vec<String>>,
    success_criteria: Option<Vec<String>>,
    risks: Option<Vec<String>>,
    strategy: Option<String>,
    focus: Option<Option<Focus>>,
    completion: Option<CompletionVerdict>,
    plans: RefCell<VecDeque<Result<Vec<PlanStep>, String>>>,
    plan_prompts: RefCell<Vec<String>>,
    focus_candidates: RefCell<Vec<Vec<String>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = Some(requirements);
        self
    }

    pub fn with_success_criteria(mut self, criteria: Vec<String>) -> Self {
        self.success_criteria = Some(criteria);
        self
    }

    pub fn with_risks(mut self, risks: Vec<String>) -> Self {
        self.risks = Some(risks);
        self
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.strategy = Some(strategy.to_string());
        self
    }

    pub fn with_focus(mut self, focus: Option<Focus>) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn with_completion(mut self, completed: bool, reason: &str) -> Self {
        self.completion = Some(CompletionVerdict {
            completed,
            reason: reason.to_string(),
        });
        self
    }

    pub fn with_plan(self, steps: Vec<PlanStep>) -> Self {
        self.plans.borrow_mut().push_back(Ok(steps));
        self
    }

    pub fn with_plan_error(self, message: &str) -> Self {
        self.plans.borrow_mut().push_back(Err(message.to_string()));
        self
    }

    /// Every prompt passed to `generate_plan`, in order.
    pub fn plan_prompts(&self) -> Vec<String> {
        self.plan_prompts.borrow().clone()
    }

    /// Candidates offered to `choose_focus`, per call.
    pub fn focus_candidates(&self) -> Vec<Vec<String>> {
        self.focus_candidates.borrow().clone()
    }
}

fn canned<T: Clone>(answer: &Option<T>, what: &str) -> Result<T> {
    answer
        .clone()
        .ok_or_else(|| anyhow!("scripted oracle has no {what}"))
}

impl Oracle for ScriptedOracle {
    fn analyze_requirements(&self, _ticket: &Ticket) -> Result<Vec<String>> {
        canned(&self.requirements, "requirements")
    }

    fn define_success_criteria(&self, _ticket: &Ticket, _requirements: &[String]) -> Result<Vec<String>> {
        canned(&self.success_criteria, "success criteria")
    }

    fn assess_risks(
        &self,
        _ticket: &Ticket,
        _requirements: &[String],
        _workspace_summary: &str,
    ) -> Result<Vec<String>> {
        canned(&self.risks, "risks")
    }

    fn create_strategy(
        &self,
        _ticket: &Ticket,
        _requirements: &[String],
        _risks: &[String],
        _workspace_summary: &str,
    ) -> Result<String> {
        canned(&self.strategy, "strategy")
    }

    fn choose_focus(&self, _ticket: &Ticket, candidates: &[String]) -> Result<Option<Focus>> {
        self.focus_candidates.borrow_mut().push(candidates.to_vec());
        canned(&self.focus, "focus")
    }

    fn generate_plan(&self, prompt: &str) -> Result<Vec<PlanStep>> {
        self.plan_prompts.borrow_mut().push(prompt.to_string());
        match self.plans.borrow_mut().pop_front() {
            Some(Ok(steps)) => Ok(steps),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }

    fn evaluate_completion(
        &self,
        _ticket: &Ticket,
        _deep_plan: &DeepPlan,
        _workspace_summary: &str,
    ) -> Result<CompletionVerdict> {
        canned(&self.completion, "completion verdict")
    }
}
