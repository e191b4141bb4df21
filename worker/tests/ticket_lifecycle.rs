//! End-to-end runs of `execute_ticket` against a temporary git repository
//! with a real shell and a scripted oracle.

use std::fs;
use std::time::Duration;

use exec_worker::controller::Engine;
use exec_worker::core::plan::{FileEdit, PlanStep};
use exec_worker::core::types::{RunLog, RunStatus, Ticket};
use exec_worker::io::codebase::WorkspaceIndex;
use exec_worker::io::config::WorkerConfig;
use exec_worker::io::journal::{list_journals, load_run_log};
use exec_worker::io::process::SystemShell;
use exec_worker::test_support::{ScriptedOracle, TestRepo, ticket};

fn run(repo: &TestRepo, config: &WorkerConfig, oracle: &ScriptedOracle, t: &Ticket) -> RunLog {
    let shell = SystemShell::new(repo.root(), Duration::from_secs(30), 10_000);
    let codebase = WorkspaceIndex::new(repo.root(), true);
    Engine {
        root: repo.root(),
        config,
        oracle,
        shell: &shell,
        codebase: &codebase,
    }
    .execute_ticket(t)
    .expect("run should not crash")
}

/// Plans with fewer than 4 requirements and no risky keywords stay "low".
fn low_complexity() -> ScriptedOracle {
    ScriptedOracle::new()
        .with_requirements(vec!["Print hello".to_string()])
        .with_risks(Vec::new())
}

#[test]
fn say_hello_completes_in_one_cycle() {
    let repo = TestRepo::new().expect("repo");
    let config = WorkerConfig::default();
    let oracle = low_complexity()
        .with_completion(true, "hello printed")
        .with_plan(vec![
            PlanStep::shell("greet", "echo hello"),
            PlanStep::validate("check", "true"),
        ]);

    let log = run(&repo, &config, &oracle, &ticket("1", "Say hello"));

    assert_eq!(log.status, RunStatus::Completed);
    assert_eq!(log.commands.len(), 2);
    assert!(log.commands[0].stdout.contains("hello"));
    assert_eq!(log.plan_steps, 2);
    assert_eq!(log.current_step, 2);
    assert!(log.end_ts.is_some());
    assert_eq!(oracle.plan_prompts().len(), 1);
    // Two executed steps are below the progress-commit threshold.
    assert!(log.commits.is_empty());

    let journals = list_journals(&config.runs_dir_in(repo.root())).expect("list");
    assert_eq!(journals.len(), 1);
    assert_eq!(load_run_log(&journals[0]).expect("load"), log);
}

#[test]
fn failing_tests_exhaust_the_cycle_budget() {
    let repo = TestRepo::new().expect("repo");
    let mut config = WorkerConfig::default();
    config.validation.test_command = Some("false".to_string());
    let oracle = low_complexity().with_completion(true, "unused");

    let log = run(&repo, &config, &oracle, &ticket("2", "Never green"));

    assert_eq!(log.status, RunStatus::FailedMaxCycles);
    assert_eq!(oracle.plan_prompts().len(), 50);
    assert_eq!(
        log.error.as_deref(),
        Some("Agent failed to complete ticket after 50 cycles")
    );
    assert!(!log.validation.expect("validation").tests_passed());
    assert_eq!(
        list_journals(&config.runs_dir_in(repo.root())).expect("list").len(),
        1
    );
}

#[test]
fn journal_name_is_fixed_for_the_whole_run() {
    let repo = TestRepo::new().expect("repo");
    let mut config = WorkerConfig::default();
    config.cycle_budget.standard = 3;
    config.validation.test_command = Some("false".to_string());
    let oracle = low_complexity();

    let log = run(&repo, &config, &oracle, &ticket("T-3", "Three cycles"));

    let journals = list_journals(&config.runs_dir_in(repo.root())).expect("list");
    assert_eq!(journals.len(), 1);
    let name = journals[0]
        .file_name()
        .expect("file name")
        .to_string_lossy()
        .into_owned();
    let suffix = log.run_id.rsplit('-').next().expect("suffix");
    assert!(name.ends_with(&format!("-T-3-{suffix}.json")), "{name}");
    assert_eq!(name.as_bytes()[6], b'-');
    assert!(name[..6].bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(log.status, RunStatus::FailedMaxCycles);
}

#[test]
fn substantial_progress_is_committed() {
    let repo = TestRepo::new().expect("repo");
    let config = WorkerConfig::default();
    let oracle = low_complexity()
        .with_completion(true, "done")
        .with_plan(vec![
            PlanStep::shell("write", "echo hello > hello.txt"),
            PlanStep::shell("append", "echo again >> hello.txt"),
            PlanStep::validate("check", "test -f hello.txt"),
        ]);

    let log = run(&repo, &config, &oracle, &ticket("4", "Write hello"));

    assert_eq!(log.status, RunStatus::Completed);
    assert_eq!(log.commits.len(), 1);
    assert_eq!(repo.commit_count().expect("count"), 2);
    let node = &log.affected_nodes[0];
    assert_eq!(node.id, "node-4");
    assert_eq!(node.evidence.commits, log.commits);
}

#[test]
fn two_steps_do_not_commit() {
    let repo = TestRepo::new().expect("repo");
    let config = WorkerConfig::default();
    let oracle = low_complexity()
        .with_completion(true, "done")
        .with_plan(vec![
            PlanStep::shell("write", "echo hello > hello.txt"),
            PlanStep::validate("check", "test -f hello.txt"),
        ]);

    let log = run(&repo, &config, &oracle, &ticket("5", "Write hello"));

    assert_eq!(log.status, RunStatus::Completed);
    assert!(log.commits.is_empty());
    assert_eq!(repo.commit_count().expect("count"), 1);
    assert!(repo.root().join("hello.txt").is_file());
}

#[test]
fn failed_edit_batch_is_rolled_back_and_the_run_continues() {
    let repo = TestRepo::new().expect("repo");
    let config = WorkerConfig::default();
    let oracle = low_complexity()
        .with_completion(true, "done")
        .with_plan(vec![
            PlanStep::edit(
                "rewrite readme",
                vec![
                    FileEdit {
                        path: "README.md".to_string(),
                        find: "# fixture".to_string(),
                        replace: "# changed".to_string(),
                    },
                    FileEdit {
                        path: "README.md".to_string(),
                        find: "no such anchor".to_string(),
                        replace: "x".to_string(),
                    },
                ],
                None,
            ),
            PlanStep::shell("after", "echo still running"),
        ]);

    let log = run(&repo, &config, &oracle, &ticket("6", "Edit readme"));

    assert_eq!(
        fs::read_to_string(repo.root().join("README.md")).expect("read"),
        "# fixture\n"
    );
    assert_eq!(log.commands.len(), 2);
    assert!(!log.commands[0].succeeded());
    assert!(log.commands[1].stdout.contains("still running"));
    assert!(log.error.as_deref().is_some_and(|e| e.contains("anchor")));
    assert_eq!(log.status, RunStatus::Completed);
}

#[test]
fn plan_generator_failure_crashes_with_one_journal() {
    let repo = TestRepo::new().expect("repo");
    let config = WorkerConfig::default();
    let oracle = low_complexity().with_plan_error("connection reset");
    let shell = SystemShell::new(repo.root(), Duration::from_secs(30), 10_000);
    let codebase = WorkspaceIndex::new(repo.root(), true);

    let err = Engine {
        root: repo.root(),
        config: &config,
        oracle: &oracle,
        shell: &shell,
        codebase: &codebase,
    }
    .execute_ticket(&ticket("7", "Crash"))
    .expect_err("should crash");
    assert!(format!("{err:#}").contains("connection reset"));

    let journals = list_journals(&config.runs_dir_in(repo.root())).expect("list");
    assert_eq!(journals.len(), 1);
    let log = load_run_log(&journals[0]).expect("load");
    assert_eq!(log.status, RunStatus::Crashed);
    assert!(
        log.error
            .as_deref()
            .is_some_and(|e| e.contains("connection reset"))
    );
}
