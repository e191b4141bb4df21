//! `exec-worker`: run tickets against a workspace and inspect the results.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exec_worker::controller::Engine;
use exec_worker::core::recovery::diagnose;
use exec_worker::core::types::{Focus, RunStatus, Ticket};
use exec_worker::exit_codes;
use exec_worker::io::codebase::WorkspaceIndex;
use exec_worker::io::config::{config_path, load_config};
use exec_worker::io::layout::init_layout;
use exec_worker::io::oracle::ChatOracle;
use exec_worker::io::process::SystemShell;
use exec_worker::logging;
use exec_worker::runs::regenerate_runs_index;

#[derive(Parser)]
#[command(
    name = "exec-worker",
    version,
    about = "Autonomous ticket-execution engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.worker/` with a default config and a `.gitignore`.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Execute a ticket and print the final run log as JSON.
    Run {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        /// Model name passed to the oracle.
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,
        /// Pinned focus target.
        #[arg(long)]
        focus: Option<String>,
        /// Disable symbol-aware search and summaries.
        #[arg(long)]
        basic: bool,
    },
    /// Regenerate `index.md` in the runs directory.
    Runs {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Analyze failure output read from stdin.
    Diagnose {
        /// The command that produced the output.
        #[arg(long)]
        command: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Run {
            id,
            title,
            description,
            workspace,
            model,
            focus,
            basic,
        } => {
            let ticket = Ticket {
                ticket_id: id,
                title,
                description,
                eoi: focus.as_deref().map(Focus::from_path),
            };
            cmd_run(&workspace, &ticket, &model, !basic)
        }
        Command::Runs { workspace } => cmd_runs(&workspace),
        Command::Diagnose { command } => cmd_diagnose(&command),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    if init_layout(&root, force)? {
        println!("wrote {}", config_path(&root).display());
    }
    Ok(exit_codes::OK)
}

fn cmd_run(workspace: &Path, ticket: &Ticket, model: &str, enhanced: bool) -> Result<i32> {
    let root = workspace
        .canonicalize()
        .with_context(|| format!("resolve workspace {}", workspace.display()))?;
    let config = load_config(&config_path(&root))?;
    let oracle = ChatOracle::from_env(&config.oracle, model)?;
    let shell = SystemShell::new(
        &root,
        Duration::from_secs(config.shell_timeout_secs),
        config.output_limit_bytes,
    );
    let codebase = WorkspaceIndex::new(&root, enhanced);
    let engine = Engine {
        root: &root,
        config: &config,
        oracle: &oracle,
        shell: &shell,
        codebase: &codebase,
    };

    let outcome = engine.execute_ticket(ticket);
    if let Err(err) = regenerate_runs_index(&config.runs_dir_in(&root)) {
        tracing::warn!(err = %format!("{err:#}"), "runs index not refreshed");
    }
    let log = outcome?;
    println!(
        "{}",
        serde_json::to_string_pretty(&log).context("serialize run log")?
    );
    Ok(match log.status {
        RunStatus::Completed => exit_codes::OK,
        _ => exit_codes::INCOMPLETE,
    })
}

fn cmd_runs(workspace: &Path) -> Result<i32> {
    let config = load_config(&config_path(workspace))?;
    let index = regenerate_runs_index(&config.runs_dir_in(workspace))?;
    println!("{}", index.display());
    Ok(exit_codes::OK)
}

fn cmd_diagnose(command: &str) -> Result<i32> {
    let mut output = String::new();
    std::io::stdin()
        .read_to_string(&mut output)
        .context("read failure output from stdin")?;
    let diagnosis = diagnose(&output, command);
    println!(
        "{}",
        serde_json::to_string_pretty(&diagnosis).context("serialize diagnosis")?
    );
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["exec-worker", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["exec-worker", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from([
            "exec-worker",
            "run",
            "--id",
            "T-1",
            "--title",
            "Say hello",
            "--description",
            "Print hello",
        ]);
        let Command::Run {
            id,
            workspace,
            model,
            focus,
            basic,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(id, "T-1");
        assert_eq!(workspace, PathBuf::from("."));
        assert_eq!(model, "gpt-4o-mini");
        assert_eq!(focus, None);
        assert!(!basic);
    }

    #[test]
    fn parse_run_with_focus_and_basic() {
        let cli = Cli::parse_from([
            "exec-worker",
            "run",
            "--id",
            "T-2",
            "--title",
            "t",
            "--description",
            "d",
            "--focus",
            "src/lib.rs",
            "--basic",
        ]);
        assert!(matches!(
            cli.command,
            Command::Run { focus: Some(ref f), basic: true, .. } if f == "src/lib.rs"
        ));
    }

    #[test]
    fn parse_diagnose() {
        let cli = Cli::parse_from(["exec-worker", "diagnose", "--command", "cargo build"]);
        assert!(matches!(cli.command, Command::Diagnose { ref command } if command == "cargo build"));
    }

    #[test]
    fn run_without_title_is_rejected() {
        assert!(Cli::try_parse_from(["exec-worker", "run", "--id", "1"]).is_err());
    }
}
