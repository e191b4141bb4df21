//! Shell execution with timeouts and bounded output.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::CommandResult;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    fn truncated_notice(stream: &str, bytes: usize) -> String {
        if bytes > 0 {
            format!("\n[{stream} truncated {bytes} bytes]\n")
        } else {
            String::new()
        }
    }

    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        text.push_str(&Self::truncated_notice("stdout", self.stdout_truncated));
        text
    }

    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        text.push_str(&Self::truncated_notice("stderr", self.stderr_truncated));
        text
    }
}

/// How long output pipes may stay open after the child exits before its
/// process group is killed.
const OUTPUT_GRACE: Duration = Duration::from_millis(500);

type StreamResult = Result<(Vec<u8>, usize)>;

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
///
/// The child leads its own process group. On timeout the whole group is killed, and so is a
/// group whose background processes keep the output pipes open after the child exits.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_rx = spawn_reader(stdout, output_limit_bytes);
    let stderr_rx = spawn_reader(stderr, output_limit_bytes);

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_group(&child);
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = collect_output(&stdout_rx, &child).context("collect stdout")?;
    let (stderr, stderr_truncated) = collect_output(&stderr_rx, &child).context("collect stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, limit: usize) -> Receiver<StreamResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if tx.send(read_stream_limited(reader, limit)).is_err() {
            debug!("output collector gave up before the pipe closed");
        }
    });
    rx
}

/// Wait for a reader to hit EOF. A pipe still held open by a leftover
/// background process gets its group killed; if even that does not close it,
/// the output is given up on.
fn collect_output(rx: &Receiver<StreamResult>, child: &Child) -> StreamResult {
    match rx.recv_timeout(OUTPUT_GRACE) {
        Ok(result) => return result,
        Err(RecvTimeoutError::Disconnected) => return Err(anyhow!("output reader thread panicked")),
        Err(RecvTimeoutError::Timeout) => {}
    }
    warn!(pid = child.id(), "output pipe still open after exit, killing process group");
    kill_group(child);
    match rx.recv_timeout(OUTPUT_GRACE) {
        Ok(result) => result,
        Err(RecvTimeoutError::Disconnected) => Err(anyhow!("output reader thread panicked")),
        Err(RecvTimeoutError::Timeout) => {
            warn!(pid = child.id(), "abandoning output held by a detached process");
            Ok((Vec::new(), 0))
        }
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!(pgid, err = %err, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

/// Shell collaborator used by plan steps and validation.
pub trait Shell {
    /// Run `cmd` through the shell. Never fails: spawn errors and timeouts
    /// come back as a failed [`CommandResult`].
    fn run(&self, cmd: &str) -> CommandResult;
}

/// `sh -c` in a fixed working directory.
#[derive(Debug, Clone)]
pub struct SystemShell {
    cwd: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SystemShell {
    pub fn new(cwd: &Path, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            timeout,
            output_limit_bytes,
        }
    }
}

impl Shell for SystemShell {
    #[instrument(skip_all, fields(cmd = %cmd))]
    fn run(&self, cmd: &str) -> CommandResult {
        let started = Instant::now();
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd).current_dir(&self.cwd);
        let result = run_command_with_timeout(command, None, self.timeout, self.output_limit_bytes);
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(output) => {
                let mut stderr = output.stderr_text();
                let exit_code = if output.timed_out {
                    if !stderr.is_empty() && !stderr.ends_with('\n') {
                        stderr.push('\n');
                    }
                    stderr.push_str("TIMEOUT");
                    -1
                } else {
                    output.status.code().unwrap_or(-1)
                };
                CommandResult {
                    cmd: cmd.to_string(),
                    exit_code,
                    stdout: output.stdout_text(),
                    stderr,
                    duration_ms,
                }
            }
            Err(err) => {
                warn!(err = %err, "shell command could not run");
                CommandResult {
                    duration_ms,
                    ..CommandResult::failed(cmd, format!("{err:#}"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(dir: &Path, timeout: Duration) -> SystemShell {
        SystemShell::new(dir, timeout, 1_000)
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = shell(temp.path(), Duration::from_secs(10)).run("echo hello; echo oops >&2; exit 3");
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[test]
    fn runs_in_working_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "x").expect("write");
        let result = shell(temp.path(), Duration::from_secs(10)).run("ls");
        assert!(result.succeeded());
        assert!(result.stdout.contains("marker.txt"));
    }

    #[test]
    fn timeout_maps_to_failed_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = shell(temp.path(), Duration::from_millis(200)).run("sleep 5");
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.ends_with("TIMEOUT"));
    }

    #[test]
    fn timeout_kills_grandchildren_too() {
        let temp = tempfile::tempdir().expect("tempdir");
        let started = Instant::now();
        let result = shell(temp.path(), Duration::from_millis(300)).run("sleep 4; true");
        assert_eq!(result.exit_code, -1);
        assert!(result.stderr.ends_with("TIMEOUT"));
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[test]
    fn background_process_does_not_hold_the_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let started = Instant::now();
        let result = shell(temp.path(), Duration::from_secs(10)).run("sleep 4 & echo started");
        assert!(result.succeeded());
        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    }

    #[test]
    fn output_is_truncated_with_notice() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = SystemShell::new(temp.path(), Duration::from_secs(10), 4).run("printf 'abcdefgh'");
        assert!(result.stdout.starts_with("abcd"));
        assert!(result.stdout.contains("[stdout truncated 4 bytes]"));
    }

    #[test]
    fn missing_working_directory_is_a_failed_result() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = shell(&temp.path().join("nope"), Duration::from_secs(10)).run("true");
        assert_eq!(result.exit_code, -1);
        assert!(!result.stderr.is_empty());
    }
}
