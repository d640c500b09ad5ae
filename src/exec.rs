//! Process execution primitive
//!
//! Commands are plain shell strings, exactly as the user typed them on the
//! command line, and run through the platform shell. The [`Executor`] trait
//! is the seam between the daemon and the operating system; tests substitute
//! a recording fake.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};

use crate::watcher::process::ManagedProcess;

/// Runs commands on behalf of the daemon.
pub trait Executor: Send + Sync {
    /// Run a command to completion and capture its standard output. A
    /// non-zero exit status is an error.
    fn run(&self, command: &str) -> Result<String>;

    /// Like [`Executor::run`], with the working directory set first.
    fn run_in(&self, dir: &Path, command: &str) -> Result<String>;

    /// Spawn a long-running command. Must be called from within the runtime;
    /// the returned handle streams output and reports the eventual exit.
    fn spawn(&self, command: &str) -> Result<ManagedProcess>;
}

/// The real executor: `sh -c` on unix, `cmd /C` on windows.
pub struct ShellExecutor;

impl Executor for ShellExecutor {
    fn run(&self, command: &str) -> Result<String> {
        capture(shell_command(command), command)
    }

    fn run_in(&self, dir: &Path, command: &str) -> Result<String> {
        let mut cmd = shell_command(command);
        cmd.current_dir(dir);
        capture(cmd, command)
    }

    fn spawn(&self, command: &str) -> Result<ManagedProcess> {
        ManagedProcess::spawn(command)
    }
}

/// Build a shell invocation for a command string.
#[cfg(unix)]
pub(crate) fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
pub(crate) fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", command]);
    cmd
}

fn capture(mut cmd: Command, label: &str) -> Result<String> {
    let output = cmd
        .output()
        .with_context(|| format!("failed to run \"{label}\""))?;

    if !output.status.success() {
        anyhow::bail!(
            "\"{label}\" failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn captures_standard_output() {
        let output = ShellExecutor.run("echo hello").unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[test]
    #[cfg(unix)]
    fn a_non_zero_exit_is_an_error() {
        let err = ShellExecutor.run("echo boom >&2; exit 42").unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("42"), "unexpected error: {message}");
        assert!(message.contains("boom"), "unexpected error: {message}");
    }

    #[test]
    #[cfg(unix)]
    fn run_in_switches_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let output = ShellExecutor.run_in(dir.path(), "ls").unwrap();
        assert!(output.contains("marker.txt"));
    }
}
