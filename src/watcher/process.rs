//! Long-running process lifecycle
//!
//! The daemon keeps exactly one long-running command alive. Children are
//! spawned into their own process group so that a restart can take down the
//! whole tree the command built (shells spawning build tools spawning
//! servers), not just the top-level handle.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::exec::{shell_command, Executor};

/// One spawned long-running command.
///
/// The child itself is owned by a monitor task that reaps it and logs its
/// exit status; this handle keeps the pid for signalling and the monitor
/// handle for awaiting termination.
pub struct ManagedProcess {
    pid: u32,
    monitor: JoinHandle<()>,
}

impl ManagedProcess {
    /// Spawn a command, streaming its output to the log sink line by line.
    pub fn spawn(command: &str) -> Result<Self> {
        let mut cmd = Command::from(shell_command(command));
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn \"{command}\""))?;
        let pid = child
            .id()
            .with_context(|| format!("\"{command}\" exited before it could be tracked"))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!("{line}");
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    error!("❌ {line}");
                }
            });
        }

        let label = command.to_string();
        let monitor = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("✔ the process for \"{label}\" has completed with {status}"),
                Err(err) => error!("❌ lost track of the process for \"{label}\": {err}"),
            }
        });

        Ok(Self { pid, monitor })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Terminate the process and all of its descendants, then wait until the
    /// child has been reaped. Signalling an already-exited process is a
    /// no-op.
    pub async fn terminate_tree(self) {
        signal_tree(self.pid);
        let _ = self.monitor.await;
    }
}

#[cfg(unix)]
fn signal_tree(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => tracing::debug!("process group {pid} is already gone"),
        Err(err) => warn!("⏳ could not signal process group {pid}: {err}"),
    }
}

#[cfg(windows)]
fn signal_tree(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .status();
    if let Err(err) = result {
        warn!("⏳ could not terminate process tree {pid}: {err}");
    }
}

/// Owns the zero-or-one current long-running process.
pub struct ProcessController {
    executor: Arc<dyn Executor>,
    restarting: AtomicBool,
    current: Mutex<Option<ManagedProcess>>,
}

impl ProcessController {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            restarting: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    /// Kill the current process tree, if any, and start `command` in its
    /// place. Restart requests are not queued: a request arriving while
    /// another is in flight is dropped with a warning.
    pub async fn restart(&self, command: &str) {
        if self.restarting.swap(true, Ordering::SeqCst) {
            warn!("⏳ \"{command}\" is already being restarted, dropping this request");
            return;
        }
        let _transition = TransitionGuard(&self.restarting);

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            info!("❌ killing the existing process (pid {})", previous.pid());
            previous.terminate_tree().await;
            info!("✔ killed the existing process");
        }

        info!("⏳ executing \"{command}\", please wait...");
        match self.executor.spawn(command) {
            Ok(process) => *current = Some(process),
            Err(err) => error!("❌ failed to start \"{command}\": {err:#}"),
        }
    }

    /// Terminate the current process tree, if any.
    pub async fn shutdown(&self) {
        if let Some(process) = self.current.lock().await.take() {
            info!("❌ stopping the running process (pid {})", process.pid());
            process.terminate_tree().await;
        }
    }

    /// Pid of the current process, if one is running.
    pub async fn current_pid(&self) -> Option<u32> {
        self.current.lock().await.as_ref().map(ManagedProcess::pid)
    }
}

/// Clears the in-transition flag however `restart` exits.
struct TransitionGuard<'a>(&'a AtomicBool);

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
