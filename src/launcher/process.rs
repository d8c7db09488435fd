// src/launcher/process.rs

//! A launched bot process: the child handle plus the tasks draining its pipes.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::{BotkeeperError, Result};

use super::output::{Stream, spawn_drain};

/// How long `join_drains` waits for the pipes to close once the child is gone.
///
/// A grandchild that inherited the pipes can keep them open indefinitely, so
/// the wait is bounded and stragglers are aborted.
const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything needed to start one child.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Used in logs only.
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Bounds applied by [`BotProcess::terminate`].
#[derive(Debug, Clone, Copy)]
pub struct TerminateTimeouts {
    /// Wait after the polite stop signal.
    pub grace: Duration,
    /// Wait after the forceful kill.
    pub kill: Duration,
}

/// How a termination request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The child had already exited before we signalled it.
    AlreadyExited(ExitStatus),
    /// The child exited within the grace period.
    Graceful(ExitStatus),
    /// The child ignored the stop signal and was killed.
    Killed(ExitStatus),
    /// The child did not exit even after the kill wait.
    Leaked,
}

impl TerminateOutcome {
    pub fn is_leaked(&self) -> bool {
        matches!(self, TerminateOutcome::Leaked)
    }
}

/// Handle to a running child process.
///
/// The child is spawned with `kill_on_drop(true)`, so dropping the handle
/// never leaves an unsupervised process behind.
pub struct BotProcess {
    label: String,
    pid: Option<u32>,
    child: Child,
    drains: Vec<JoinHandle<u64>>,
}

impl fmt::Debug for BotProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotProcess")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl BotProcess {
    /// Start a child with both output streams piped and drained.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            BotkeeperError::Process(format!(
                "spawning '{}' for {}: {}",
                spec.program, spec.label, e
            ))
        })?;

        let pid = child.id();
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(spawn_drain(spec.label.clone(), Stream::Stdout, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(spawn_drain(spec.label.clone(), Stream::Stderr, stderr));
        }

        info!(bot = %spec.label, pid = ?pid, program = %spec.program, "child process started");

        Ok(Self {
            label: spec.label.clone(),
            pid,
            child,
            drains,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Non-blocking exit check.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            BotkeeperError::Process(format!("checking status of {}: {}", self.label, e))
        })
    }

    /// Wait until the child exits.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|e| BotkeeperError::Process(format!("waiting for {}: {}", self.label, e)))
    }

    /// Ask the child to stop, escalating to a kill after `timeouts.grace`.
    ///
    /// Both waits are bounded; a child still alive after `timeouts.kill` is
    /// reported as [`TerminateOutcome::Leaked`].
    pub async fn terminate(&mut self, timeouts: TerminateTimeouts) -> TerminateOutcome {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(bot = %self.label, %status, "child already exited before terminate");
                return TerminateOutcome::AlreadyExited(status);
            }
            Ok(None) => {}
            Err(e) => warn!(bot = %self.label, error = %e, "try_wait failed before terminate"),
        }

        if self.send_stop_signal() {
            match timeout(timeouts.grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    info!(bot = %self.label, pid = ?self.pid, %status, "child stopped");
                    return TerminateOutcome::Graceful(status);
                }
                Ok(Err(e)) => {
                    warn!(bot = %self.label, error = %e, "waiting for child after stop signal failed");
                }
                Err(_) => {
                    warn!(
                        bot = %self.label,
                        pid = ?self.pid,
                        grace = ?timeouts.grace,
                        "child ignored stop signal; killing"
                    );
                }
            }
        }

        if let Err(e) = self.child.start_kill() {
            warn!(bot = %self.label, error = %e, "failed to send kill to child");
        }

        match timeout(timeouts.kill, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(bot = %self.label, pid = ?self.pid, %status, "child killed");
                TerminateOutcome::Killed(status)
            }
            Ok(Err(e)) => {
                warn!(bot = %self.label, error = %e, "waiting for child after kill failed");
                TerminateOutcome::Leaked
            }
            Err(_) => TerminateOutcome::Leaked,
        }
    }

    /// Wait (bounded) for the output drains to finish, aborting stragglers.
    ///
    /// Call once the child has exited.
    pub async fn join_drains(&mut self) {
        for mut handle in self.drains.drain(..) {
            match timeout(DRAIN_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(_lines)) => {}
                Ok(Err(e)) => debug!(bot = %self.label, error = %e, "drain task ended abnormally"),
                Err(_) => {
                    debug!(bot = %self.label, "output pipe still open after exit; aborting drain");
                    handle.abort();
                }
            }
        }
    }

    #[cfg(unix)]
    fn send_stop_signal(&mut self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return false;
        };
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                warn!(bot = %self.label, pid, error = %e, "failed to send SIGTERM");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn send_stop_signal(&mut self) -> bool {
        // No polite stop signal here; go straight to the kill.
        false
    }
}
