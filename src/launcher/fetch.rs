// src/launcher/fetch.rs

//! Bounded one-shot commands (e.g. `git clone`) run on behalf of a deploy.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::errors::{BotkeeperError, Result};

/// Run `program args..` to completion, failing if it exits non-zero or does
/// not finish within `limit`.
///
/// Output is captured (and so drained) and the tail of stderr is included in
/// the error. The child is killed if the timeout fires.
pub async fn run_bounded(
    program: &str,
    args: &[&str],
    working_dir: Option<&Path>,
    limit: Duration,
) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    debug!(program, ?args, ?limit, "running bounded command");

    let output = match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(BotkeeperError::Process(format!("spawning '{program}': {e}")));
        }
        Err(_) => {
            return Err(BotkeeperError::Process(format!(
                "'{program}' did not finish within {limit:?}"
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.trim().lines().rev().take(3).collect::<Vec<_>>().join(" | ");
        return Err(BotkeeperError::Process(format!(
            "'{program}' exited with {}: {tail}",
            output.status
        )));
    }

    info!(program, "bounded command finished");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_and_failure() {
        run_bounded("sh", &["-c", "echo ok"], None, Duration::from_secs(5))
            .await
            .unwrap();

        match run_bounded("sh", &["-c", "echo boom >&2; exit 2"], None, Duration::from_secs(5)).await {
            Err(BotkeeperError::Process(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected Process error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hanging_command_times_out() {
        let started = std::time::Instant::now();
        let res = run_bounded("sleep", &["30"], None, Duration::from_millis(300)).await;
        assert!(matches!(res, Err(BotkeeperError::Process(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
