// src/supervisor/control.rs

//! Owner-initiated stop/restart and supervisor-wide shutdown.

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::errors::{BotkeeperError, Result};
use crate::fs::remove_file_if_exists;
use crate::launcher::{BotProcess, TerminateOutcome, TerminateTimeouts};
use crate::registry::{BotRecord, RestartState};
use crate::types::{BotId, OwnerId};

use super::{Supervisor, authorize};

/// Result of [`Supervisor::shutdown`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Children confirmed gone (exited, stopped or killed).
    pub terminated: usize,
    /// Children still alive after the kill wait.
    pub leaked: usize,
    /// Whether the final snapshot reached disk.
    pub snapshot_saved: bool,
}

impl Supervisor {
    /// Terminate the bot, delete its record and its backing file.
    ///
    /// Only the owner may stop a bot. If the child survives the kill wait the
    /// record is left untouched and a `Process` error is returned.
    pub async fn stop(&self, id: BotId, caller: OwnerId) -> Result<()> {
        let timeouts = self.terminate_timeouts();
        let mut state = self.lock_for_write().await?;

        let record = state
            .registry
            .get_mut(id)
            .ok_or(BotkeeperError::NotFound(id))?;
        authorize(record, caller)?;
        terminate_record(record, timeouts).await?;

        let Some(mut record) = state.registry.remove(id) else {
            return Err(BotkeeperError::NotFound(id));
        };
        if let Some(mut process) = record.mark_stopped() {
            process.join_drains().await;
        }

        if let Err(e) = remove_file_if_exists(self.fs.as_ref(), &record.file) {
            warn!(bot = id, file = ?record.file, error = %e, "failed to remove backing file");
        }

        info!(bot = id, owner = caller, name = %record.name, "bot stopped and removed");

        state.persist();
        self.publish(&state);
        Ok(())
    }

    /// Terminate the bot and start it again from the same backing file.
    ///
    /// Id, owner, name and file are preserved. Works on crashed records too,
    /// and resets the crash-restart counter. If the relaunch fails the record
    /// stays registered as `Crashed`.
    pub async fn restart(&self, id: BotId, caller: OwnerId) -> Result<()> {
        let timeouts = self.terminate_timeouts();
        let mut state = self.lock_for_write().await?;

        let record = state
            .registry
            .get_mut(id)
            .ok_or(BotkeeperError::NotFound(id))?;
        authorize(record, caller)?;
        terminate_record(record, timeouts).await?;

        if let Some(mut old) = record.mark_stopped() {
            old.join_drains().await;
        }
        record.restart = RestartState::default();

        let relaunched = if self.fs.is_file(&record.file) {
            self.launcher.launch(&record.file, &record.name)
        } else {
            Err(BotkeeperError::Process(format!(
                "backing file {:?} of bot {id} no longer exists",
                record.file
            )))
        };

        let outcome = match relaunched {
            Ok(process) => {
                info!(bot = id, owner = caller, pid = ?process.pid(), "bot restarted");
                record.mark_running(process);
                Ok(())
            }
            Err(e) => {
                error!(bot = id, error = %e, "restart failed; bot is now crashed");
                record.mark_crashed();
                Err(e)
            }
        };

        self.publish(&state);
        outcome
    }

    /// Terminate every tracked child and save a final snapshot.
    ///
    /// Children are terminated concurrently, each with the configured
    /// stop/kill bounds. Records stay in the snapshot so the next start
    /// recovers them. After this call every mutating operation fails with
    /// `ShutDown`; calling it again is a no-op.
    pub async fn shutdown(&self) -> ShutdownReport {
        let timeouts = self.terminate_timeouts();
        let mut state = self.state.lock().await;
        if state.shut_down {
            return ShutdownReport {
                snapshot_saved: !state.dirty,
                ..ShutdownReport::default()
            };
        }
        state.shut_down = true;

        let processes: Vec<(BotId, BotProcess)> = state
            .registry
            .list_mut()
            .filter_map(|rec| rec.mark_stopped().map(|p| (rec.id, p)))
            .collect();

        info!(children = processes.len(), "shutting down");

        let mut tasks = JoinSet::new();
        for (id, mut process) in processes {
            tasks.spawn(async move {
                let outcome = process.terminate(timeouts).await;
                if outcome.is_leaked() {
                    error!(bot = id, pid = ?process.pid(), "leaked child: still running after kill");
                } else {
                    process.join_drains().await;
                }
                outcome
            });
        }

        let mut report = ShutdownReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(TerminateOutcome::Leaked) => report.leaked += 1,
                Ok(_) => report.terminated += 1,
                Err(e) => {
                    error!(error = %e, "termination task failed");
                    report.leaked += 1;
                }
            }
        }

        state.persist();
        self.publish(&state);
        report.snapshot_saved = !state.dirty;

        info!(
            terminated = report.terminated,
            leaked = report.leaked,
            snapshot_saved = report.snapshot_saved,
            "shutdown complete"
        );
        report
    }
}

/// Terminate the record's child, if any. On a leak the record keeps its
/// handle and status.
async fn terminate_record(record: &mut BotRecord, timeouts: TerminateTimeouts) -> Result<()> {
    let id = record.id;
    let Some(process) = record.process_mut() else {
        return Ok(());
    };
    let outcome = process.terminate(timeouts).await;
    if outcome.is_leaked() {
        error!(bot = id, pid = ?process.pid(), "leaked child: still running after kill");
        return Err(BotkeeperError::Process(format!(
            "bot {id} did not exit after stop and kill"
        )));
    }
    Ok(())
}
