// src/supervisor/monitor.rs

//! Crash detection and the optional backoff restart policy.
//!
//! A periodic task calls [`Supervisor::check_children`], which polls every
//! running child without blocking. A child found dead is marked `Crashed`
//! and its handle is joined, so the registry never points at a dead
//! process. With `restart_policy = "backoff"` crashed records are relaunched
//! after `backoff_initial * 2^attempts` (capped at `backoff_max`), at most
//! `max_restarts` times in a row. A bot that then stays up for `backoff_max`
//! gets its attempt counter back.
//!
//! The same tick retries the snapshot save while the registry is ahead of
//! disk.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::MonitorSettings;
use crate::errors::BotkeeperError;
use crate::launcher::BotProcess;
use crate::registry::BotRecord;
use crate::types::{BotStatus, RestartPolicy};

use super::Supervisor;

/// What one monitor pass observed and did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorReport {
    pub crashed: usize,
    pub restarted: usize,
    /// Records that reached `max_restarts` on this pass.
    pub gave_up: usize,
}

impl MonitorReport {
    fn changed(&self) -> bool {
        self.crashed + self.restarted + self.gave_up > 0
    }
}

/// Delay before automatic restart attempt number `attempts + 1`.
pub fn backoff_delay(settings: &MonitorSettings, attempts: u32) -> Duration {
    let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
    settings
        .backoff_initial
        .checked_mul(factor)
        .unwrap_or(settings.backoff_max)
        .min(settings.backoff_max)
}

impl Supervisor {
    /// One monitoring pass. Does nothing once the supervisor is shut down.
    pub async fn check_children(&self) -> MonitorReport {
        let mut report = MonitorReport::default();
        let mut state = self.state.lock().await;
        if state.shut_down {
            return report;
        }

        let policy = self.config.supervisor.restart_policy;
        let settings = &self.config.monitor;
        let now = Instant::now();
        let mut dead: Vec<BotProcess> = Vec::new();

        for record in state.registry.list_mut() {
            match record.status() {
                BotStatus::Running => {
                    if let Some(process) = reap_if_exited(record) {
                        dead.push(process);
                        report.crashed += 1;
                        if policy == RestartPolicy::Backoff
                            && !schedule_restart(record, settings, now)
                        {
                            report.gave_up += 1;
                        }
                    } else {
                        forgive_if_stable(record, settings, now);
                    }
                }
                BotStatus::Crashed if policy == RestartPolicy::Backoff => {
                    match record.restart.next_attempt_at {
                        Some(at) if at <= now => {
                            self.attempt_restart(record, settings, now, &mut report);
                        }
                        Some(_) => {}
                        // Crashed outside the monitor (recovery or a failed
                        // restart) and not yet given up on.
                        None if record.restart.attempts < settings.max_restarts => {
                            schedule_restart(record, settings, now);
                        }
                        None => {}
                    }
                }
                _ => {}
            }
        }

        for mut process in dead {
            process.join_drains().await;
        }

        if state.dirty {
            debug!("retrying snapshot save");
            state.persist();
        }
        if report.changed() {
            self.publish(&state);
        }
        report
    }

    fn attempt_restart(
        &self,
        record: &mut BotRecord,
        settings: &MonitorSettings,
        now: Instant,
        report: &mut MonitorReport,
    ) {
        record.restart.attempts += 1;
        let attempt = record.restart.attempts;

        let launched = if self.fs.is_file(&record.file) {
            self.launcher.launch(&record.file, &record.name)
        } else {
            Err(BotkeeperError::Process(format!(
                "backing file {:?} is gone",
                record.file
            )))
        };

        match launched {
            Ok(process) => {
                info!(bot = record.id, attempt, pid = ?process.pid(), "crashed bot restarted");
                record.mark_running(process);
                report.restarted += 1;
            }
            Err(e) => {
                warn!(bot = record.id, attempt, error = %e, "automatic restart failed");
                if !schedule_restart(record, settings, now) {
                    report.gave_up += 1;
                }
            }
        }
    }

    /// Run [`Self::check_children`] every `[monitor].interval` until
    /// `shutdown` becomes true.
    pub fn spawn_monitor(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        let period = supervisor.config.monitor.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?period, "crash monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = supervisor.check_children().await;
                        if report.changed() {
                            debug!(?report, "monitor pass");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("crash monitor stopped");
        })
    }
}

/// Mark a running record crashed if its child has exited. Returns the dead
/// handle.
fn reap_if_exited(record: &mut BotRecord) -> Option<BotProcess> {
    let process = record.process_mut()?;
    match process.try_wait() {
        Ok(Some(status)) => {
            warn!(bot = record.id, name = %record.name, %status, "bot exited on its own");
            record.mark_crashed()
        }
        Ok(None) => None,
        Err(e) => {
            error!(bot = record.id, error = %e, "cannot poll child; treating it as crashed");
            record.mark_crashed()
        }
    }
}

/// Schedule the next attempt, or return false if the budget is spent.
fn schedule_restart(record: &mut BotRecord, settings: &MonitorSettings, now: Instant) -> bool {
    if record.restart.attempts >= settings.max_restarts {
        error!(
            bot = record.id,
            attempts = record.restart.attempts,
            "giving up on automatic restarts"
        );
        record.restart.next_attempt_at = None;
        return false;
    }
    let delay = backoff_delay(settings, record.restart.attempts);
    record.restart.next_attempt_at = Some(now + delay);
    debug!(bot = record.id, ?delay, "automatic restart scheduled");
    true
}

fn forgive_if_stable(record: &mut BotRecord, settings: &MonitorSettings, now: Instant) {
    if record.restart.attempts == 0 {
        return;
    }
    let stable = record
        .restart
        .last_started_at
        .is_some_and(|at| now.saturating_duration_since(at) >= settings.backoff_max);
    if stable {
        debug!(bot = record.id, "bot stable again; resetting restart attempts");
        record.restart.attempts = 0;
    }
}
