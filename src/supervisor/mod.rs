// src/supervisor/mod.rs

//! The supervisor: the only way in to the registry and the snapshot store.
//!
//! All mutations (`deploy`, `deploy_from_directory`, `stop`, `restart`,
//! `shutdown`, and the monitor's crash handling) run under one async mutex,
//! because the id counter and the snapshot file are shared mutable state.
//! Readers never take that mutex: after every mutation the supervisor
//! publishes an immutable listing through a `watch` channel, and `list` /
//! `get` read the latest published value.
//!
//! - [`recovery`] rebuilds the registry from the snapshot at startup.
//! - [`deploy`] writes and launches new bots.
//! - [`control`] stops, restarts and shuts down.
//! - [`monitor`] detects children that exited on their own.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{error, info};

use crate::config::ConfigFile;
use crate::errors::{BotkeeperError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::launcher::{InterpreterLauncher, Launcher, TerminateTimeouts};
use crate::registry::{BotRecord, Registry};
use crate::store::{FileSnapshotStore, PersistedSnapshot, SnapshotStore};
use crate::types::{BotId, BotStatus, BotSummary, OwnerId};

pub mod control;
pub mod deploy;
pub mod monitor;
pub mod recovery;

pub use control::ShutdownReport;
pub use monitor::MonitorReport;
pub use recovery::RecoveryReport;

/// Full read-only view of one record, including its backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotDetails {
    pub id: BotId,
    pub owner: OwnerId,
    pub name: String,
    pub file: PathBuf,
    pub status: BotStatus,
    pub pid: Option<u32>,
}

impl From<&BotRecord> for BotDetails {
    fn from(rec: &BotRecord) -> Self {
        Self {
            id: rec.id,
            owner: rec.owner,
            name: rec.name.clone(),
            file: rec.file.clone(),
            status: rec.status(),
            pid: rec.pid(),
        }
    }
}

/// State guarded by the single-writer mutex.
struct State {
    registry: Registry,
    store: Box<dyn SnapshotStore>,
    /// The last snapshot save failed; memory is ahead of disk.
    dirty: bool,
    shut_down: bool,
}

impl State {
    /// Save the registry. Failures are logged and leave the state dirty; the
    /// monitor retries dirty saves on every tick.
    fn persist(&mut self) {
        let snapshot = PersistedSnapshot::from_registry(&self.registry);
        match self.store.save(&snapshot) {
            Ok(()) => {
                if self.dirty {
                    info!(bots = snapshot.bots.len(), "snapshot back in sync with registry");
                }
                self.dirty = false;
            }
            Err(e) => {
                error!(
                    error = %e,
                    "failed to persist snapshot; registry and disk diverge until the next successful save"
                );
                self.dirty = true;
            }
        }
    }
}

/// Coordinates launching, stopping, restarting, listing and shutdown.
pub struct Supervisor {
    config: ConfigFile,
    launcher: Arc<dyn Launcher>,
    fs: Arc<dyn FileSystem>,
    state: Mutex<State>,
    listing: watch::Sender<Arc<Vec<BotSummary>>>,
    /// `repo_*` directories currently being cloned.
    fetching: std::sync::Mutex<HashSet<PathBuf>>,
    recovery: RecoveryReport,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("work_dir", &self.config.supervisor.work_dir)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Build a supervisor with the production launcher, snapshot file and
    /// filesystem described by `config`.
    pub async fn from_config(config: ConfigFile) -> Result<Arc<Self>> {
        let launcher = Arc::new(InterpreterLauncher::from_settings(&config.launcher));
        let store = Box::new(FileSnapshotStore::new(&config.supervisor.snapshot_file));
        Self::start(config, launcher, store, Arc::new(RealFileSystem)).await
    }

    /// Create the work directory, run recovery from `store`, and return the
    /// ready supervisor.
    ///
    /// Failing to create the work directory is the only fatal error here; a
    /// missing or unreadable snapshot just means "no prior state".
    pub async fn start(
        config: ConfigFile,
        launcher: Arc<dyn Launcher>,
        store: Box<dyn SnapshotStore>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Arc<Self>> {
        fs.create_dir_all(&config.supervisor.work_dir)?;

        let snapshot = store.load();
        let (registry, recovery) =
            recovery::rebuild_registry(snapshot, launcher.as_ref(), fs.as_ref());

        let mut state = State {
            registry,
            store,
            dirty: false,
            shut_down: false,
        };
        if recovery.skipped > 0 && config.supervisor.prune_missing_on_recovery {
            info!(skipped = recovery.skipped, "pruning unrecoverable records from snapshot");
            state.persist();
        }

        let (listing, _) = watch::channel(Arc::new(state.registry.summaries()));

        Ok(Arc::new(Self {
            config,
            launcher,
            fs,
            state: Mutex::new(state),
            listing,
            fetching: std::sync::Mutex::new(HashSet::new()),
            recovery,
        }))
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// What recovery did at startup.
    pub fn recovery_report(&self) -> RecoveryReport {
        self.recovery
    }

    /// Point-in-time list of every record, ascending by id.
    ///
    /// Visible to any caller regardless of ownership.
    pub fn list(&self) -> Vec<BotSummary> {
        self.listing.borrow().as_ref().clone()
    }

    /// Point-in-time view of one record.
    pub fn get(&self, id: BotId) -> Option<BotSummary> {
        self.listing.borrow().iter().find(|s| s.id == id).cloned()
    }

    /// Detailed view of one record, including file and pid.
    ///
    /// Unlike [`Self::list`] this waits for any in-flight mutation.
    pub async fn describe(&self, id: BotId) -> Option<BotDetails> {
        let state = self.state.lock().await;
        state.registry.get(id).map(BotDetails::from)
    }

    /// The id the next deployment will receive.
    pub async fn next_id(&self) -> BotId {
        self.state.lock().await.registry.next_id()
    }

    /// True while the on-disk snapshot lags behind the registry.
    pub async fn snapshot_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    /// Subscribe to listing updates (a new value after every mutation).
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<BotSummary>>> {
        self.listing.subscribe()
    }

    async fn lock_for_write(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state.lock().await;
        if state.shut_down {
            return Err(BotkeeperError::ShutDown);
        }
        Ok(state)
    }

    fn publish(&self, state: &State) {
        self.listing.send_replace(Arc::new(state.registry.summaries()));
    }

    fn terminate_timeouts(&self) -> TerminateTimeouts {
        TerminateTimeouts::from(&self.config.launcher)
    }
}

/// Only the owner may stop or restart a record.
fn authorize(record: &BotRecord, caller: OwnerId) -> Result<()> {
    if record.owner != caller {
        return Err(BotkeeperError::Permission {
            id: record.id,
            caller,
        });
    }
    Ok(())
}
