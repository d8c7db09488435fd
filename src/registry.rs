// src/registry.rs

//! In-memory table of bot records keyed by id.
//!
//! The registry performs no locking. The supervisor owns it behind its
//! single-writer mutex and is the only thing that mutates it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::errors::{BotkeeperError, Result};
use crate::launcher::BotProcess;
use crate::types::{BotId, BotStatus, BotSummary, OwnerId};

/// First id handed out by an empty registry.
pub const FIRST_BOT_ID: BotId = 1;

/// Crash-restart bookkeeping used by the monitor's backoff policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestartState {
    /// Automatic restart attempts since the last explicit start.
    pub attempts: u32,
    /// When the next automatic attempt is due, if one is scheduled.
    pub next_attempt_at: Option<Instant>,
    /// When the current process was started.
    pub last_started_at: Option<Instant>,
}

impl RestartState {
    fn started_now() -> Self {
        Self {
            last_started_at: Some(Instant::now()),
            ..Self::default()
        }
    }
}

/// Metadata plus runtime handle for one deployed program.
///
/// `id`, `owner`, `name` and `file` never change after creation. The process
/// handle is present exactly when the status is `Running`; the private fields
/// are only changed through the transition methods below.
#[derive(Debug)]
pub struct BotRecord {
    pub id: BotId,
    pub owner: OwnerId,
    pub name: String,
    pub file: PathBuf,
    status: BotStatus,
    process: Option<BotProcess>,
    pub restart: RestartState,
}

impl BotRecord {
    pub fn status(&self) -> BotStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == BotStatus::Running
    }

    pub fn process(&self) -> Option<&BotProcess> {
        self.process.as_ref()
    }

    pub fn process_mut(&mut self) -> Option<&mut BotProcess> {
        self.process.as_mut()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(BotProcess::pid)
    }

    /// Install a freshly spawned process, replacing nothing else.
    pub fn mark_running(&mut self, process: BotProcess) {
        self.process = Some(process);
        self.status = BotStatus::Running;
        self.restart.next_attempt_at = None;
        self.restart.last_started_at = Some(Instant::now());
    }

    /// The child exited on its own. Returns the dead handle for cleanup.
    pub fn mark_crashed(&mut self) -> Option<BotProcess> {
        self.status = BotStatus::Crashed;
        self.process.take()
    }

    /// The child was terminated on purpose. Returns the handle for cleanup.
    pub fn mark_stopped(&mut self) -> Option<BotProcess> {
        self.status = BotStatus::Stopped;
        self.process.take()
    }

    pub fn summary(&self) -> BotSummary {
        BotSummary {
            id: self.id,
            name: self.name.clone(),
            owner: self.owner,
            status: self.status,
        }
    }
}

/// Mapping id -> record plus the monotonic id counter.
#[derive(Debug)]
pub struct Registry {
    next_id: BotId,
    records: BTreeMap<BotId, BotRecord>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_next_id(FIRST_BOT_ID)
    }

    /// Empty registry whose counter resumes at `next_id` (used by recovery).
    pub fn with_next_id(next_id: BotId) -> Self {
        Self {
            next_id: next_id.max(FIRST_BOT_ID),
            records: BTreeMap::new(),
        }
    }

    /// The id the next `insert` will assign.
    pub fn next_id(&self) -> BotId {
        self.next_id
    }

    /// The id the next `insert` will assign, or an error once the id space
    /// is used up. Check this before launching anything.
    pub fn allocatable_id(&self) -> Result<BotId> {
        if self.next_id == BotId::MAX {
            return Err(BotkeeperError::Validation(
                "bot id space exhausted".to_string(),
            ));
        }
        Ok(self.next_id)
    }

    /// Assign the next id to a new `Running` record and return it.
    pub fn insert(
        &mut self,
        owner: OwnerId,
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        process: BotProcess,
    ) -> Result<BotId> {
        let id = self.allocate_id()?;
        self.records.insert(
            id,
            BotRecord {
                id,
                owner,
                name: name.into(),
                file: file.into(),
                status: BotStatus::Running,
                process: Some(process),
                restart: RestartState::started_now(),
            },
        );
        Ok(id)
    }

    /// Re-insert a record under its historical id.
    ///
    /// With `process = None` the record is stored as `Crashed`. The counter is
    /// raised past `id` if needed so the id can never be handed out again.
    pub fn insert_recovered(
        &mut self,
        id: BotId,
        owner: OwnerId,
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        process: Option<BotProcess>,
    ) {
        let (status, restart) = if process.is_some() {
            (BotStatus::Running, RestartState::started_now())
        } else {
            (BotStatus::Crashed, RestartState::default())
        };
        self.records.insert(
            id,
            BotRecord {
                id,
                owner,
                name: name.into(),
                file: file.into(),
                status,
                process,
                restart,
            },
        );
        // A stored id of BotId::MAX pins the counter there, which
        // `allocatable_id` then refuses.
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
    }

    fn allocate_id(&mut self) -> Result<BotId> {
        let id = self.allocatable_id()?;
        self.next_id = id + 1;
        Ok(id)
    }

    pub fn get(&self, id: BotId) -> Option<&BotRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: BotId) -> Option<&mut BotRecord> {
        self.records.get_mut(&id)
    }

    pub fn remove(&mut self, id: BotId) -> Option<BotRecord> {
        self.records.remove(&id)
    }

    /// Records in ascending id order.
    pub fn list(&self) -> impl Iterator<Item = &BotRecord> {
        self.records.values()
    }

    pub fn list_mut(&mut self) -> impl Iterator<Item = &mut BotRecord> {
        self.records.values_mut()
    }

    pub fn ids(&self) -> Vec<BotId> {
        self.records.keys().copied().collect()
    }

    pub fn summaries(&self) -> Vec<BotSummary> {
        self.records.values().map(BotRecord::summary).collect()
    }

    /// True if some record is already backed by `file`.
    pub fn contains_file(&self, file: &Path) -> bool {
        self.records.values().any(|r| r.file == file)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
