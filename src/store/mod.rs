// src/store/mod.rs

//! Persistence of the registry snapshot.
//!
//! - [`FileSnapshotStore`] writes JSON to disk with a temp-file + rename, so a
//!   crash mid-write leaves the previous snapshot intact.
//! - [`MemorySnapshotStore`] keeps the snapshot in memory (tests, ephemeral
//!   runs).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::errors::{BotkeeperError, Result};

pub mod snapshot;

pub use snapshot::{PersistedBot, PersistedSnapshot};

/// Abstract storage for the registry snapshot.
pub trait SnapshotStore: Send {
    /// Last durable snapshot, or `None` if there is none.
    ///
    /// Unreadable or unparsable snapshots are logged and treated as "no prior
    /// state".
    fn load(&self) -> Option<PersistedSnapshot>;

    /// Durably replace the stored snapshot.
    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<()>;
}

/// Stores the snapshot as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Option<PersistedSnapshot> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no snapshot file yet");
                return None;
            }
            Err(e) => {
                error!(path = ?self.path, error = %e, "failed to read snapshot; starting empty");
                return None;
            }
        };

        match serde_json::from_str::<PersistedSnapshot>(&contents) {
            Ok(snapshot) => {
                info!(
                    path = ?self.path,
                    next_id = snapshot.next_id,
                    bots = snapshot.bots.len(),
                    "loaded snapshot"
                );
                Some(snapshot)
            }
            Err(e) => {
                error!(path = ?self.path, error = %e, "failed to parse snapshot; starting empty");
                None
            }
        }
    }

    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<()> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        atomic_write(&self.path, &data)?;
        debug!(path = ?self.path, bots = snapshot.bots.len(), "saved snapshot");
        Ok(())
    }
}

/// Write `data` to a temp file next to `target`, fsync it, then rename it over
/// `target`.
fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .map_err(|e| BotkeeperError::io(format!("creating snapshot dir {:?}", parent), e))?;

    let mut temp = tempfile::NamedTempFile::new_in(&parent)
        .map_err(|e| BotkeeperError::io(format!("creating temp file in {:?}", parent), e))?;

    temp.write_all(data)
        .map_err(|e| BotkeeperError::io(format!("writing temp file for {:?}", target), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| BotkeeperError::io(format!("syncing temp file for {:?}", target), e))?;

    temp.persist(target).map_err(|e| {
        BotkeeperError::io(format!("renaming temp file to {:?}", target), e.error)
    })?;

    sync_dir(&parent);
    Ok(())
}

/// Best-effort fsync of the directory so the rename itself is durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    match fs::File::open(dir) {
        Ok(handle) => {
            if let Err(e) = handle.sync_all() {
                warn!(dir = ?dir, error = %e, "failed to sync snapshot directory");
            }
        }
        Err(e) => warn!(dir = ?dir, error = %e, "failed to open snapshot directory for sync"),
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: Option<PersistedSnapshot>,
    saves: usize,
    fail_saves: bool,
}

/// Stores the snapshot in memory only.
///
/// Clones share state, so a test can keep one clone to inspect what the
/// supervisor saved, or hand it to a second supervisor to simulate a restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        let store = Self::new();
        store.lock().snapshot = Some(snapshot);
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The snapshot currently stored, if any.
    pub fn current(&self) -> Option<PersistedSnapshot> {
        self.lock().snapshot.clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// Make subsequent saves fail with an IO error (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Option<PersistedSnapshot> {
        self.current()
    }

    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<()> {
        let mut state = self.lock();
        if state.fail_saves {
            return Err(BotkeeperError::io(
                "saving snapshot (memory)",
                std::io::Error::other("simulated save failure"),
            ));
        }
        state.snapshot = Some(snapshot.clone());
        state.saves += 1;
        Ok(())
    }
}
