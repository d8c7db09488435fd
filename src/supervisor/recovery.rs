// src/supervisor/recovery.rs

//! Startup recovery: snapshot + file check -> registry.

use tracing::{error, info, warn};

use crate::fs::FileSystem;
use crate::launcher::Launcher;
use crate::registry::Registry;
use crate::store::PersistedSnapshot;

/// Outcome of rebuilding the registry at startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records relaunched and now `Running`.
    pub restored: usize,
    /// Records whose file exists but whose relaunch failed; kept as `Crashed`.
    pub failed: usize,
    /// Records dropped because the backing file is gone (or claimed twice).
    pub skipped: usize,
}

/// Relaunch every stored record whose backing file still exists.
///
/// The id counter is restored from the snapshot, so ids handed out after a
/// restart never collide with historical ones. Missing files are logged and
/// their records left out of the registry. Never fails: a bad snapshot simply
/// yields fewer records.
pub(crate) fn rebuild_registry(
    snapshot: Option<PersistedSnapshot>,
    launcher: &dyn Launcher,
    fs: &dyn FileSystem,
) -> (Registry, RecoveryReport) {
    let Some(snapshot) = snapshot else {
        info!("no prior state; starting with an empty registry");
        return (Registry::new(), RecoveryReport::default());
    };

    let mut registry = Registry::with_next_id(snapshot.next_id);
    let mut report = RecoveryReport::default();

    for (id, bot) in snapshot.entries() {
        if !fs.is_file(&bot.file) {
            warn!(
                bot = id,
                owner = bot.user_id,
                file = ?bot.file,
                "backing file missing; bot is irrecoverable"
            );
            report.skipped += 1;
            continue;
        }

        if registry.contains_file(&bot.file) {
            warn!(
                bot = id,
                file = ?bot.file,
                "backing file already claimed by another recovered bot; skipping"
            );
            report.skipped += 1;
            continue;
        }

        match launcher.launch(&bot.file, &bot.name) {
            Ok(process) => {
                info!(bot = id, owner = bot.user_id, name = %bot.name, pid = ?process.pid(), "recovered bot");
                registry.insert_recovered(id, bot.user_id, bot.name.clone(), bot.file.clone(), Some(process));
                report.restored += 1;
            }
            Err(e) => {
                error!(bot = id, file = ?bot.file, error = %e, "failed to relaunch recovered bot; keeping it as crashed");
                registry.insert_recovered(id, bot.user_id, bot.name.clone(), bot.file.clone(), None);
                report.failed += 1;
            }
        }
    }

    if registry.next_id() != snapshot.next_id {
        warn!(
            stored = snapshot.next_id,
            effective = registry.next_id(),
            "snapshot next_id was behind its records; raised it"
        );
    }

    info!(
        restored = report.restored,
        failed = report.failed,
        skipped = report.skipped,
        next_id = registry.next_id(),
        "recovery complete"
    );

    (registry, report)
}
