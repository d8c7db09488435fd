#![allow(dead_code)]
#![allow(unused_imports)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use botkeeper::config::ConfigFile;
use botkeeper::fs::{FileSystem, RealFileSystem};
use botkeeper::launcher::{InterpreterLauncher, Launcher};
use botkeeper::store::{FileSnapshotStore, SnapshotStore};
use botkeeper::supervisor::Supervisor;

pub use botkeeper_test_utils::{
    CRASHING_SCRIPT, LONG_RUNNING_SCRIPT, builders, fake_launcher, init_tracing, sh_config,
    with_timeout,
};

/// Start a supervisor on the real filesystem with the `sh` launcher and a
/// snapshot file, as production would.
pub async fn start_real(cfg: ConfigFile) -> Arc<Supervisor> {
    let store = Box::new(FileSnapshotStore::new(&cfg.supervisor.snapshot_file));
    start_with(cfg, store).await
}

/// Start a supervisor with the `sh` launcher and the given store.
pub async fn start_with(cfg: ConfigFile, store: Box<dyn SnapshotStore>) -> Arc<Supervisor> {
    let launcher: Arc<dyn Launcher> = Arc::new(InterpreterLauncher::from_settings(&cfg.launcher));
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    Supervisor::start(cfg, launcher, store, fs)
        .await
        .expect("supervisor should start")
}

/// Write a script under `dir`, creating parent directories.
pub fn write_script(dir: &Path, relative: &str, body: &str) -> PathBuf {
    let path = dir.join(relative);
    RealFileSystem
        .write(&path, body.as_bytes())
        .expect("writing test script");
    path
}

/// True if a process with `pid` still exists.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}
