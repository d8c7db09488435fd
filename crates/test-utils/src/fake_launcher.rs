use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use botkeeper::errors::{BotkeeperError, Result};
use botkeeper::launcher::{BotProcess, LaunchSpec, Launcher};

/// A launcher that:
/// - records which files it was asked to start
/// - starts `sh -c "exec sleep 30"` for each, whatever the file contains.
///
/// Useful with `MockFileSystem`, where the backing files only exist in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launched: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files launched so far, in call order.
    pub fn launched(&self) -> Vec<PathBuf> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, file: &Path, label: &str) -> Result<BotProcess> {
        self.launched.lock().unwrap().push(file.to_path_buf());
        BotProcess::spawn(&LaunchSpec {
            label: label.to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exec sleep 30".to_string()],
            working_dir: None,
        })
    }
}

/// A launcher that refuses to start anything.
///
/// Optionally only fails for files whose name contains `needle`, delegating
/// the rest to a `RecordingLauncher`.
#[derive(Debug, Clone, Default)]
pub struct FailingLauncher {
    needle: Option<String>,
    inner: RecordingLauncher,
}

impl FailingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only_for(needle: &str) -> Self {
        Self {
            needle: Some(needle.to_string()),
            inner: RecordingLauncher::new(),
        }
    }
}

impl Launcher for FailingLauncher {
    fn launch(&self, file: &Path, label: &str) -> Result<BotProcess> {
        let fails = match &self.needle {
            None => true,
            Some(n) => file.to_string_lossy().contains(n.as_str()),
        };
        if fails {
            return Err(BotkeeperError::Process(format!(
                "refusing to launch {label} ({file:?})"
            )));
        }
        self.inner.launch(file, label)
    }
}
