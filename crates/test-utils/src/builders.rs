#![allow(dead_code)]

use std::path::Path;

use botkeeper::config::{ConfigFile, RawConfigFile};
use botkeeper::types::RestartPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Put the work dir and the snapshot file under `root`.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.config.supervisor.work_dir = root.join("bots");
        self.config.supervisor.snapshot_file = root.join("bots_data.json");
        self
    }

    pub fn with_work_dir(mut self, dir: &Path) -> Self {
        self.config.supervisor.work_dir = dir.to_path_buf();
        self
    }

    pub fn with_snapshot_file(mut self, path: &Path) -> Self {
        self.config.supervisor.snapshot_file = path.to_path_buf();
        self
    }

    /// Run `<file>.sh` with `sh` and use short stop/kill bounds.
    pub fn with_shell_launcher(mut self) -> Self {
        self.config.launcher.interpreter = "sh".to_string();
        self.config.launcher.args = Vec::new();
        self.config.launcher.extension = "sh".to_string();
        self.config.launcher.stop_timeout = "500ms".to_string();
        self.config.launcher.kill_timeout = "2s".to_string();
        self
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.config.launcher.extension = ext.to_string();
        self
    }

    pub fn with_source_footer(mut self, footer: &str) -> Self {
        self.config.launcher.source_footer = Some(footer.to_string());
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.config.supervisor.restart_policy = policy;
        self
    }

    /// Fast monitor for tests: `interval`, `backoff_initial` and
    /// `backoff_max` as duration strings.
    pub fn with_monitor(mut self, interval: &str, backoff_initial: &str, backoff_max: &str) -> Self {
        self.config.monitor.interval = interval.to_string();
        self.config.monitor.backoff_initial = backoff_initial.to_string();
        self.config.monitor.backoff_max = backoff_max.to_string();
        self
    }

    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.config.monitor.max_restarts = max;
        self
    }

    pub fn with_prune_missing(mut self, prune: bool) -> Self {
        self.config.supervisor.prune_missing_on_recovery = prune;
        self
    }

    pub fn with_package_markers(mut self, markers: &[&str]) -> Self {
        self.config.deploy.package_markers = markers.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_git(mut self, git: &str, fetch_timeout: &str) -> Self {
        self.config.deploy.git = git.to_string();
        self.config.deploy.fetch_timeout = fetch_timeout.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
