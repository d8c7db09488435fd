// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::RestartPolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [supervisor]
/// work_dir = "bots"
/// snapshot_file = "bots_data.json"
/// restart_policy = "backoff"
///
/// [launcher]
/// interpreter = "python3"
/// stop_timeout = "5s"
///
/// [monitor]
/// interval = "1s"
///
/// [deploy]
/// package_markers = ["__init__.py"]
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are
/// kept as strings here and parsed during validation into [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub launcher: RawLauncherSection,

    #[serde(default)]
    pub monitor: RawMonitorSection,

    #[serde(default)]
    pub deploy: RawDeploySection,
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Directory holding single-file sources (`bot_{id}_{owner}.<ext>`) and
    /// repository clones (`repo_{name}/`).
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Path of the JSON snapshot written after every mutation.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,

    /// What to do when a child exits on its own.
    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// Rewrite the snapshot right after recovery when records had to be
    /// skipped because their backing file is gone.
    #[serde(default = "default_true")]
    pub prune_missing_on_recovery: bool,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("bots")
}

fn default_snapshot_file() -> PathBuf {
    PathBuf::from("bots_data.json")
}

fn default_true() -> bool {
    true
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            snapshot_file: default_snapshot_file(),
            restart_policy: RestartPolicy::default(),
            prune_missing_on_recovery: true,
        }
    }
}

/// `[launcher]` section as written in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLauncherSection {
    /// Program that runs every backing file (`<interpreter> <args..> <file>`).
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extension (without the dot) of single-file deployments.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Text appended (after a blank line) to every single-file deployment.
    #[serde(default)]
    pub source_footer: Option<String>,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,

    #[serde(default = "default_kill_timeout")]
    pub kill_timeout: String,
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_extension() -> String {
    "py".to_string()
}

fn default_stop_timeout() -> String {
    "5s".to_string()
}

fn default_kill_timeout() -> String {
    "2s".to_string()
}

impl Default for RawLauncherSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: Vec::new(),
            extension: default_extension(),
            source_footer: None,
            stop_timeout: default_stop_timeout(),
            kill_timeout: default_kill_timeout(),
        }
    }
}

/// `[monitor]` section as written in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMonitorSection {
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(default = "default_backoff_initial")]
    pub backoff_initial: String,

    #[serde(default = "default_backoff_max")]
    pub backoff_max: String,
}

fn default_interval() -> String {
    "1s".to_string()
}

fn default_max_restarts() -> u32 {
    5
}

fn default_backoff_initial() -> String {
    "1s".to_string()
}

fn default_backoff_max() -> String {
    "60s".to_string()
}

impl Default for RawMonitorSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_restarts: default_max_restarts(),
            backoff_initial: default_backoff_initial(),
            backoff_max: default_backoff_max(),
        }
    }
}

/// `[deploy]` section as written in TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDeploySection {
    /// File names never launched by directory deployments.
    #[serde(default = "default_package_markers")]
    pub package_markers: Vec<String>,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: String,

    #[serde(default = "default_git")]
    pub git: String,
}

fn default_package_markers() -> Vec<String> {
    vec!["__init__.py".to_string()]
}

fn default_fetch_timeout() -> String {
    "60s".to_string()
}

fn default_git() -> String {
    "git".to_string()
}

impl Default for RawDeploySection {
    fn default() -> Self {
        Self {
            package_markers: default_package_markers(),
            fetch_timeout: default_fetch_timeout(),
            git: default_git(),
        }
    }
}

/// Validated configuration.
///
/// Only constructible through `ConfigFile::try_from(RawConfigFile)` (or
/// `Default`), so every duration has been parsed and range-checked.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSection,
    pub launcher: LauncherSettings,
    pub monitor: MonitorSettings,
    pub deploy: DeploySettings,
}

#[derive(Debug, Clone)]
pub struct LauncherSettings {
    pub interpreter: String,
    pub args: Vec<String>,
    pub extension: String,
    pub source_footer: Option<String>,
    /// Grace period between the polite stop signal and the forceful kill.
    pub stop_timeout: Duration,
    /// Bounded wait after the forceful kill before the child is declared leaked.
    pub kill_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub max_restarts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub package_markers: Vec<String>,
    pub fetch_timeout: Duration,
    pub git: String,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        supervisor: SupervisorSection,
        launcher: LauncherSettings,
        monitor: MonitorSettings,
        deploy: DeploySettings,
    ) -> Self {
        Self {
            supervisor,
            launcher,
            monitor,
            deploy,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            supervisor: SupervisorSection::default(),
            launcher: LauncherSettings {
                interpreter: default_interpreter(),
                args: Vec::new(),
                extension: default_extension(),
                source_footer: None,
                stop_timeout: Duration::from_secs(5),
                kill_timeout: Duration::from_secs(2),
            },
            monitor: MonitorSettings {
                interval: Duration::from_secs(1),
                max_restarts: default_max_restarts(),
                backoff_initial: Duration::from_secs(1),
                backoff_max: Duration::from_secs(60),
            },
            deploy: DeploySettings {
                package_markers: default_package_markers(),
                fetch_timeout: Duration::from_secs(60),
                git: default_git(),
            },
        }
    }
}
