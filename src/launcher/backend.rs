// src/launcher/backend.rs

//! Pluggable launcher abstraction.
//!
//! The supervisor asks a [`Launcher`] to start a backing file instead of
//! building commands itself. Production code uses [`InterpreterLauncher`];
//! tests can swap in launchers that record calls or fail on purpose.

use std::path::Path;

use crate::config::LauncherSettings;
use crate::errors::Result;

use super::process::{BotProcess, LaunchSpec, TerminateTimeouts};

/// Trait abstracting how a backing file becomes a running process.
pub trait Launcher: Send + Sync {
    /// Start `file` as a child process labelled `label` in logs.
    fn launch(&self, file: &Path, label: &str) -> Result<BotProcess>;
}

/// Runs every backing file as `<interpreter> <args..> <file>`.
#[derive(Debug, Clone)]
pub struct InterpreterLauncher {
    interpreter: String,
    args: Vec<String>,
}

impl InterpreterLauncher {
    pub fn new(interpreter: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args,
        }
    }

    pub fn from_settings(settings: &LauncherSettings) -> Self {
        Self::new(settings.interpreter.clone(), settings.args.clone())
    }

    /// Build the spec for `file` without starting anything.
    pub fn spec_for(&self, file: &Path, label: &str) -> LaunchSpec {
        let mut args = self.args.clone();
        args.push(file.to_string_lossy().into_owned());
        LaunchSpec {
            label: label.to_string(),
            program: self.interpreter.clone(),
            args,
            working_dir: None,
        }
    }
}

impl Launcher for InterpreterLauncher {
    fn launch(&self, file: &Path, label: &str) -> Result<BotProcess> {
        BotProcess::spawn(&self.spec_for(file, label))
    }
}

impl From<&LauncherSettings> for TerminateTimeouts {
    fn from(settings: &LauncherSettings) -> Self {
        TerminateTimeouts {
            grace: settings.stop_timeout,
            kill: settings.kill_timeout,
        }
    }
}
