// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::OwnerId;

/// Command-line arguments for `botkeeper`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "botkeeper",
    version,
    about = "Keep user-deployed bot scripts running, and bring them back after a restart.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If the default file is absent, built-in defaults are used.
    #[arg(long, value_name = "PATH", default_value = crate::config::loader::DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BOTKEEPER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config, print the stored snapshot, launch nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Deploy every script under this directory at startup.
    #[arg(long, value_name = "PATH", requires = "owner")]
    pub deploy_dir: Option<PathBuf>,

    /// Clone this git repository and deploy its scripts at startup.
    #[arg(long, value_name = "URL", requires = "owner")]
    pub repo: Option<String>,

    /// Owner id recorded for startup deployments.
    #[arg(long, value_name = "ID", allow_negative_numbers = true)]
    pub owner: Option<OwnerId>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
