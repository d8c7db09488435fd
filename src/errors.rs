// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Every supervisor operation returns one of these kinds to its caller; the
//! front-end decides how to render them.

use thiserror::Error;

use crate::types::{BotId, OwnerId};

#[derive(Error, Debug)]
pub enum BotkeeperError {
    /// Malformed id, missing argument or otherwise unusable request.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Bot not found: {0}")]
    NotFound(BotId),

    #[error("Caller {caller} does not own bot {id}")]
    Permission { id: BotId, caller: OwnerId },

    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Spawn failure, external fetch failure or exhausted termination escalation.
    #[error("Process error: {0}")]
    Process(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Supervisor is shut down")]
    ShutDown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BotkeeperError {
    /// Wrap an IO error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True if this is an IO error caused by a missing path.
    pub fn is_not_found_io(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<std::io::Error> for BotkeeperError {
    fn from(source: std::io::Error) -> Self {
        Self::io("performing IO", source)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BotkeeperError>;
