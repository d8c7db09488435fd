use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::{BotkeeperError, Result};

/// Identifier of a deployed bot. Assigned once, never reused.
pub type BotId = u64;

/// External principal that deployed a bot.
pub type OwnerId = i64;

/// Lifecycle status of a registry record.
///
/// A record carries a live process handle if and only if it is `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStatus {
    Running,
    Stopped,
    Crashed,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BotStatus::Running => "running",
            BotStatus::Stopped => "stopped",
            BotStatus::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// What the monitor does when a child exits on its own.
///
/// - `Never`: record the crash and leave the record `Crashed` until its owner
///   restarts or stops it (default behaviour).
/// - `Backoff`: relaunch from the same backing file with exponential backoff,
///   up to `[monitor].max_restarts` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    #[default]
    Never,
    Backoff,
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "never" => Ok(RestartPolicy::Never),
            "backoff" => Ok(RestartPolicy::Backoff),
            other => Err(format!(
                "invalid restart_policy: {other} (expected \"never\" or \"backoff\")"
            )),
        }
    }
}

/// Read-only view of one record, as returned by `Supervisor::list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSummary {
    pub id: BotId,
    pub name: String,
    pub owner: OwnerId,
    pub status: BotStatus,
}

/// Result of a successful single-file deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub id: BotId,
    pub name: String,
}

/// Parse a bot id typed by a user (e.g. the argument of a `stop` command).
pub fn parse_bot_id(raw: &str) -> Result<BotId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BotkeeperError::Validation("missing bot id".to_string()));
    }
    trimmed
        .parse::<BotId>()
        .map_err(|_| BotkeeperError::Validation(format!("invalid bot id '{trimmed}'")))
}
