// src/store/snapshot.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::registry::{FIRST_BOT_ID, Registry};
use crate::types::{BotId, OwnerId};

/// Durable form of the registry, minus live process handles.
///
/// On disk:
///
/// ```json
/// {
///   "next_id": 2,
///   "bots": {
///     "1": { "user_id": 42, "name": "Script 1", "file": "bots/bot_1_42.py" }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    #[serde(default = "first_id")]
    pub next_id: BotId,

    /// Keyed by the stringified id.
    #[serde(default)]
    pub bots: BTreeMap<String, PersistedBot>,
}

fn first_id() -> BotId {
    FIRST_BOT_ID
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBot {
    pub user_id: OwnerId,
    pub name: String,
    pub file: PathBuf,
}

impl Default for PersistedSnapshot {
    fn default() -> Self {
        Self {
            next_id: FIRST_BOT_ID,
            bots: BTreeMap::new(),
        }
    }
}

impl PersistedSnapshot {
    pub fn from_registry(registry: &Registry) -> Self {
        let bots = registry
            .list()
            .map(|rec| {
                (
                    rec.id.to_string(),
                    PersistedBot {
                        user_id: rec.owner,
                        name: rec.name.clone(),
                        file: rec.file.clone(),
                    },
                )
            })
            .collect();

        Self {
            next_id: registry.next_id(),
            bots,
        }
    }

    /// Entries with their numeric ids, ascending.
    ///
    /// Keys that are not valid ids are logged and skipped. Keys that spell the
    /// same id (`"1"` and `"01"`) keep only the first in key order.
    pub fn entries(&self) -> Vec<(BotId, &PersistedBot)> {
        let mut out: Vec<(BotId, &str, &PersistedBot)> = self
            .bots
            .iter()
            .filter_map(|(key, bot)| match key.trim().parse::<BotId>() {
                Ok(id) => Some((id, key.as_str(), bot)),
                Err(_) => {
                    warn!(key = %key, "ignoring snapshot entry with a malformed id");
                    None
                }
            })
            .collect();
        out.sort_by_key(|(id, _, _)| *id);

        let mut unique: Vec<(BotId, &PersistedBot)> = Vec::with_capacity(out.len());
        for (id, key, bot) in out {
            if unique.last().is_some_and(|(last, _)| *last == id) {
                warn!(key = %key, bot = id, "ignoring snapshot entry that repeats an id");
                continue;
            }
            unique.push((id, bot));
        }
        unique
    }
}
