use serde::Serialize;

use crate::{economy::Stats, models::GameState};

/// What triggered a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveReason {
    /// Periodic autosave.
    Auto,
    /// Requested by the player.
    Manual,
    /// Final save when the session ends.
    Shutdown,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A click dispensed `value` currency.
    Clicked {
        /// Amount credited.
        value: f64,
    },
    /// Upgrade levels were bought.
    Purchased {
        /// Upgrade id.
        id: String,
        /// Level now owned.
        level: u32,
    },
    /// A research level was bought.
    Researched {
        /// Research id.
        id: String,
        /// Level now owned.
        level: u32,
    },
    /// A prestige reset happened.
    Prestiged {
        /// Shards granted.
        gain: u64,
        /// Resets performed so far.
        count: u32,
    },
    /// A save was handed to the gateway; show the syncing indicator.
    SaveStarted {
        /// Trigger.
        reason: SaveReason,
    },
    /// A save was acknowledged.
    Saved {
        /// Trigger.
        reason: SaveReason,
        /// Epoch milliseconds stored as `lastSave`.
        at: i64,
    },
    /// A save failed; the next autosave retries.
    SaveFailed {
        /// Trigger.
        reason: SaveReason,
        /// Error description.
        error: String,
    },
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Copy of the state.
    pub state: GameState,
    /// Figures derived from it.
    pub stats: Stats,
    /// Whether a save is in flight.
    pub syncing: bool,
}
