//! Live game session: one task owning the state, driven by player commands,
//! a passive-income tick and an autosave cadence.

mod models;
mod runtime;

use std::time::Duration;

pub use models::{SaveReason, SessionEvent, Snapshot};
pub use runtime::{SessionError, SessionHandle};

/// Save identity used when none is configured.
pub const DEFAULT_SAVE_ID: &str = "player_one";

/// Cadences and identity of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Key the state is loaded from and saved under.
    pub save_id: String,
    /// Period of the passive-income tick.
    pub tick_interval: Duration,
    /// Period of the autosave.
    pub autosave_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_id: DEFAULT_SAVE_ID.to_string(),
            tick_interval: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(30),
        }
    }
}
