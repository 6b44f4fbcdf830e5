//! The engine's observable state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the sync engine currently stands.
///
/// `Conflicts` and `Offline` are sticky until resolved or
/// connectivity/authentication returns; the others reflect the most
/// recent sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No sync has run yet, or the session was reset.
    Idle,
    /// A sync round trip is in flight.
    Syncing,
    /// The last sync completed with nothing outstanding.
    Success,
    /// The last sync failed; the queue is intact.
    Error,
    /// Unresolved conflicts await a decision.
    Conflicts,
    /// Not authenticated or no connectivity.
    Offline,
}

impl SyncState {
    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Syncing => "syncing",
            SyncState::Success => "success",
            SyncState::Error => "error",
            SyncState::Conflicts => "conflicts",
            SyncState::Offline => "offline",
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Idle
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_lowercase_names() {
        assert_eq!(serde_json::to_string(&SyncState::Conflicts).unwrap(), "\"conflicts\"");
        let state: SyncState = serde_json::from_str("\"offline\"").unwrap();
        assert_eq!(state, SyncState::Offline);
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(SyncState::Syncing.to_string(), "syncing");
        assert_eq!(SyncState::default(), SyncState::Idle);
    }
}
