//! Persisted engine settings.

use crate::conflict::ResolutionStrategy;
use sync_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default auto-sync interval: five minutes.
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// The engine's durable configuration, including the sync watermark.
///
/// Persisted as one settings document; every field has a default so a
/// partial or missing document loads cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Master switch: when false, sync attempts return disabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Run the periodic background sync.
    #[serde(default = "default_auto_sync")]
    pub auto_sync: bool,
    /// Milliseconds between background syncs.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// How detected conflicts are resolved automatically.
    #[serde(default)]
    pub conflict_strategy: ResolutionStrategy,
    /// Sync once when the engine starts.
    #[serde(default = "default_sync_on_startup")]
    pub sync_on_startup: bool,
    /// Sync immediately after each queued change.
    #[serde(default)]
    pub sync_on_change: bool,
    /// The watermark of the last successful sync; `None` means never
    /// synced (the epoch is sent on the wire).
    #[serde(default)]
    pub last_sync: Option<Timestamp>,
}

impl SyncSettings {
    /// The auto-sync interval as a [`Duration`].
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// The watermark to send: the stored value or the epoch.
    pub fn watermark(&self) -> Timestamp {
        self.last_sync.unwrap_or_else(Timestamp::epoch)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            auto_sync: default_auto_sync(),
            sync_interval_ms: default_sync_interval_ms(),
            conflict_strategy: ResolutionStrategy::default(),
            sync_on_startup: default_sync_on_startup(),
            sync_on_change: false,
            last_sync: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_auto_sync() -> bool {
    true
}

fn default_sync_interval_ms() -> u64 {
    DEFAULT_SYNC_INTERVAL_MS
}

fn default_sync_on_startup() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = SyncSettings::default();
        assert!(settings.enabled);
        assert!(settings.auto_sync);
        assert_eq!(settings.sync_interval_ms, 300_000);
        assert_eq!(settings.conflict_strategy, ResolutionStrategy::NewestWins);
        assert!(settings.sync_on_startup);
        assert!(!settings.sync_on_change);
        assert!(settings.last_sync.is_none());
        assert_eq!(settings.watermark(), Timestamp::epoch());
    }

    #[test]
    fn missing_fields_use_defaults() {
        let settings: SyncSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, SyncSettings::default());

        let settings: SyncSettings =
            serde_json::from_str(r#"{"enabled": false, "sync_interval_ms": 60000}"#).unwrap();
        assert!(!settings.enabled);
        assert_eq!(settings.sync_interval(), Duration::from_millis(60_000));
        assert!(settings.auto_sync);
    }

    #[test]
    fn watermark_roundtrips() {
        let mut settings = SyncSettings::default();
        settings.last_sync = Some(Timestamp::parse("2024-01-02T00:00:00.000Z").unwrap());

        let json = serde_json::to_string(&settings).unwrap();
        let back: SyncSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.watermark().to_string(), "2024-01-02T00:00:00.000Z");
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let settings: SyncSettings =
            serde_json::from_str(r#"{"enabled": true, "legacy_field": 7}"#).unwrap();
        assert!(settings.enabled);
    }
}
