//! Sync orchestration.
//!
//! [`SyncManager`] ties the pieces together: it builds push payloads from
//! the durable queue, runs the full-sync round trip against the server,
//! applies pulled changes to the local store, routes server-reported
//! conflicts through the resolver, and advances the watermark.
//!
//! # Architecture
//!
//! Every dependency comes in through the builder as a trait object, so the
//! engine runs identically against HTTP and mocks:
//!
//! ```ignore
//! let manager = SyncManagerBuilder::new()
//!     .with_api(api)
//!     .with_store(store)
//!     .with_auth(auth)
//!     .build()
//!     .await?;
//! manager.start();
//! let outcome = manager.sync().await;
//! ```
//!
//! A single `AtomicBool` makes sync cycles mutually exclusive: overlapping
//! callers get [`SyncOutcome::Skipped`] instead of a second network trip.
//! The watermark only advances when every pulled change was applied, so an
//! interrupted apply is re-pulled on the next cycle rather than lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use sync_core::{
    Conflict, ConflictStats, QueueItem, QueueStats, Resolution, ResolutionStrategy, SyncSettings,
    SyncState,
};
use sync_types::{
    ConflictEntry, EntityRecord, EntityType, ExportPayload, FullSyncRequest, ImportRequest,
    ImportResponse, Operation, PullData, PullRequest, PushSummary, QueuePayload, ServerStatus,
    Timestamp,
};

use crate::api::{ApiError, SyncApi};
use crate::auth::{AuthEvent, AuthProvider};
use crate::clock::{Clock, SystemClock};
use crate::connectivity::{AlwaysOnline, Connectivity};
use crate::queue::SyncQueue;
use crate::resolver::{ConflictEvent, ConflictResolver, ResolverError};
use crate::store::{LocalStore, StoreError, APP_SETTINGS_KEY, SETTINGS_KEY};

/// Capacity of the sync event channel.
const SYNC_EVENT_CAPACITY: usize = 64;

/// How long a change-triggered sync waits before firing, so a burst of
/// edits collapses into one cycle.
const SYNC_ON_CHANGE_DELAY: Duration = Duration::from_millis(500);

/// Errors from the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server API failed.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Conflict resolution failed.
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No session is active.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The device has no connectivity.
    #[error("device is offline")]
    Offline,

    /// The server answered 200 but reported failure.
    #[error("server rejected sync: {0}")]
    Rejected(String),

    /// Some pulled changes could not be written locally.
    #[error("{failed} pulled changes failed to apply")]
    PartialApply {
        /// How many records failed to apply.
        failed: usize,
    },
}

/// Why a sync cycle never reached the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineReason {
    /// No session is active.
    NotAuthenticated,
    /// The connectivity probe reported offline.
    NoConnectivity,
}

/// The result of one sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The round trip ran to completion.
    Completed(SyncSummary),
    /// Another cycle was already in flight.
    Skipped,
    /// Sync is disabled in settings.
    Disabled,
    /// The device could not reach the network.
    Offline(OfflineReason),
    /// The cycle started but failed.
    Failed {
        /// The failure, rendered for display.
        error: String,
    },
}

/// Counts of pulled changes applied to the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedCounts {
    /// Records saved or updated.
    pub saved: usize,
    /// Records deleted via tombstones.
    pub deleted: usize,
    /// Records that failed to apply.
    pub failed: usize,
    /// Whether a pulled settings document was applied.
    pub settings: bool,
}

impl AppliedCounts {
    /// Total records that applied cleanly.
    pub fn total_applied(&self) -> usize {
        self.saved + self.deleted
    }
}

/// What one completed sync cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// The server's accounting of pushed changes.
    pub push: PushSummary,
    /// Pulled changes applied locally.
    pub applied: AppliedCounts,
    /// Conflicts newly reported by this cycle.
    pub conflicts_detected: usize,
    /// Conflicts still unresolved after auto-resolution.
    pub conflicts_unresolved: usize,
    /// The cycle's watermark.
    pub timestamp: Timestamp,
}

/// Combined local and server view for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    /// Whether a session is active.
    pub authenticated: bool,
    /// The engine's current state.
    pub state: SyncState,
    /// When the last successful sync finished.
    pub last_sync: Option<Timestamp>,
    /// The most recent cycle failure, if the engine is in an error state.
    pub last_error: Option<String>,
    /// Pending local changes.
    pub queued_changes: usize,
    /// Unresolved conflicts.
    pub unresolved_conflicts: usize,
    /// The server's view, when reachable.
    pub server: Option<ServerStatus>,
    /// Why the server's view is missing, when it is.
    pub server_error: Option<String>,
}

/// A partial update to [`SyncSettings`]. `None` fields keep their value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    /// Master switch.
    pub enabled: Option<bool>,
    /// Background timer switch.
    pub auto_sync: Option<bool>,
    /// Background timer period in milliseconds.
    pub sync_interval_ms: Option<u64>,
    /// Strategy applied to incoming conflicts.
    pub conflict_strategy: Option<ResolutionStrategy>,
    /// Sync once at startup.
    pub sync_on_startup: Option<bool>,
    /// Sync shortly after each local change.
    pub sync_on_change: Option<bool>,
}

/// Engine lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// `start()` finished wiring the engine.
    Initialized,
    /// The engine's state changed.
    StateChanged {
        /// The state left behind.
        from: SyncState,
        /// The state entered.
        to: SyncState,
    },
    /// A sync cycle completed.
    Completed(SyncSummary),
    /// A sync cycle failed.
    Error {
        /// The failure, rendered for display.
        message: String,
    },
    /// Settings were updated.
    SettingsUpdated(SyncSettings),
}

/// Errors from [`SyncManagerBuilder::build`].
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A required dependency was not provided.
    #[error("missing required dependency: {0}")]
    Missing(&'static str),
}

/// Builder for [`SyncManager`].
///
/// The API, store, and auth provider are required. Connectivity defaults
/// to [`AlwaysOnline`] and the clock to [`SystemClock`].
pub struct SyncManagerBuilder {
    api: Option<Arc<dyn SyncApi>>,
    store: Option<Arc<dyn LocalStore>>,
    auth: Option<Arc<dyn AuthProvider>>,
    connectivity: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
}

impl SyncManagerBuilder {
    /// Create a builder with default connectivity and clock.
    pub fn new() -> Self {
        Self {
            api: None,
            store: None,
            auth: None,
            connectivity: Arc::new(AlwaysOnline),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the server API.
    pub fn with_api(mut self, api: Arc<dyn SyncApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Set the local store.
    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the authentication provider.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the connectivity probe.
    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load persisted state and assemble the manager.
    ///
    /// Reads the sync settings and the durable queue from the store.
    /// Missing or corrupt documents fall back to defaults.
    pub async fn build(self) -> Result<Arc<SyncManager>, BuildError> {
        let api = self.api.ok_or(BuildError::Missing("api"))?;
        let store = self.store.ok_or(BuildError::Missing("store"))?;
        let auth = self.auth.ok_or(BuildError::Missing("auth"))?;

        let settings = load_settings(store.as_ref()).await;
        let queue = Arc::new(SyncQueue::load(store.clone(), self.clock.clone()).await);
        let resolver = Arc::new(ConflictResolver::new(store.clone(), self.clock.clone()));

        let initial_state = if auth.is_authenticated() {
            SyncState::Idle
        } else {
            SyncState::Offline
        };

        let (events, _) = broadcast::channel(SYNC_EVENT_CAPACITY);

        Ok(Arc::new(SyncManager {
            api,
            store,
            auth,
            connectivity: self.connectivity,
            clock: self.clock,
            queue,
            resolver,
            settings: Mutex::new(settings),
            state: Mutex::new(initial_state),
            last_error: Mutex::new(None),
            is_syncing: AtomicBool::new(false),
            started: AtomicBool::new(false),
            auto_sync: Mutex::new(None),
            change_sync: Mutex::new(None),
            events,
        }))
    }
}

impl Default for SyncManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_settings(store: &dyn LocalStore) -> SyncSettings {
    match store.setting(SETTINGS_KEY).await {
        Ok(Some(doc)) => match serde_json::from_value::<SyncSettings>(doc) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Corrupt sync settings, using defaults: {}", e);
                SyncSettings::default()
            }
        },
        Ok(None) => SyncSettings::default(),
        Err(e) => {
            tracing::warn!("Failed to read sync settings: {}", e);
            SyncSettings::default()
        }
    }
}

/// The sync engine.
///
/// Construct with [`SyncManagerBuilder`], then call [`start`](Self::start)
/// once to wire auth events and background timers. [`sync`](Self::sync)
/// can also be driven directly without `start()`.
pub struct SyncManager {
    api: Arc<dyn SyncApi>,
    store: Arc<dyn LocalStore>,
    auth: Arc<dyn AuthProvider>,
    connectivity: Arc<dyn Connectivity>,
    clock: Arc<dyn Clock>,
    queue: Arc<SyncQueue>,
    resolver: Arc<ConflictResolver>,
    settings: Mutex<SyncSettings>,
    state: Mutex<SyncState>,
    last_error: Mutex<Option<String>>,
    is_syncing: AtomicBool,
    started: AtomicBool,
    auto_sync: Mutex<Option<JoinHandle<()>>>,
    change_sync: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncManager {
    // =========================================================
    // Lifecycle
    // =========================================================

    /// Wire auth events and background behavior. Idempotent.
    ///
    /// Spawns the auth listener, starts the auto-sync timer when enabled,
    /// and runs a startup sync when configured.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.spawn_auth_listener();

        let settings = self.settings_snapshot();
        if settings.enabled && self.auth.is_authenticated() {
            if settings.auto_sync {
                self.start_auto_sync();
            }
            if settings.sync_on_startup {
                self.spawn_sync();
            }
        }

        let _ = self.events.send(SyncEvent::Initialized);
    }

    /// Stop the background timer. In-flight cycles finish on their own.
    pub fn stop_auto_sync(&self) {
        let mut guard = self.auto_sync.lock().unwrap();
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    /// Whether the background timer is running.
    pub fn auto_sync_running(&self) -> bool {
        self.auto_sync.lock().unwrap().is_some()
    }

    fn spawn_auth_listener(self: &Arc<Self>) {
        let mut events = self.auth.subscribe();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let manager = match weak.upgrade() {
                    Some(manager) => manager,
                    None => break,
                };
                manager.handle_auth_event(event).await;
            }
        });
    }

    async fn handle_auth_event(self: &Arc<Self>, event: AuthEvent) {
        match event {
            AuthEvent::LoggedIn | AuthEvent::Registered => {
                tracing::info!("Session started, resuming sync");
                self.set_state(SyncState::Idle);
                let settings = self.settings_snapshot();
                if settings.enabled {
                    if settings.auto_sync {
                        self.start_auto_sync();
                    }
                    self.spawn_sync();
                }
            }
            AuthEvent::LoggedOut => {
                tracing::info!("Session ended, clearing sync state");
                self.stop_auto_sync();
                if let Some(handle) = self.change_sync.lock().unwrap().take() {
                    handle.abort();
                }
                self.queue.clear().await;
                self.resolver.clear();
                *self.last_error.lock().unwrap() = None;
                self.set_watermark(None).await;
                self.set_state(SyncState::Idle);
            }
            AuthEvent::SessionExpired => {
                tracing::info!("Session expired");
            }
            AuthEvent::TokenRefreshed => {
                tracing::debug!("Access token refreshed");
            }
        }
    }

    /// Start (or restart) the background timer with the current interval.
    ///
    /// Each tick spawns an independent sync task, so stopping the timer
    /// never kills a cycle in flight.
    pub fn start_auto_sync(self: &Arc<Self>) {
        let interval = self
            .settings_snapshot()
            .sync_interval()
            // A zero interval would busy-loop.
            .max(Duration::from_secs(1));

        let mut guard = self.auto_sync.lock().unwrap();
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let weak = Arc::downgrade(self);
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the timer starts the
            // cycle one full interval out.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let manager = match weak.upgrade() {
                    Some(manager) => manager,
                    None => break,
                };
                if manager.auth.is_authenticated() && manager.connectivity.is_online() {
                    manager.spawn_sync();
                }
            }
        }));
    }

    fn spawn_sync(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.sync().await;
        });
    }

    // =========================================================
    // Sync cycle
    // =========================================================

    /// Run one full sync cycle.
    ///
    /// Exactly one cycle runs at a time; a caller that finds another in
    /// flight gets [`SyncOutcome::Skipped`] immediately.
    pub async fn sync(&self) -> SyncOutcome {
        if self.is_syncing.swap(true, Ordering::SeqCst) {
            return SyncOutcome::Skipped;
        }
        let outcome = self.sync_locked().await;
        self.is_syncing.store(false, Ordering::SeqCst);
        outcome
    }

    async fn sync_locked(&self) -> SyncOutcome {
        if !self.settings_snapshot().enabled {
            return SyncOutcome::Disabled;
        }
        if !self.auth.is_authenticated() {
            self.set_state(SyncState::Offline);
            return SyncOutcome::Offline(OfflineReason::NotAuthenticated);
        }
        if !self.connectivity.is_online() {
            self.set_state(SyncState::Offline);
            return SyncOutcome::Offline(OfflineReason::NoConnectivity);
        }

        self.set_state(SyncState::Syncing);
        match self.run_cycle().await {
            Ok(summary) => {
                *self.last_error.lock().unwrap() = None;
                let state = if summary.conflicts_unresolved > 0 {
                    SyncState::Conflicts
                } else {
                    SyncState::Success
                };
                self.set_state(state);
                let _ = self.events.send(SyncEvent::Completed(summary.clone()));
                SyncOutcome::Completed(summary)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Sync cycle failed: {}", message);
                *self.last_error.lock().unwrap() = Some(message.clone());
                self.set_state(SyncState::Error);
                let _ = self.events.send(SyncEvent::Error {
                    message: message.clone(),
                });
                SyncOutcome::Failed { error: message }
            }
        }
    }

    async fn run_cycle(&self) -> Result<SyncSummary, ClientError> {
        let payload = self.queue.to_payload();
        let request = FullSyncRequest {
            entities: payload.clone(),
            last_sync: self.watermark(),
            device_id: self.auth.device_id(),
        };

        let response = self.api.full_sync(&request).await?;
        if !response.success {
            return Err(ClientError::Rejected("server reported failure".to_string()));
        }

        let push = response.push.unwrap_or_default();
        self.settle_push(&payload, &push).await;

        let mut applied = AppliedCounts::default();
        let mut conflicts_detected = 0;
        if let Some(pull) = response.pull {
            applied = self.apply_pull(&pull.data).await;
            conflicts_detected = self.track_conflicts(pull.conflicts);
            if conflicts_detected > 0 {
                let strategy = self.settings_snapshot().conflict_strategy;
                if strategy != ResolutionStrategy::Manual {
                    self.resolver.resolve_all(strategy).await?;
                }
            }
        }

        // The watermark only advances when every pulled change landed.
        // Withholding it makes the next cycle re-pull what was missed.
        if applied.failed > 0 {
            return Err(ClientError::PartialApply {
                failed: applied.failed,
            });
        }
        if let Some(timestamp) = response.timestamp {
            self.set_watermark(Some(timestamp)).await;
        }

        Ok(SyncSummary {
            push,
            applied,
            conflicts_detected,
            conflicts_unresolved: self.resolver.unresolved_count(),
            timestamp: response.timestamp.unwrap_or_else(|| self.clock.now()),
        })
    }

    /// Clear acknowledged queue items and record per-item push failures.
    ///
    /// The server acknowledges counts per type in payload order, so the
    /// first `success` records of each type are considered landed.
    async fn settle_push(&self, payload: &QueuePayload, push: &PushSummary) {
        let mut acked: Vec<String> = Vec::new();
        for entity_type in EntityType::DOCUMENT_TYPES {
            let success = push.counts_for(entity_type).success as usize;
            for record in payload.records(entity_type).iter().take(success) {
                acked.push(record.id.clone());
            }
        }
        if payload.settings.is_some() && push.counts_for(EntityType::Settings).success > 0 {
            acked.push(APP_SETTINGS_KEY.to_string());
        }
        if !acked.is_empty() {
            self.queue.clear_acked(&acked).await;
        }

        let items = self.queue.items();
        for error in &push.errors {
            let id = match &error.id {
                Some(id) => id,
                None => continue,
            };
            if let Some(item) = items.iter().find(|item| &item.entity_id == id) {
                self.queue.mark_failed(&item.id, &error.error).await;
            }
        }
    }

    /// Write pulled records into the local store, best effort.
    ///
    /// Failures are counted rather than aborting, so one bad record does
    /// not block the rest of the batch.
    async fn apply_pull(&self, data: &PullData) -> AppliedCounts {
        let mut counts = AppliedCounts::default();

        for entity_type in EntityType::DOCUMENT_TYPES {
            for record in data.records(entity_type) {
                match self.apply_record(entity_type, record).await {
                    Ok(deleted) => {
                        if deleted {
                            counts.deleted += 1;
                        } else {
                            counts.saved += 1;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to apply pulled {} {}: {}",
                            entity_type,
                            record.id,
                            e
                        );
                        counts.failed += 1;
                    }
                }
            }
        }

        if let Some(settings) = &data.settings {
            match self
                .store
                .put_setting(APP_SETTINGS_KEY, settings.clone())
                .await
            {
                Ok(()) => counts.settings = true,
                Err(e) => {
                    tracing::warn!("Failed to apply pulled settings: {}", e);
                    counts.failed += 1;
                }
            }
        }

        counts
    }

    async fn apply_record(
        &self,
        entity_type: EntityType,
        record: &EntityRecord,
    ) -> Result<bool, StoreError> {
        if record.is_deleted() {
            self.store.delete_entity(entity_type, &record.id).await?;
            return Ok(true);
        }

        let mut doc = match record.data.as_object() {
            Some(map) => map.clone(),
            None => serde_json::Map::new(),
        };
        doc.insert("id".to_string(), Value::String(record.id.clone()));
        if let Some(modified) = record.last_modified {
            doc.insert(
                "last_modified".to_string(),
                Value::String(modified.to_string()),
            );
        }
        self.store
            .save_entity(entity_type, &record.id, Value::Object(doc))
            .await?;
        Ok(false)
    }

    fn track_conflicts(&self, entries: Vec<ConflictEntry>) -> usize {
        if entries.is_empty() {
            return 0;
        }
        let now = self.clock.now();
        let conflicts: Vec<Conflict> = entries
            .into_iter()
            .map(|entry| Conflict::from_entry(entry, now))
            .collect();
        self.resolver.add_conflicts(conflicts)
    }

    // =========================================================
    // Push / pull halves
    // =========================================================

    /// Push queued changes without pulling.
    pub async fn push(&self) -> Result<PushSummary, ClientError> {
        self.ensure_online()?;

        let payload = self.queue.to_payload();
        if payload.is_empty() {
            return Ok(PushSummary::default());
        }

        let request = sync_types::PushRequest {
            entities: payload.clone(),
            last_sync: self.watermark(),
        };
        let response = self.api.push(&request).await?;
        if !response.success {
            return Err(ClientError::Rejected("server reported failure".to_string()));
        }

        let summary = response.results.unwrap_or_default();
        self.settle_push(&payload, &summary).await;
        Ok(summary)
    }

    /// Pull and apply changes since the watermark, without pushing.
    ///
    /// The watermark only advances when every record applied.
    pub async fn pull(&self) -> Result<AppliedCounts, ClientError> {
        self.ensure_online()?;

        let request = PullRequest::all_entities(self.watermark());
        let response = self.api.pull(&request).await?;
        if !response.success {
            return Err(ClientError::Rejected("server reported failure".to_string()));
        }

        let applied = self.apply_pull(&response.data).await;
        if applied.failed > 0 {
            return Err(ClientError::PartialApply {
                failed: applied.failed,
            });
        }
        if let Some(timestamp) = response.timestamp {
            self.set_watermark(Some(timestamp)).await;
        }
        Ok(applied)
    }

    fn ensure_online(&self) -> Result<(), ClientError> {
        if !self.auth.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        if !self.connectivity.is_online() {
            return Err(ClientError::Offline);
        }
        Ok(())
    }

    // =========================================================
    // Local changes
    // =========================================================

    /// Record a local change and, when configured, sync shortly after.
    ///
    /// The change-triggered sync is a trailing-edge debounce: each new
    /// change replaces the pending timer, so a burst of edits settles
    /// into one cycle after the last edit.
    pub async fn queue_change(
        self: &Arc<Self>,
        entity_type: EntityType,
        entity_id: &str,
        operation: Operation,
        data: Option<Value>,
    ) -> QueueItem {
        let item = self
            .queue
            .enqueue(entity_type, entity_id, operation, data)
            .await;

        if self.settings_snapshot().sync_on_change
            && self.auth.is_authenticated()
            && self.connectivity.is_online()
        {
            let mut guard = self.change_sync.lock().unwrap();
            if let Some(handle) = guard.take() {
                handle.abort();
            }

            let manager = Arc::clone(self);
            *guard = Some(tokio::spawn(async move {
                tokio::time::sleep(SYNC_ON_CHANGE_DELAY).await;
                manager.sync().await;
            }));
        }

        item
    }

    // =========================================================
    // Conflicts
    // =========================================================

    /// Resolve one conflict with an automatic strategy.
    pub async fn resolve_conflict(
        &self,
        entity_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<(), ClientError> {
        self.resolver.resolve(entity_id, strategy).await?;
        self.leave_conflicts_state_if_clear();
        Ok(())
    }

    /// Resolve one conflict with an explicitly chosen body.
    pub async fn resolve_conflict_with_data(
        &self,
        entity_id: &str,
        data: Value,
    ) -> Result<(), ClientError> {
        self.resolver.resolve_with_data(entity_id, data).await?;
        self.leave_conflicts_state_if_clear();
        Ok(())
    }

    /// Resolve every unresolved conflict with the given strategy.
    pub async fn resolve_all_conflicts(
        &self,
        strategy: ResolutionStrategy,
    ) -> Result<usize, ClientError> {
        let resolved = self.resolver.resolve_all(strategy).await?;
        self.leave_conflicts_state_if_clear();
        Ok(resolved)
    }

    fn leave_conflicts_state_if_clear(&self) {
        if self.state() == SyncState::Conflicts && self.resolver.unresolved_count() == 0 {
            self.set_state(SyncState::Success);
        }
    }

    /// Unresolved conflicts, oldest first.
    pub fn unresolved_conflicts(&self) -> Vec<Conflict> {
        self.resolver.unresolved()
    }

    /// Summarize the conflict working set.
    pub fn conflict_stats(&self) -> ConflictStats {
        self.resolver.stats()
    }

    /// The resolution history, oldest first.
    pub fn resolution_history(&self) -> Vec<Resolution> {
        self.resolver.history()
    }

    // =========================================================
    // Status, export, import
    // =========================================================

    /// Report local state, optionally enriched with the server's view.
    ///
    /// A failed server fetch lands in `server_error` and never disturbs
    /// the engine's own state.
    pub async fn status(&self) -> SyncStatusReport {
        let (server, server_error) =
            if self.auth.is_authenticated() && self.connectivity.is_online() {
                match self.api.status().await {
                    Ok(status) => (Some(status), None),
                    Err(e) => (None, Some(e.to_string())),
                }
            } else {
                (None, None)
            };

        SyncStatusReport {
            authenticated: self.auth.is_authenticated(),
            state: self.state(),
            last_sync: self.last_sync(),
            last_error: self.last_error(),
            queued_changes: self.queue.pending_count(),
            unresolved_conflicts: self.resolver.unresolved_count(),
            server,
            server_error,
        }
    }

    /// Download a whole-account snapshot from the server.
    pub async fn export_data(&self) -> Result<ExportPayload, ClientError> {
        self.ensure_online()?;
        Ok(self.api.export().await?)
    }

    /// Upload a whole-account snapshot, then refresh local data.
    ///
    /// The follow-up pull is best effort; an import that landed is not
    /// rolled back because the refresh failed.
    pub async fn import_data(
        &self,
        data: PullData,
        overwrite: bool,
    ) -> Result<ImportResponse, ClientError> {
        self.ensure_online()?;

        let request = ImportRequest { data, overwrite };
        let response = self.api.import(&request).await?;
        if response.success {
            if let Err(e) = self.pull().await {
                tracing::warn!("Post-import pull failed: {}", e);
            }
        }
        Ok(response)
    }

    // =========================================================
    // Settings
    // =========================================================

    /// Apply a partial settings update, persist it, and emit
    /// [`SyncEvent::SettingsUpdated`].
    ///
    /// Timer-related changes restart or stop the background timer.
    pub async fn update_settings(
        self: &Arc<Self>,
        update: SettingsUpdate,
    ) -> Result<SyncSettings, ClientError> {
        let (settings, timer_changed) = {
            let mut settings = self.settings.lock().unwrap();
            let before_auto = settings.auto_sync;
            let before_interval = settings.sync_interval_ms;
            let before_enabled = settings.enabled;

            if let Some(enabled) = update.enabled {
                settings.enabled = enabled;
            }
            if let Some(auto_sync) = update.auto_sync {
                settings.auto_sync = auto_sync;
            }
            if let Some(interval) = update.sync_interval_ms {
                settings.sync_interval_ms = interval;
            }
            if let Some(strategy) = update.conflict_strategy {
                settings.conflict_strategy = strategy;
            }
            if let Some(on_startup) = update.sync_on_startup {
                settings.sync_on_startup = on_startup;
            }
            if let Some(on_change) = update.sync_on_change {
                settings.sync_on_change = on_change;
            }

            let timer_changed = settings.auto_sync != before_auto
                || settings.sync_interval_ms != before_interval
                || settings.enabled != before_enabled;
            (settings.clone(), timer_changed)
        };

        self.persist_settings().await?;

        if timer_changed {
            if settings.enabled && settings.auto_sync && self.auth.is_authenticated() {
                self.start_auto_sync();
            } else {
                self.stop_auto_sync();
            }
        }

        let _ = self
            .events
            .send(SyncEvent::SettingsUpdated(settings.clone()));
        Ok(settings)
    }

    // =========================================================
    // Accessors
    // =========================================================

    /// The engine's current state.
    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap()
    }

    /// When the last successful sync finished.
    pub fn last_sync(&self) -> Option<Timestamp> {
        self.settings.lock().unwrap().last_sync
    }

    /// The most recent cycle failure.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// A snapshot of the current settings.
    pub fn settings_snapshot(&self) -> SyncSettings {
        self.settings.lock().unwrap().clone()
    }

    /// Pending local changes.
    pub fn pending_changes(&self) -> usize {
        self.queue.pending_count()
    }

    /// Summarize the queue for display.
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Access the durable queue (for inspection and tests).
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Access the conflict resolver (for inspection and tests).
    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Subscribe to engine lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Subscribe to conflict lifecycle events.
    pub fn subscribe_conflicts(&self) -> broadcast::Receiver<ConflictEvent> {
        self.resolver.subscribe()
    }

    // =========================================================
    // Internals
    // =========================================================

    fn watermark(&self) -> Timestamp {
        self.settings.lock().unwrap().watermark()
    }

    async fn set_watermark(&self, timestamp: Option<Timestamp>) {
        {
            self.settings.lock().unwrap().last_sync = timestamp;
        }
        if let Err(e) = self.persist_settings().await {
            tracing::warn!("Failed to persist sync watermark: {}", e);
        }
    }

    async fn persist_settings(&self) -> Result<(), ClientError> {
        let doc = {
            let settings = self.settings.lock().unwrap();
            serde_json::to_value(&*settings)
        }
        .map_err(|e| ClientError::Serialization(e.to_string()))?;

        self.store.put_setting(SETTINGS_KEY, doc).await?;
        Ok(())
    }

    fn set_state(&self, to: SyncState) {
        let from = {
            let mut state = self.state.lock().unwrap();
            let from = *state;
            *state = to;
            from
        };
        if from != to {
            tracing::debug!("Sync state: {} -> {}", from, to);
            let _ = self.events.send(SyncEvent::StateChanged { from, to });
        }
    }
}
