//! Conflict resolution against the local store.
//!
//! Wraps [`ConflictTracker`] with the side effects resolution needs: the
//! winning body is written to the local store first, and only a successful
//! write marks the conflict resolved. A failed write leaves the conflict
//! open for a later retry.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::broadcast;

use sync_core::{
    choose_resolution, detect_conflicts, merge_values, Conflict, ConflictError, ConflictStats,
    ConflictTracker, Resolution, ResolutionStrategy,
};
use sync_types::{EntityType, Timestamp};

use crate::clock::Clock;
use crate::store::{LocalStore, StoreError};

/// Capacity of the conflict event channel.
const CONFLICT_EVENT_CAPACITY: usize = 32;

/// Errors from conflict resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// The tracker rejected the operation.
    #[error("conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// The winning body could not be written to the local store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Conflict lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictEvent {
    /// New conflicts entered the working set.
    Detected {
        /// How many conflicts were added.
        added: usize,
        /// Unresolved conflicts after the addition.
        unresolved: usize,
    },
    /// A conflict was resolved and its winner applied.
    Resolved {
        /// The entity whose conflict was resolved.
        entity_id: String,
        /// The strategy that picked the winner.
        strategy: ResolutionStrategy,
        /// Unresolved conflicts remaining.
        remaining: usize,
    },
    /// The working set was cleared.
    Cleared,
}

/// Applies conflict resolutions to the local store.
///
/// The tracker lock never spans a store write: resolution snapshots the
/// conflict, writes the winner, then marks it resolved.
pub struct ConflictResolver {
    tracker: Mutex<ConflictTracker>,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ConflictEvent>,
}

impl ConflictResolver {
    /// Create a resolver with an empty working set.
    pub fn new(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(CONFLICT_EVENT_CAPACITY);
        Self {
            tracker: Mutex::new(ConflictTracker::new()),
            store,
            clock,
            events,
        }
    }

    /// Subscribe to conflict lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConflictEvent> {
        self.events.subscribe()
    }

    /// Add conflicts to the working set.
    ///
    /// Duplicates of already-tracked unresolved conflicts are dropped.
    /// Returns how many were actually added.
    pub fn add_conflicts(&self, incoming: Vec<Conflict>) -> usize {
        let (added, unresolved) = {
            let mut tracker = self.tracker.lock().unwrap();
            let added = tracker.add(incoming);
            (added, tracker.unresolved_count())
        };
        if added > 0 {
            let _ = self.events.send(ConflictEvent::Detected { added, unresolved });
        }
        added
    }

    /// Compare server records against the local store and track divergences.
    ///
    /// Returns how many new conflicts were found.
    pub async fn detect(
        &self,
        entity_type: EntityType,
        server_records: &[Value],
    ) -> Result<usize, ResolverError> {
        let local = self.store.entities(entity_type).await?;
        let conflicts = detect_conflicts(&local, server_records, entity_type, self.clock.now());
        Ok(self.add_conflicts(conflicts))
    }

    /// Resolve one conflict with an automatic strategy.
    ///
    /// [`ResolutionStrategy::Manual`] is rejected; use
    /// [`resolve_with_data`](Self::resolve_with_data) for human decisions.
    pub async fn resolve(
        &self,
        entity_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<(), ResolverError> {
        let conflict = self.snapshot(entity_id)?;

        let winner = match strategy {
            ResolutionStrategy::Merge => {
                let outcome =
                    merge_values(&conflict.client_version.data, &conflict.server_version.data);
                if !outcome.scalar_overlaps.is_empty() {
                    tracing::warn!(
                        "Merge for {} kept client values on overlapping fields: {:?}",
                        conflict.entity_id,
                        outcome.scalar_overlaps
                    );
                }
                outcome.value
            }
            _ => choose_resolution(&conflict, strategy)?,
        };

        self.apply(&conflict, strategy, winner).await
    }

    /// Resolve one conflict with an explicitly chosen body.
    ///
    /// Recorded under [`ResolutionStrategy::Manual`].
    pub async fn resolve_with_data(
        &self,
        entity_id: &str,
        data: Value,
    ) -> Result<(), ResolverError> {
        let conflict = self.snapshot(entity_id)?;
        self.apply(&conflict, ResolutionStrategy::Manual, data).await
    }

    /// Resolve every unresolved conflict with the given strategy.
    ///
    /// Store failures leave the affected conflict unresolved and move on.
    /// Returns how many conflicts were resolved.
    pub async fn resolve_all(
        &self,
        strategy: ResolutionStrategy,
    ) -> Result<usize, ResolverError> {
        let pending: Vec<String> = {
            let tracker = self.tracker.lock().unwrap();
            tracker
                .unresolved()
                .iter()
                .map(|c| c.entity_id.clone())
                .collect()
        };

        let mut resolved = 0;
        for entity_id in pending {
            match self.resolve(&entity_id, strategy).await {
                Ok(()) => resolved += 1,
                Err(ResolverError::Store(e)) => {
                    tracing::warn!("Failed to apply resolution for {}: {}", entity_id, e);
                }
                Err(ResolverError::Conflict(ConflictError::NotFound { .. })) => {
                    // Resolved concurrently; nothing to do.
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }

    /// Unresolved conflicts, oldest first.
    pub fn unresolved(&self) -> Vec<Conflict> {
        let tracker = self.tracker.lock().unwrap();
        tracker.unresolved().into_iter().cloned().collect()
    }

    /// Number of unresolved conflicts.
    pub fn unresolved_count(&self) -> usize {
        self.tracker.lock().unwrap().unresolved_count()
    }

    /// All tracked conflicts, resolved and not.
    pub fn all(&self) -> Vec<Conflict> {
        self.tracker.lock().unwrap().all().to_vec()
    }

    /// The resolution history, oldest first.
    pub fn history(&self) -> Vec<Resolution> {
        self.tracker.lock().unwrap().history().to_vec()
    }

    /// Summarize the working set.
    pub fn stats(&self) -> ConflictStats {
        self.tracker.lock().unwrap().stats()
    }

    /// Drop all conflicts, keeping the resolution history.
    pub fn clear(&self) {
        self.tracker.lock().unwrap().clear();
        let _ = self.events.send(ConflictEvent::Cleared);
    }

    fn snapshot(&self, entity_id: &str) -> Result<Conflict, ConflictError> {
        let tracker = self.tracker.lock().unwrap();
        tracker
            .get(entity_id)
            .cloned()
            .ok_or_else(|| ConflictError::NotFound {
                entity_id: entity_id.to_string(),
            })
    }

    async fn apply(
        &self,
        conflict: &Conflict,
        strategy: ResolutionStrategy,
        winner: Value,
    ) -> Result<(), ResolverError> {
        let now = self.clock.now();
        self.write_winner(conflict, &winner, now).await?;

        let remaining = {
            let mut tracker = self.tracker.lock().unwrap();
            tracker.resolve(&conflict.entity_id, strategy, winner, now)?;
            tracker.unresolved_count()
        };

        let _ = self.events.send(ConflictEvent::Resolved {
            entity_id: conflict.entity_id.clone(),
            strategy,
            remaining,
        });
        Ok(())
    }

    async fn write_winner(
        &self,
        conflict: &Conflict,
        winner: &Value,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        if conflict.entity_type == EntityType::Settings {
            return self
                .store
                .put_setting(&conflict.entity_id, winner.clone())
                .await;
        }

        // A non-object winner is a tombstone: the surviving side was a delete.
        match winner.as_object() {
            Some(map) => {
                let mut doc = map.clone();
                doc.insert("id".to_string(), Value::String(conflict.entity_id.clone()));
                doc.insert("last_modified".to_string(), Value::String(now.to_string()));
                self.store
                    .save_entity(conflict.entity_type, &conflict.entity_id, Value::Object(doc))
                    .await
            }
            None => {
                self.store
                    .delete_entity(conflict.entity_type, &conflict.entity_id)
                    .await
            }
        }
    }
}
