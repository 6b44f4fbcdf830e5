//! Durable mutation queue.
//!
//! Wraps [`MutationQueue`] with persistence: every mutation is written back
//! to the local store under [`QUEUE_KEY`], so pending changes survive
//! restarts. Persistence failures are logged and swallowed; the in-memory
//! queue stays authoritative for the session and the next successful write
//! catches the store up.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use sync_core::{MutationQueue, QueueItem, QueueStats};
use sync_types::{EntityType, Operation, QueueItemId, QueuePayload};

use crate::clock::Clock;
use crate::store::{LocalStore, QUEUE_KEY};

/// Mutation queue persisted to the local store.
///
/// Lock scope never spans a store write: mutations update the in-memory
/// queue under the lock, snapshot it, then persist outside the lock.
pub struct SyncQueue {
    queue: Mutex<MutationQueue>,
    store: Arc<dyn LocalStore>,
    clock: Arc<dyn Clock>,
}

impl SyncQueue {
    /// Load the queue from the store.
    ///
    /// A missing or corrupt queue document yields an empty queue. Corrupt
    /// documents are logged and left in place until the next persist
    /// overwrites them.
    pub async fn load(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        let queue = match store.setting(QUEUE_KEY).await {
            Ok(Some(doc)) => match parse_queue_doc(&doc) {
                Some(items) => MutationQueue::from_items(items),
                None => {
                    tracing::warn!("Corrupt queue document, starting with an empty queue");
                    MutationQueue::new()
                }
            },
            Ok(None) => MutationQueue::new(),
            Err(e) => {
                tracing::warn!("Failed to read queue document: {}", e);
                MutationQueue::new()
            }
        };

        Self {
            queue: Mutex::new(queue),
            store,
            clock,
        }
    }

    /// Create an empty queue without touching the store.
    pub fn empty(store: Arc<dyn LocalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: Mutex::new(MutationQueue::new()),
            store,
            clock,
        }
    }

    /// Record a local change.
    ///
    /// A pending item for the same entity is updated in place, so each
    /// entity occupies at most one queue slot.
    pub async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        operation: Operation,
        data: Option<Value>,
    ) -> QueueItem {
        let item = QueueItem::new(
            QueueItemId::new(),
            entity_type,
            entity_id,
            operation,
            data,
            self.clock.now(),
        );

        let stored = {
            let mut queue = self.queue.lock().unwrap();
            queue.add(item).clone()
        };
        self.persist().await;
        stored
    }

    /// Record a failed push attempt against an item.
    pub async fn mark_failed(&self, id: &QueueItemId, error: &str) -> bool {
        let marked = {
            let mut queue = self.queue.lock().unwrap();
            queue.mark_failed(id, error, self.clock.now())
        };
        if marked {
            self.persist().await;
        }
        marked
    }

    /// Drop items whose entity ids the server acknowledged.
    ///
    /// Returns how many items were removed.
    pub async fn clear_acked(&self, entity_ids: &[String]) -> usize {
        let removed = {
            let mut queue = self.queue.lock().unwrap();
            queue.clear_successful(entity_ids)
        };
        if removed > 0 {
            self.persist().await;
        }
        removed
    }

    /// Remove one item by id.
    pub async fn remove(&self, id: &QueueItemId) -> bool {
        let removed = {
            let mut queue = self.queue.lock().unwrap();
            queue.remove(id)
        };
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Remove the pending item for an entity, if any.
    pub async fn remove_entity(&self, entity_type: EntityType, entity_id: &str) -> bool {
        let removed = {
            let mut queue = self.queue.lock().unwrap();
            queue.remove_by_entity(entity_type, entity_id)
        };
        if removed {
            self.persist().await;
        }
        removed
    }

    /// Drop every pending item.
    pub async fn clear(&self) {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.clear();
        }
        self.persist().await;
    }

    /// Number of pending items.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Whether the queue has no pending items.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    /// Snapshot of all pending items.
    pub fn items(&self) -> Vec<QueueItem> {
        self.queue.lock().unwrap().items().to_vec()
    }

    /// Items that have exhausted their retries.
    pub fn failed_items(&self) -> Vec<QueueItem> {
        let queue = self.queue.lock().unwrap();
        queue.failed().into_iter().cloned().collect()
    }

    /// Aggregate counts for display.
    pub fn stats(&self) -> QueueStats {
        self.queue.lock().unwrap().stats()
    }

    /// Build the push payload for the current queue contents.
    pub fn to_payload(&self) -> QueuePayload {
        self.queue.lock().unwrap().to_payload()
    }

    async fn persist(&self) {
        let doc = {
            let queue = self.queue.lock().unwrap();
            json!({
                "queue": queue.items(),
                "lastUpdated": self.clock.now(),
            })
        };

        if let Err(e) = self.store.put_setting(QUEUE_KEY, doc).await {
            tracing::warn!("Failed to persist sync queue: {}", e);
        }
    }
}

fn parse_queue_doc(doc: &Value) -> Option<Vec<QueueItem>> {
    let items = doc.get("queue")?.as_array()?;
    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<QueueItem>(item.clone()) {
            Ok(item) => parsed.push(item),
            Err(_) => return None,
        }
    }
    Some(parsed)
}
