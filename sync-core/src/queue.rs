//! The offline mutation queue.
//!
//! Every local create/update/delete is recorded here until the server
//! acknowledges it. The queue is pure: callers supply ids and
//! timestamps, and persistence is handled by the I/O layer. One
//! invariant drives the structure: at most one item per
//! (entity type, entity id), with later mutations replacing earlier
//! ones in place.

use sync_types::{
    EntityRecord, EntityType, Operation, QueueItemId, QueuePayload, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retry ceiling: items that failed this many times are parked and
/// reported via [`MutationQueue::failed`] rather than retried forever.
pub const MAX_RETRIES: u32 = 3;

/// One pending local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Stable identifier for this queue entry.
    pub id: QueueItemId,
    /// The kind of entity mutated.
    pub entity_type: EntityType,
    /// The mutated entity's own id.
    pub entity_id: String,
    /// What happened to the entity.
    pub operation: Operation,
    /// The entity's full value for create/update; absent for delete.
    #[serde(default)]
    pub data: Option<Value>,
    /// When the mutation was queued (or last replaced).
    pub timestamp: Timestamp,
    /// How many sync attempts have failed for this item.
    #[serde(default)]
    pub retries: u32,
    /// The most recent failure message, if any.
    #[serde(default)]
    pub last_error: Option<String>,
    /// When the most recent failure happened.
    #[serde(default)]
    pub last_retry: Option<Timestamp>,
}

impl QueueItem {
    /// Create a fresh queue item with zeroed retry state.
    pub fn new(
        id: QueueItemId,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        operation: Operation,
        data: Option<Value>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            entity_type,
            entity_id: entity_id.into(),
            operation,
            data,
            timestamp: now,
            retries: 0,
            last_error: None,
            last_retry: None,
        }
    }

    /// The wire record for this item.
    ///
    /// `version` is read from the entity body (default 1), `deleted`
    /// from the operation, and `last_modified` from the queue time.
    pub fn to_record(&self) -> EntityRecord {
        let version = self
            .data
            .as_ref()
            .and_then(|d| d.get("version"))
            .and_then(Value::as_u64)
            .unwrap_or(1);
        EntityRecord {
            id: self.entity_id.clone(),
            data: self.data.clone().unwrap_or(Value::Null),
            version,
            deleted: u8::from(self.operation.is_delete()),
            last_modified: Some(self.timestamp),
        }
    }

    /// Whether this item is still eligible for sending.
    pub fn is_retryable(&self) -> bool {
        self.retries < MAX_RETRIES
    }
}

/// Counts per entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCounts {
    /// Job entries.
    pub jobs: usize,
    /// Resume entries.
    pub resumes: usize,
    /// Cover letter entries.
    pub cover_letters: usize,
    /// Settings entries.
    pub settings: usize,
}

impl TypeCounts {
    /// Increment the counter for one entity type.
    pub fn bump(&mut self, entity_type: EntityType) {
        match entity_type {
            EntityType::Job => self.jobs += 1,
            EntityType::Resume => self.resumes += 1,
            EntityType::CoverLetter => self.cover_letters += 1,
            EntityType::Settings => self.settings += 1,
        }
    }
}

/// Counts per mutation operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounts {
    /// Queued creates.
    pub creates: usize,
    /// Queued updates.
    pub updates: usize,
    /// Queued deletes.
    pub deletes: usize,
}

/// A point-in-time summary of the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Total queued items.
    pub total: usize,
    /// Items per entity type.
    pub by_type: TypeCounts,
    /// Items per operation.
    pub by_operation: OperationCounts,
    /// Items that exhausted their retries (`retries >= MAX_RETRIES`).
    pub failed: usize,
    /// Items that failed at least once but are still eligible
    /// (`0 < retries < MAX_RETRIES`).
    pub retryable: usize,
}

/// The ordered set of pending mutations.
///
/// Order is insertion order, which is also payload order: the server
/// acknowledges records positionally, so the first N items of a type
/// correspond to the first N acknowledgements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationQueue {
    items: Vec<QueueItem>,
}

impl MutationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from persisted items, preserving order.
    pub fn from_items(items: Vec<QueueItem>) -> Self {
        Self { items }
    }

    /// All items in queue order.
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queue a mutation.
    ///
    /// If an item for the same (entity type, entity id) already exists
    /// it is replaced in place: the stored item keeps its original id
    /// and queue position, takes the new operation/data/timestamp, and
    /// resets its retry counter and error.
    pub fn add(&mut self, item: QueueItem) -> &QueueItem {
        let existing = self
            .items
            .iter()
            .position(|i| i.entity_type == item.entity_type && i.entity_id == item.entity_id);
        match existing {
            Some(idx) => {
                let slot = &mut self.items[idx];
                slot.operation = item.operation;
                slot.data = item.data;
                slot.timestamp = item.timestamp;
                slot.retries = 0;
                slot.last_error = None;
                &self.items[idx]
            }
            None => {
                self.items.push(item);
                &self.items[self.items.len() - 1]
            }
        }
    }

    /// Look up an item by queue entry id.
    pub fn get(&self, id: &QueueItemId) -> Option<&QueueItem> {
        self.items.iter().find(|i| &i.id == id)
    }

    /// All items for one entity type, in queue order.
    pub fn by_type(&self, entity_type: EntityType) -> Vec<&QueueItem> {
        self.items
            .iter()
            .filter(|i| i.entity_type == entity_type)
            .collect()
    }

    /// Items still eligible for sending (`retries < MAX_RETRIES`).
    pub fn retryable(&self) -> Vec<&QueueItem> {
        self.items.iter().filter(|i| i.is_retryable()).collect()
    }

    /// Items that exhausted their retries.
    pub fn failed(&self) -> Vec<&QueueItem> {
        self.items.iter().filter(|i| !i.is_retryable()).collect()
    }

    /// Remove an item by queue entry id. Returns whether anything was
    /// removed.
    pub fn remove(&mut self, id: &QueueItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.id != id);
        self.items.len() < before
    }

    /// Remove the item for one entity, if queued.
    pub fn remove_by_entity(&mut self, entity_type: EntityType, entity_id: &str) -> bool {
        let before = self.items.len();
        self.items
            .retain(|i| !(i.entity_type == entity_type && i.entity_id == entity_id));
        self.items.len() < before
    }

    /// Record a failed sync attempt for an item.
    ///
    /// Returns false if the item is no longer queued.
    pub fn mark_failed(&mut self, id: &QueueItemId, error: &str, now: Timestamp) -> bool {
        match self.items.iter_mut().find(|i| &i.id == id) {
            Some(item) => {
                item.retries += 1;
                item.last_error = Some(error.to_string());
                item.last_retry = Some(now);
                true
            }
            None => false,
        }
    }

    /// Remove every item whose entity id is in the acknowledged set,
    /// regardless of entity type. Returns how many were removed; an
    /// empty or unmatched set removes nothing.
    pub fn clear_successful(&mut self, entity_ids: &[String]) -> usize {
        if entity_ids.is_empty() {
            return 0;
        }
        let before = self.items.len();
        self.items
            .retain(|i| !entity_ids.iter().any(|id| id == &i.entity_id));
        before - self.items.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Shape the queue into the outbound sync payload.
    ///
    /// Document types become record arrays in queue order; settings is
    /// a singleton where the last queued settings item wins.
    pub fn to_payload(&self) -> QueuePayload {
        let mut payload = QueuePayload::default();
        for item in &self.items {
            if item.entity_type == EntityType::Settings {
                payload.settings = item.data.clone();
                continue;
            }
            let record = item.to_record();
            match item.entity_type {
                EntityType::Job => payload.jobs.push(record),
                EntityType::Resume => payload.resumes.push(record),
                EntityType::CoverLetter => payload.cover_letters.push(record),
                EntityType::Settings => {}
            }
        }
        payload
    }

    /// Summarize the queue.
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            stats.by_type.bump(item.entity_type);
            match item.operation {
                Operation::Create => stats.by_operation.creates += 1,
                Operation::Update => stats.by_operation.updates += 1,
                Operation::Delete => stats.by_operation.deletes += 1,
            }
            if item.retries >= MAX_RETRIES {
                stats.failed += 1;
            } else if item.retries > 0 {
                stats.retryable += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn make_item(entity_type: EntityType, entity_id: &str, operation: Operation) -> QueueItem {
        QueueItem::new(
            QueueItemId::new(),
            entity_type,
            entity_id,
            operation,
            Some(json!({"title": entity_id})),
            ts("2024-01-01T00:00:00.000Z"),
        )
    }

    // ===========================================
    // Add / dedup
    // ===========================================

    #[test]
    fn add_appends_new_items() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        queue.add(make_item(EntityType::Resume, "resume_1", Operation::Update));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn add_replaces_existing_entity() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_a", Operation::Create));
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        queue.add(make_item(EntityType::Job, "job_z", Operation::Create));

        let mut update = make_item(EntityType::Job, "job_1", Operation::Update);
        update.data = Some(json!({"title": "replaced"}));
        update.timestamp = ts("2024-01-01T01:00:00.000Z");
        queue.add(update);

        assert_eq!(queue.len(), 3);
        let item = &queue.items()[1]; // position preserved
        assert_eq!(item.entity_id, "job_1");
        assert_eq!(item.operation, Operation::Update);
        assert_eq!(item.data, Some(json!({"title": "replaced"})));
        assert_eq!(item.timestamp, ts("2024-01-01T01:00:00.000Z"));
    }

    #[test]
    fn replace_keeps_original_item_id() {
        let mut queue = MutationQueue::new();
        let original_id = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Create))
            .id;
        let replaced_id = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Update))
            .id;
        assert_eq!(original_id, replaced_id);
    }

    #[test]
    fn replace_resets_retry_state() {
        let mut queue = MutationQueue::new();
        let id = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Create))
            .id;
        queue.mark_failed(&id, "boom", ts("2024-01-01T00:01:00.000Z"));
        queue.add(make_item(EntityType::Job, "job_1", Operation::Update));

        let item = queue.get(&id).unwrap();
        assert_eq!(item.retries, 0);
        assert!(item.last_error.is_none());
    }

    #[test]
    fn different_types_may_share_entity_ids() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "shared", Operation::Create));
        queue.add(make_item(EntityType::Resume, "shared", Operation::Create));
        assert_eq!(queue.len(), 2);
    }

    // ===========================================
    // Remove / retry bookkeeping
    // ===========================================

    #[test]
    fn remove_by_id() {
        let mut queue = MutationQueue::new();
        let id = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Create))
            .id;
        assert!(queue.remove(&id));
        assert!(queue.is_empty());
        assert!(!queue.remove(&id));
    }

    #[test]
    fn remove_by_entity() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        assert!(queue.remove_by_entity(EntityType::Job, "job_1"));
        assert!(!queue.remove_by_entity(EntityType::Job, "job_1"));
        assert!(!queue.remove_by_entity(EntityType::Resume, "job_1"));
    }

    #[test]
    fn mark_failed_increments_and_records() {
        let mut queue = MutationQueue::new();
        let id = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Create))
            .id;
        assert!(queue.mark_failed(&id, "server error", ts("2024-01-01T00:05:00.000Z")));

        let item = queue.get(&id).unwrap();
        assert_eq!(item.retries, 1);
        assert_eq!(item.last_error.as_deref(), Some("server error"));
        assert_eq!(item.last_retry, Some(ts("2024-01-01T00:05:00.000Z")));
    }

    #[test]
    fn mark_failed_missing_item_is_false() {
        let mut queue = MutationQueue::new();
        assert!(!queue.mark_failed(&QueueItemId::new(), "boom", ts("2024-01-01T00:00:00.000Z")));
    }

    #[test]
    fn retryable_excludes_exhausted_items() {
        let mut queue = MutationQueue::new();
        let id = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Create))
            .id;
        queue.add(make_item(EntityType::Job, "job_2", Operation::Create));

        for _ in 0..MAX_RETRIES {
            queue.mark_failed(&id, "boom", ts("2024-01-01T00:05:00.000Z"));
        }

        assert_eq!(queue.retryable().len(), 1);
        assert_eq!(queue.failed().len(), 1);
        assert_eq!(queue.failed()[0].entity_id, "job_1");
    }

    // ===========================================
    // Acknowledgement clearing
    // ===========================================

    #[test]
    fn clear_successful_removes_matching() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        queue.add(make_item(EntityType::Job, "job_2", Operation::Create));
        queue.add(make_item(EntityType::Resume, "resume_1", Operation::Update));

        let removed = queue.clear_successful(&["job_1".to_string(), "resume_1".to_string()]);
        assert_eq!(removed, 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.items()[0].entity_id, "job_2");
    }

    #[test]
    fn clear_successful_again_is_no_op() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        let acked = vec!["job_1".to_string()];
        assert_eq!(queue.clear_successful(&acked), 1);
        assert_eq!(queue.clear_successful(&acked), 0);
        assert_eq!(queue.clear_successful(&[]), 0);
    }

    #[test]
    fn clear_successful_unknown_ids_is_zero() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        assert_eq!(queue.clear_successful(&["nope".to_string()]), 0);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn clear_successful_matches_across_types() {
        // Acknowledgement is by entity id only: a job and a resume
        // sharing an id are both cleared.
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "shared", Operation::Create));
        queue.add(make_item(EntityType::Resume, "shared", Operation::Create));
        assert_eq!(queue.clear_successful(&["shared".to_string()]), 2);
    }

    #[test]
    fn clear_empties_everything() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        queue.clear();
        assert!(queue.is_empty());
    }

    // ===========================================
    // Payload shaping
    // ===========================================

    #[test]
    fn payload_shapes_records() {
        let mut queue = MutationQueue::new();
        let mut item = make_item(EntityType::Job, "job_1", Operation::Update);
        item.data = Some(json!({"title": "Engineer", "version": 4}));
        queue.add(item);

        let payload = queue.to_payload();
        assert_eq!(payload.jobs.len(), 1);
        let record = &payload.jobs[0];
        assert_eq!(record.id, "job_1");
        assert_eq!(record.version, 4);
        assert_eq!(record.deleted, 0);
        assert_eq!(record.last_modified, Some(ts("2024-01-01T00:00:00.000Z")));
    }

    #[test]
    fn payload_delete_without_data() {
        let mut queue = MutationQueue::new();
        let item = QueueItem::new(
            QueueItemId::new(),
            EntityType::Job,
            "job_1",
            Operation::Delete,
            None,
            ts("2024-01-01T00:00:00.000Z"),
        );
        queue.add(item);

        let record = &queue.to_payload().jobs[0];
        assert_eq!(record.deleted, 1);
        assert_eq!(record.version, 1);
        assert!(record.data.is_null());
    }

    #[test]
    fn payload_settings_last_write_wins() {
        let mut queue = MutationQueue::new();
        let mut first = make_item(EntityType::Settings, "default", Operation::Update);
        first.data = Some(json!({"theme": "light"}));
        queue.add(first);
        let mut second = make_item(EntityType::Settings, "profile", Operation::Update);
        second.data = Some(json!({"theme": "dark"}));
        queue.add(second);

        let payload = queue.to_payload();
        assert_eq!(payload.settings, Some(json!({"theme": "dark"})));
        assert!(payload.jobs.is_empty());
    }

    #[test]
    fn payload_preserves_queue_order() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        queue.add(make_item(EntityType::Job, "job_2", Operation::Create));
        queue.add(make_item(EntityType::Job, "job_3", Operation::Create));

        let ids: Vec<_> = queue.to_payload().jobs.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, ["job_1", "job_2", "job_3"]);
    }

    // ===========================================
    // Stats / persistence shape
    // ===========================================

    #[test]
    fn stats_counts_types_and_operations() {
        let mut queue = MutationQueue::new();
        queue.add(make_item(EntityType::Job, "job_1", Operation::Create));
        queue.add(make_item(EntityType::Job, "job_2", Operation::Delete));
        queue.add(make_item(EntityType::Resume, "resume_1", Operation::Update));
        queue.add(make_item(EntityType::Settings, "default", Operation::Update));

        let stats = queue.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.by_type.jobs, 2);
        assert_eq!(stats.by_type.resumes, 1);
        assert_eq!(stats.by_type.settings, 1);
        assert_eq!(stats.by_operation.creates, 1);
        assert_eq!(stats.by_operation.updates, 2);
        assert_eq!(stats.by_operation.deletes, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.retryable, 0);
    }

    #[test]
    fn stats_retryable_counts_only_retried_items() {
        let mut queue = MutationQueue::new();
        let retried = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Create))
            .id;
        let exhausted = queue
            .add(make_item(EntityType::Job, "job_2", Operation::Create))
            .id;
        queue.add(make_item(EntityType::Job, "job_3", Operation::Create));

        queue.mark_failed(&retried, "boom", ts("2024-01-01T00:05:00.000Z"));
        for _ in 0..MAX_RETRIES {
            queue.mark_failed(&exhausted, "boom", ts("2024-01-01T00:05:00.000Z"));
        }

        let stats = queue.stats();
        assert_eq!(stats.retryable, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn items_roundtrip_through_serde() {
        let mut queue = MutationQueue::new();
        let id = queue
            .add(make_item(EntityType::Job, "job_1", Operation::Create))
            .id;
        queue.mark_failed(&id, "transient", ts("2024-01-01T00:05:00.000Z"));

        let json = serde_json::to_string(queue.items()).unwrap();
        let items: Vec<QueueItem> = serde_json::from_str(&json).unwrap();
        let reloaded = MutationQueue::from_items(items);
        assert_eq!(reloaded, queue);
    }
}
