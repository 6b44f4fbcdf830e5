//! Conflict detection and resolution.
//!
//! A conflict exists when the same entity was modified on both sides
//! more than [`CONFLICT_WINDOW_MS`] apart. Detection and the five
//! resolution strategies are pure functions; [`ConflictTracker`] keeps
//! the working set and the resolution history. Writing resolved data
//! back to storage is the I/O layer's job.

use sync_types::{ConflictEntry, EntityRecord, EntityType, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::queue::TypeCounts;

/// Modifications closer together than this are treated as the same
/// edit (clock skew), not a conflict.
pub const CONFLICT_WINDOW_MS: i64 = 1000;

/// How a conflict gets resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Take the server's version.
    ServerWins,
    /// Take the client's version.
    ClientWins,
    /// Take whichever side was modified later; ties prefer the client.
    NewestWins,
    /// Field-level merge of both versions.
    Merge,
    /// A human picks; never auto-applied.
    Manual,
}

impl ResolutionStrategy {
    /// The snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::ServerWins => "server_wins",
            ResolutionStrategy::ClientWins => "client_wins",
            ResolutionStrategy::NewestWins => "newest_wins",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        }
    }
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        ResolutionStrategy::NewestWins
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ParseStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server_wins" => Ok(ResolutionStrategy::ServerWins),
            "client_wins" => Ok(ResolutionStrategy::ClientWins),
            "newest_wins" => Ok(ResolutionStrategy::NewestWins),
            "merge" => Ok(ResolutionStrategy::Merge),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(ParseStrategyError(other.to_string())),
        }
    }
}

/// Error returned when a strategy string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resolution strategy {0:?}")]
pub struct ParseStrategyError(String);

/// One detected divergence, with both full snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// The kind of entity that diverged.
    pub entity_type: EntityType,
    /// The diverged entity's id.
    pub entity_id: String,
    /// The server's snapshot.
    pub server_version: EntityRecord,
    /// The client's snapshot.
    pub client_version: EntityRecord,
    /// When the server side was modified.
    pub server_modified: Timestamp,
    /// When the client side was modified.
    pub client_modified: Timestamp,
    /// When the conflict was detected.
    pub detected: Timestamp,
    /// Whether a resolution has been applied.
    #[serde(default)]
    pub resolved: bool,
    /// The strategy that resolved it.
    #[serde(default)]
    pub resolution: Option<ResolutionStrategy>,
    /// When it was resolved.
    #[serde(default)]
    pub resolved_at: Option<Timestamp>,
    /// The winning entity body.
    #[serde(default)]
    pub resolved_data: Option<Value>,
}

impl Conflict {
    /// Build a working conflict from a server-reported entry.
    ///
    /// Modification times fall back from the explicit fields to the
    /// snapshot's `last_modified` to the epoch, so `newest_wins` stays
    /// total.
    pub fn from_entry(entry: ConflictEntry, now: Timestamp) -> Self {
        let server_modified = entry
            .server_modified
            .or(entry.server_version.last_modified)
            .unwrap_or_else(Timestamp::epoch);
        let client_modified = entry
            .client_modified
            .or(entry.client_version.last_modified)
            .unwrap_or_else(Timestamp::epoch);
        Self {
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            server_version: entry.server_version,
            client_version: entry.client_version,
            server_modified,
            client_modified,
            detected: now,
            resolved: false,
            resolution: None,
            resolved_at: None,
            resolved_data: None,
        }
    }
}

/// Compare local and server snapshots of one entity type and report
/// divergences.
///
/// Entities pair by their `id` field. Modification times are read from
/// `last_modified` (falling back to `lastModified`); an entity missing
/// a parseable timestamp on either side never conflicts. A pair
/// conflicts when the two times differ by strictly more than
/// [`CONFLICT_WINDOW_MS`].
pub fn detect_conflicts(
    local: &[Value],
    server: &[Value],
    entity_type: EntityType,
    now: Timestamp,
) -> Vec<Conflict> {
    let mut local_by_id: Vec<(&str, &Value)> = Vec::with_capacity(local.len());
    for value in local {
        if let Some(id) = value.get("id").and_then(Value::as_str) {
            local_by_id.push((id, value));
        }
    }

    let mut conflicts = Vec::new();
    for server_value in server {
        let server_id = match server_value.get("id").and_then(Value::as_str) {
            Some(id) => id,
            None => continue,
        };
        let local_value = match local_by_id.iter().find(|(id, _)| *id == server_id) {
            Some((_, value)) => *value,
            None => continue,
        };
        let server_ts = match modified_time(server_value) {
            Some(ts) => ts,
            None => continue,
        };
        let local_ts = match modified_time(local_value) {
            Some(ts) => ts,
            None => continue,
        };
        if server_ts.abs_diff_millis(&local_ts) > CONFLICT_WINDOW_MS {
            conflicts.push(Conflict {
                entity_type,
                entity_id: server_id.to_string(),
                server_version: snapshot_record(server_id, server_value, server_ts),
                client_version: snapshot_record(server_id, local_value, local_ts),
                server_modified: server_ts,
                client_modified: local_ts,
                detected: now,
                resolved: false,
                resolution: None,
                resolved_at: None,
                resolved_data: None,
            });
        }
    }
    conflicts
}

fn modified_time(value: &Value) -> Option<Timestamp> {
    let raw = value
        .get("last_modified")
        .or_else(|| value.get("lastModified"))?
        .as_str()?;
    Timestamp::parse(raw).ok()
}

fn snapshot_record(id: &str, value: &Value, modified: Timestamp) -> EntityRecord {
    EntityRecord {
        id: id.to_string(),
        data: value.clone(),
        version: value.get("version").and_then(Value::as_u64).unwrap_or(1),
        deleted: 0,
        last_modified: Some(modified),
    }
}

/// Pick the winning entity body for a conflict under a strategy.
///
/// `Manual` is an error: manual resolutions must supply their data
/// explicitly.
pub fn choose_resolution(
    conflict: &Conflict,
    strategy: ResolutionStrategy,
) -> Result<Value, ConflictError> {
    match strategy {
        ResolutionStrategy::ServerWins => Ok(conflict.server_version.data.clone()),
        ResolutionStrategy::ClientWins => Ok(conflict.client_version.data.clone()),
        ResolutionStrategy::NewestWins => {
            // Tie prefers the client: the local edit survives.
            if conflict.server_modified > conflict.client_modified {
                Ok(conflict.server_version.data.clone())
            } else {
                Ok(conflict.client_version.data.clone())
            }
        }
        ResolutionStrategy::Merge => {
            Ok(merge_values(&conflict.client_version.data, &conflict.server_version.data).value)
        }
        ResolutionStrategy::Manual => Err(ConflictError::ManualStrategy {
            entity_id: conflict.entity_id.clone(),
        }),
    }
}

/// The result of a field-level merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The merged entity body.
    pub value: Value,
    /// Keys where both sides held differing non-mergeable values and
    /// the client's value was kept. Callers should surface these.
    pub scalar_overlaps: Vec<String>,
}

/// Merge two entity bodies field by field.
///
/// Per key: arrays merge with id-aware deduplication, objects merge
/// shallowly with server fields overlaid, a null/missing client value
/// takes the server's, and anything else keeps the client's value.
pub fn merge_values(client: &Value, server: &Value) -> MergeOutcome {
    let mut merged: Map<String, Value> = client.as_object().cloned().unwrap_or_default();
    let mut scalar_overlaps = Vec::new();

    if let Some(server_map) = server.as_object() {
        for (key, server_val) in server_map {
            let client_val = merged.get(key);
            match client_val {
                Some(cv) if cv.is_array() && server_val.is_array() => {
                    let combined = merge_arrays(
                        cv.as_array().map(Vec::as_slice).unwrap_or(&[]),
                        server_val.as_array().map(Vec::as_slice).unwrap_or(&[]),
                    );
                    merged.insert(key.clone(), Value::Array(combined));
                }
                Some(cv) if cv.is_object() && server_val.is_object() => {
                    let mut overlay = cv.as_object().cloned().unwrap_or_default();
                    if let Some(server_fields) = server_val.as_object() {
                        for (k, v) in server_fields {
                            overlay.insert(k.clone(), v.clone());
                        }
                    }
                    merged.insert(key.clone(), Value::Object(overlay));
                }
                Some(cv) if cv.is_null() => {
                    merged.insert(key.clone(), server_val.clone());
                }
                Some(cv) => {
                    if cv != server_val {
                        scalar_overlaps.push(key.clone());
                    }
                }
                None => {
                    merged.insert(key.clone(), server_val.clone());
                }
            }
        }
    }

    MergeOutcome {
        value: Value::Object(merged),
        scalar_overlaps,
    }
}

/// Merge two arrays, client items first.
///
/// Server items with an `id` append only when that id is not already
/// present; items without an id append only when no structurally equal
/// item exists yet. Both checks run against the growing result, so
/// duplicated server items cannot slip in.
pub fn merge_arrays(client: &[Value], server: &[Value]) -> Vec<Value> {
    let mut merged: Vec<Value> = client.to_vec();
    let mut seen_ids: HashSet<String> = merged.iter().filter_map(item_id).collect();

    for server_item in server {
        match item_id(server_item) {
            Some(id) => {
                if seen_ids.insert(id) {
                    merged.push(server_item.clone());
                }
            }
            None => {
                if !merged.iter().any(|existing| existing == server_item) {
                    merged.push(server_item.clone());
                }
            }
        }
    }
    merged
}

fn item_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => {
            let truthy = n.as_f64().map_or(true, |f| f != 0.0);
            if truthy {
                Some(n.to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}

/// One entry in the resolution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// The kind of entity that was resolved.
    pub entity_type: EntityType,
    /// The resolved entity's id.
    pub entity_id: String,
    /// The strategy that was applied.
    pub strategy: ResolutionStrategy,
    /// When the resolution happened.
    pub resolved_at: Timestamp,
    /// The server snapshot's version counter.
    pub server_version: u64,
    /// The client snapshot's version counter.
    pub client_version: u64,
}

/// Counts per resolution strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCounts {
    /// Conflicts resolved with `server_wins`.
    pub server_wins: usize,
    /// Conflicts resolved with `client_wins`.
    pub client_wins: usize,
    /// Conflicts resolved with `newest_wins`.
    pub newest_wins: usize,
    /// Conflicts resolved with `merge`.
    pub merge: usize,
    /// Conflicts resolved manually.
    pub manual: usize,
}

impl StrategyCounts {
    fn bump(&mut self, strategy: ResolutionStrategy) {
        match strategy {
            ResolutionStrategy::ServerWins => self.server_wins += 1,
            ResolutionStrategy::ClientWins => self.client_wins += 1,
            ResolutionStrategy::NewestWins => self.newest_wins += 1,
            ResolutionStrategy::Merge => self.merge += 1,
            ResolutionStrategy::Manual => self.manual += 1,
        }
    }
}

/// A point-in-time summary of the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictStats {
    /// All conflicts in the working set, resolved or not.
    pub total: usize,
    /// Conflicts with an applied resolution.
    pub resolved: usize,
    /// Conflicts awaiting resolution.
    pub unresolved: usize,
    /// Conflicts per entity type.
    pub by_type: TypeCounts,
    /// Applied resolutions per strategy.
    pub by_strategy: StrategyCounts,
}

/// The working set of conflicts plus the resolution history.
///
/// Deduplication considers unresolved conflicts only: once an entity's
/// conflict is resolved, a fresh divergence for the same entity is a
/// new conflict.
#[derive(Debug, Clone, Default)]
pub struct ConflictTracker {
    conflicts: Vec<Conflict>,
    resolutions: Vec<Resolution>,
}

impl ConflictTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add detected conflicts, skipping entities that already have an
    /// unresolved conflict. Returns how many were actually added.
    pub fn add(&mut self, incoming: Vec<Conflict>) -> usize {
        let mut added = 0;
        for conflict in incoming {
            let duplicate = self.conflicts.iter().any(|c| {
                !c.resolved
                    && c.entity_type == conflict.entity_type
                    && c.entity_id == conflict.entity_id
            });
            if !duplicate {
                self.conflicts.push(conflict);
                added += 1;
            }
        }
        added
    }

    /// All conflicts, resolved or not, in detection order.
    pub fn all(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Unresolved conflicts in detection order.
    pub fn unresolved(&self) -> Vec<&Conflict> {
        self.conflicts.iter().filter(|c| !c.resolved).collect()
    }

    /// Number of unresolved conflicts.
    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.resolved).count()
    }

    /// The unresolved conflict for one entity, if any.
    pub fn get(&self, entity_id: &str) -> Option<&Conflict> {
        self.conflicts
            .iter()
            .find(|c| !c.resolved && c.entity_id == entity_id)
    }

    /// Unresolved conflicts for one entity type.
    pub fn by_type(&self, entity_type: EntityType) -> Vec<&Conflict> {
        self.conflicts
            .iter()
            .filter(|c| !c.resolved && c.entity_type == entity_type)
            .collect()
    }

    /// Mark an unresolved conflict resolved and record it in the
    /// history.
    pub fn resolve(
        &mut self,
        entity_id: &str,
        strategy: ResolutionStrategy,
        resolved_data: Value,
        now: Timestamp,
    ) -> Result<(), ConflictError> {
        let idx = self
            .conflicts
            .iter()
            .position(|c| !c.resolved && c.entity_id == entity_id)
            .ok_or_else(|| ConflictError::NotFound {
                entity_id: entity_id.to_string(),
            })?;

        let entry = {
            let conflict = &mut self.conflicts[idx];
            conflict.resolved = true;
            conflict.resolution = Some(strategy);
            conflict.resolved_at = Some(now);
            conflict.resolved_data = Some(resolved_data);
            Resolution {
                entity_type: conflict.entity_type,
                entity_id: conflict.entity_id.clone(),
                strategy,
                resolved_at: now,
                server_version: conflict.server_version.version,
                client_version: conflict.client_version.version,
            }
        };
        self.resolutions.push(entry);
        Ok(())
    }

    /// Drop all conflicts. The resolution history is retained.
    pub fn clear(&mut self) {
        self.conflicts.clear();
    }

    /// Drop resolved conflicts, keeping unresolved ones.
    pub fn clear_resolved(&mut self) {
        self.conflicts.retain(|c| !c.resolved);
    }

    /// The resolution history, oldest first.
    pub fn history(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// Summarize the working set.
    pub fn stats(&self) -> ConflictStats {
        let mut stats = ConflictStats {
            total: self.conflicts.len(),
            ..Default::default()
        };
        for conflict in &self.conflicts {
            stats.by_type.bump(conflict.entity_type);
            if conflict.resolved {
                stats.resolved += 1;
                if let Some(strategy) = conflict.resolution {
                    stats.by_strategy.bump(strategy);
                }
            } else {
                stats.unresolved += 1;
            }
        }
        stats
    }
}

/// Errors from conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// No unresolved conflict exists for the entity.
    #[error("no unresolved conflict for entity {entity_id:?}")]
    NotFound {
        /// The entity that was looked up.
        entity_id: String,
    },
    /// The manual strategy cannot pick data automatically.
    #[error("conflict for entity {entity_id:?} requires manual resolution")]
    ManualStrategy {
        /// The entity whose conflict needs a human decision.
        entity_id: String,
    },
}
