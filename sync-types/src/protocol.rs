//! Request and response bodies for the sync HTTP API.
//!
//! Shapes match the server contract exactly: camelCase envelope keys,
//! snake_case row fields, and defaults everywhere the server may omit
//! a field. A response missing expected arrays deserializes to empty
//! collections rather than failing, so a malformed payload degrades to
//! "nothing to process".

use crate::{DeviceId, EntityRecord, EntityType, QueuePayload, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /sync/full`: the combined push-then-pull round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSyncRequest {
    /// Everything currently queued locally.
    pub entities: QueuePayload,
    /// The client's watermark; the server returns changes after it.
    pub last_sync: Timestamp,
    /// The calling device.
    pub device_id: DeviceId,
}

/// Response of `POST /sync/full`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullSyncResponse {
    /// Whether the server processed the round trip.
    #[serde(default)]
    pub success: bool,
    /// Per-type acknowledgement counts for the pushed payload.
    #[serde(default)]
    pub push: Option<PushSummary>,
    /// Server-side changes and detected conflicts.
    #[serde(default)]
    pub pull: Option<PullResult>,
    /// Server time for this sync; becomes the new watermark.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Body of `POST /sync/push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Everything currently queued locally.
    pub entities: QueuePayload,
    /// The client's watermark (informational on push).
    pub last_sync: Timestamp,
}

/// Response of `POST /sync/push`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// Whether the server processed the push.
    #[serde(default)]
    pub success: bool,
    /// Per-type acknowledgement counts.
    #[serde(default)]
    pub results: Option<PushSummary>,
    /// Server time for this push.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Body of `POST /sync/pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// The client's watermark; the server returns changes after it.
    pub last_sync: Timestamp,
    /// Plural wire keys of the entity types to pull.
    pub entities: Vec<String>,
}

impl PullRequest {
    /// A pull request covering every entity type.
    pub fn all_entities(last_sync: Timestamp) -> Self {
        let mut entities: Vec<String> = EntityType::DOCUMENT_TYPES
            .iter()
            .map(|t| t.wire_key().to_string())
            .collect();
        entities.push(EntityType::Settings.wire_key().to_string());
        Self { last_sync, entities }
    }
}

/// Response of `POST /sync/pull`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Whether the server processed the pull.
    #[serde(default)]
    pub success: bool,
    /// Server-side changes since the watermark.
    #[serde(default)]
    pub data: PullData,
    /// Server time for this pull; becomes the new watermark.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Per-type push acknowledgement counts.
///
/// `success` counts records accepted in payload order, so the client
/// can clear exactly the acknowledged prefix of its queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushCounts {
    /// Records the server accepted.
    #[serde(default)]
    pub success: u32,
    /// Records the server rejected.
    #[serde(default)]
    pub failed: u32,
}

/// One rejected record from a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushError {
    /// The wire key of the failing collection (`jobs`, `settings`, ...).
    pub entity: String,
    /// The failing entity id, when the server knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The server's failure message.
    pub error: String,
}

/// Acknowledgement summary for a pushed payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSummary {
    /// Job acknowledgements.
    #[serde(default)]
    pub jobs: PushCounts,
    /// Resume acknowledgements.
    #[serde(default)]
    pub resumes: PushCounts,
    /// Cover letter acknowledgements.
    #[serde(default)]
    pub cover_letters: PushCounts,
    /// Settings acknowledgement, present when settings were pushed.
    #[serde(default)]
    pub settings: Option<PushCounts>,
    /// Individual record failures.
    #[serde(default)]
    pub errors: Vec<PushError>,
}

impl PushSummary {
    /// Acknowledgement counts for one entity type.
    pub fn counts_for(&self, entity_type: EntityType) -> PushCounts {
        match entity_type {
            EntityType::Job => self.jobs,
            EntityType::Resume => self.resumes,
            EntityType::CoverLetter => self.cover_letters,
            EntityType::Settings => self.settings.unwrap_or_default(),
        }
    }

    /// Total accepted records across all types.
    pub fn total_success(&self) -> u32 {
        self.jobs.success
            + self.resumes.success
            + self.cover_letters.success
            + self.settings.map_or(0, |c| c.success)
    }

    /// Total rejected records across all types.
    pub fn total_failed(&self) -> u32 {
        self.jobs.failed
            + self.resumes.failed
            + self.cover_letters.failed
            + self.settings.map_or(0, |c| c.failed)
    }
}

/// Server-side changes returned by a pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullData {
    /// Changed job records.
    #[serde(default)]
    pub jobs: Vec<EntityRecord>,
    /// Changed resume records.
    #[serde(default)]
    pub resumes: Vec<EntityRecord>,
    /// Changed cover letter records.
    #[serde(default)]
    pub cover_letters: Vec<EntityRecord>,
    /// The server's settings object, when it changed.
    #[serde(default)]
    pub settings: Option<Value>,
}

impl PullData {
    /// The pulled records for one document type.
    ///
    /// `Settings` yields an empty slice; use the `settings` field.
    pub fn records(&self, entity_type: EntityType) -> &[EntityRecord] {
        match entity_type {
            EntityType::Job => &self.jobs,
            EntityType::Resume => &self.resumes,
            EntityType::CoverLetter => &self.cover_letters,
            EntityType::Settings => &[],
        }
    }

    /// Whether the pull carried nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
            && self.resumes.is_empty()
            && self.cover_letters.is_empty()
            && self.settings.is_none()
    }

    /// Total number of pulled records, counting settings as one.
    pub fn record_count(&self) -> usize {
        self.jobs.len()
            + self.resumes.len()
            + self.cover_letters.len()
            + usize::from(self.settings.is_some())
    }
}

/// The pull half of a full sync: data plus detected conflicts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResult {
    /// Server-side changes since the watermark.
    #[serde(default)]
    pub data: PullData,
    /// Conflicts the server detected while applying the push.
    #[serde(default)]
    pub conflicts: Vec<ConflictEntry>,
}

/// One divergence reported by the server.
///
/// Carries both full snapshots so any resolution strategy can be
/// applied without another round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    /// The kind of entity that diverged.
    pub entity_type: EntityType,
    /// The diverged entity's id.
    pub entity_id: String,
    /// The server's snapshot.
    pub server_version: EntityRecord,
    /// The client's snapshot as pushed.
    pub client_version: EntityRecord,
    /// Server-side modification time, when reported separately.
    #[serde(default)]
    pub server_modified: Option<Timestamp>,
    /// Client-side modification time, when reported separately.
    #[serde(default)]
    pub client_modified: Option<Timestamp>,
}

/// Response of `GET /sync/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Whether the server answered the status request.
    #[serde(default)]
    pub success: bool,
    /// The authenticated account id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// The calling device id, echoed back.
    #[serde(default)]
    pub device_id: Option<String>,
    /// The server's recorded watermark for this device.
    #[serde(default)]
    pub last_sync: Option<Timestamp>,
    /// Known device sessions for this account.
    #[serde(default)]
    pub sessions: Vec<SyncSession>,
    /// Server-defined account statistics.
    #[serde(default)]
    pub stats: Option<Value>,
}

/// One device session as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    /// The session's device id.
    #[serde(default)]
    pub device_id: Option<String>,
    /// Human-readable device name.
    #[serde(default)]
    pub device_name: Option<String>,
    /// When this device last synced.
    #[serde(default)]
    pub last_sync: Option<Timestamp>,
    /// How many syncs this device has performed.
    #[serde(default)]
    pub sync_count: u64,
}

/// Response of `GET /sync/export`: a full account backup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    /// Export format version.
    #[serde(default)]
    pub version: String,
    /// When the export was produced.
    #[serde(default)]
    pub exported_at: Option<Timestamp>,
    /// The exporting account id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// The complete account data.
    #[serde(default)]
    pub data: PullData,
}

/// Body of `POST /sync/import`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// The account data to restore.
    pub data: PullData,
    /// Replace existing server data instead of merging.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overwrite: bool,
}

/// Response of `POST /sync/import`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportResponse {
    /// Whether the server accepted the import.
    #[serde(default)]
    pub success: bool,
    /// Per-type acceptance counts for the imported data.
    #[serde(default)]
    pub results: Option<PushSummary>,
    /// Server time for the import.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_request_uses_camel_case_envelope() {
        let request = FullSyncRequest {
            entities: QueuePayload::default(),
            last_sync: Timestamp::epoch(),
            device_id: DeviceId::random(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["lastSync"], "1970-01-01T00:00:00.000Z");
        assert!(value.get("deviceId").is_some());
        assert!(value.get("entities").is_some());
    }

    #[test]
    fn full_response_parses_server_shape() {
        let response: FullSyncResponse = serde_json::from_value(json!({
            "success": true,
            "push": {
                "jobs": {"success": 2, "failed": 0},
                "resumes": {"success": 0, "failed": 1},
                "coverLetters": {"success": 0, "failed": 0},
                "settings": {"success": 1, "failed": 0},
                "errors": [{"entity": "resumes", "id": "r1", "error": "bad row"}]
            },
            "pull": {
                "data": {"jobs": [{"id": "job_1", "data": {}, "version": 1, "deleted": 0,
                                    "last_modified": "2024-01-02T00:00:00.000Z"}]},
                "conflicts": []
            },
            "timestamp": "2024-01-02T00:00:00.000Z"
        }))
        .unwrap();
        let push = response.push.unwrap();
        assert_eq!(push.counts_for(EntityType::Job).success, 2);
        assert_eq!(push.counts_for(EntityType::Settings).success, 1);
        assert_eq!(push.total_failed(), 1);
        assert_eq!(push.errors.len(), 1);
        let pull = response.pull.unwrap();
        assert_eq!(pull.data.jobs.len(), 1);
        assert_eq!(
            response.timestamp.unwrap().to_string(),
            "2024-01-02T00:00:00.000Z"
        );
    }

    #[test]
    fn malformed_pull_data_degrades_to_empty() {
        // Missing arrays must deserialize, not fail: the apply step
        // then has nothing to process.
        let data: PullData = serde_json::from_value(json!({})).unwrap();
        assert!(data.is_empty());

        let response: FullSyncResponse = serde_json::from_value(json!({
            "success": true,
            "timestamp": "2024-01-02T00:00:00.000Z"
        }))
        .unwrap();
        assert!(response.push.is_none());
        assert!(response.pull.is_none());
    }

    #[test]
    fn pull_request_covers_all_entities() {
        let request = PullRequest::all_entities(Timestamp::epoch());
        assert_eq!(request.entities, ["jobs", "resumes", "coverLetters", "settings"]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["lastSync"], "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn conflict_entry_parses_full_snapshots() {
        let entry: ConflictEntry = serde_json::from_value(json!({
            "entityType": "resume",
            "entityId": "resume_9",
            "serverVersion": {"id": "resume_9", "data": {"title": "server"}, "version": 4,
                               "deleted": 0, "last_modified": "2024-01-02T00:00:05.000Z"},
            "clientVersion": {"id": "resume_9", "data": {"title": "client"}, "version": 3,
                               "deleted": 0, "last_modified": "2024-01-02T00:00:00.000Z"},
            "serverModified": "2024-01-02T00:00:05.000Z",
            "clientModified": "2024-01-02T00:00:00.000Z"
        }))
        .unwrap();
        assert_eq!(entry.entity_type, EntityType::Resume);
        assert_eq!(entry.server_version.data["title"], "server");
        assert_eq!(entry.client_version.version, 3);
    }

    #[test]
    fn import_request_omits_default_overwrite() {
        let request = ImportRequest {
            data: PullData::default(),
            overwrite: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("overwrite").is_none());

        let request = ImportRequest {
            data: PullData::default(),
            overwrite: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["overwrite"], true);
    }

    #[test]
    fn server_status_tolerates_minimal_payload() {
        let status: ServerStatus = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(status.success);
        assert!(status.sessions.is_empty());
        assert!(status.last_sync.is_none());
    }

    #[test]
    fn export_payload_roundtrip() {
        let payload: ExportPayload = serde_json::from_value(json!({
            "version": "1.0.0",
            "exportedAt": "2024-01-02T00:00:00.000Z",
            "userId": "user_1",
            "data": {"jobs": [], "resumes": [], "coverLetters": [], "settings": {"theme": "dark"}}
        }))
        .unwrap();
        assert_eq!(payload.version, "1.0.0");
        assert_eq!(payload.data.settings, Some(json!({"theme": "dark"})));
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("exportedAt").is_some());
    }
}
