//! Entity kinds, mutation operations, and the wire record shape.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The kinds of entity the engine synchronizes.
///
/// Three document types (keyed collections) plus the singleton
/// `settings` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// A job application record.
    Job,
    /// A resume document.
    Resume,
    /// A cover letter document.
    CoverLetter,
    /// The singleton application settings document.
    Settings,
}

impl EntityType {
    /// The three keyed document types, in payload order.
    ///
    /// `Settings` is excluded: it travels as a singleton object, not a
    /// record array.
    pub const DOCUMENT_TYPES: [EntityType; 3] =
        [EntityType::Job, EntityType::Resume, EntityType::CoverLetter];

    /// The singular wire name (`job`, `resume`, `coverLetter`, `settings`).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Job => "job",
            EntityType::Resume => "resume",
            EntityType::CoverLetter => "coverLetter",
            EntityType::Settings => "settings",
        }
    }

    /// The plural key used in sync payloads (`jobs`, `resumes`,
    /// `coverLetters`, `settings`).
    pub fn wire_key(&self) -> &'static str {
        match self {
            EntityType::Job => "jobs",
            EntityType::Resume => "resumes",
            EntityType::CoverLetter => "coverLetters",
            EntityType::Settings => "settings",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ParseEntityTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job" => Ok(EntityType::Job),
            "resume" => Ok(EntityType::Resume),
            "coverLetter" => Ok(EntityType::CoverLetter),
            "settings" => Ok(EntityType::Settings),
            other => Err(ParseEntityTypeError(other.to_string())),
        }
    }
}

/// Error returned when an entity type string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type {0:?} (expected job, resume, coverLetter, or settings)")]
pub struct ParseEntityTypeError(String);

/// The kind of mutation a queue item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// The entity was created locally.
    Create,
    /// The entity was modified locally.
    Update,
    /// The entity was deleted locally.
    Delete,
}

impl Operation {
    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Whether this operation tombstones the entity.
    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(ParseOperationError(other.to_string())),
        }
    }
}

/// Error returned when an operation string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation {0:?} (expected create, update, or delete)")]
pub struct ParseOperationError(String);

/// One entity row as it travels on the wire.
///
/// `data` is the schemaless entity body; `deleted` is the server's
/// 0/1 tombstone flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// The entity's own identifier.
    pub id: String,
    /// The full entity body.
    #[serde(default)]
    pub data: Value,
    /// Monotonic per-entity version counter.
    #[serde(default = "default_version")]
    pub version: u64,
    /// Tombstone flag: 1 when the entity is deleted, else 0.
    #[serde(default)]
    pub deleted: u8,
    /// Last modification time, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
}

impl EntityRecord {
    /// Whether this record is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted != 0
    }
}

fn default_version() -> u64 {
    1
}

/// The outbound entity batch built from the mutation queue.
///
/// Document types are record arrays; `settings` is a last-write-wins
/// singleton object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePayload {
    /// Pending job records.
    #[serde(default)]
    pub jobs: Vec<EntityRecord>,
    /// Pending resume records.
    #[serde(default)]
    pub resumes: Vec<EntityRecord>,
    /// Pending cover letter records.
    #[serde(default)]
    pub cover_letters: Vec<EntityRecord>,
    /// The pending settings object, if one was queued.
    #[serde(default)]
    pub settings: Option<Value>,
}

impl QueuePayload {
    /// The records queued for one document type.
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

    /// Whether the payload carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
            && self.resumes.is_empty()
            && self.cover_letters.is_empty()
            && self.settings.is_none()
    }

    /// Total number of queued records, counting settings as one.
    pub fn record_count(&self) -> usize {
        self.jobs.len()
            + self.resumes.len()
            + self.cover_letters.len()
            + usize::from(self.settings.is_some())
    }
}
