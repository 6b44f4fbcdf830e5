//! # sync-types
//!
//! Wire format types for the JobDeck sync protocol.
//!
//! This crate provides the foundational types used across all JobDeck
//! sync crates:
//! - [`EntityType`], [`Operation`], [`EntityRecord`], [`QueuePayload`] - Entity shapes
//! - [`FullSyncRequest`], [`PushRequest`], [`PullRequest`] and friends - API bodies
//! - [`DeviceId`], [`QueueItemId`] - Identity types
//! - [`Timestamp`] - ISO-8601 millisecond timestamps and watermarks

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entity;
mod ids;
mod protocol;
mod time;

pub use entity::{
    EntityRecord, EntityType, Operation, ParseEntityTypeError, ParseOperationError, QueuePayload,
};
pub use ids::{DeviceId, ParseDeviceIdError, QueueItemId};
pub use protocol::{
    ConflictEntry, ExportPayload, FullSyncRequest, FullSyncResponse, ImportRequest,
    ImportResponse, PullData, PullRequest, PullResponse, PullResult, PushCounts, PushError,
    PushRequest, PushResponse, PushSummary, ServerStatus, SyncSession,
};
pub use time::{Timestamp, TimestampError};
