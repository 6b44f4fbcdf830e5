//! # sync-core
//!
//! Pure sync logic for JobDeck (no I/O, instant tests).
//!
//! This crate implements the mutation queue, conflict detection and
//! resolution, and the engine's state and settings types without any
//! network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce
//! output without side effects. Ids and timestamps are parameters, so:
//! - Unit tests run instantly (no mocks, no async)
//! - Behavior is deterministic (same input → same output)
//! - The conflict window and retry rules are easy to reason about
//!
//! The actual I/O (HTTP, storage, clocks) is performed by
//! `sync-client`, which drives these structures.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod queue;
pub mod settings;
pub mod state;

pub use conflict::{
    choose_resolution, detect_conflicts, merge_arrays, merge_values, Conflict, ConflictError,
    ConflictStats, ConflictTracker, MergeOutcome, ParseStrategyError, Resolution,
    ResolutionStrategy, StrategyCounts, CONFLICT_WINDOW_MS,
};
pub use queue::{
    MutationQueue, OperationCounts, QueueItem, QueueStats, TypeCounts, MAX_RETRIES,
};
pub use settings::{SyncSettings, DEFAULT_SYNC_INTERVAL_MS};
pub use state::SyncState;
