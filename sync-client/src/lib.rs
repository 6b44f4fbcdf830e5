//! # jobdeck-sync-client
//!
//! Client engine for JobDeck data synchronization.
//!
//! This is the library applications embed to sync jobs, resumes, cover
//! letters, and settings against a JobDeck sync server.
//!
//! ## Features
//!
//! - **Durable Offline Queue**: local changes persist across restarts and
//!   push when connectivity returns
//! - **Conflict Resolution**: strategy-driven, with field-level merge
//! - **Pluggable Dependencies**: API, storage, auth, connectivity, and the
//!   clock are traits, so the engine runs identically in tests
//! - **Pure Core**: uses sync-core for side-effect-free queue and conflict
//!   logic
//!
//! ## Example
//!
//! ```ignore
//! use sync_client::{HttpSyncApi, SyncManagerBuilder};
//!
//! let api = HttpSyncApi::new("https://api.jobdeck.app", auth.clone())?;
//! let manager = SyncManagerBuilder::new()
//!     .with_api(Arc::new(api))
//!     .with_store(store)
//!     .with_auth(auth)
//!     .build()
//!     .await?;
//!
//! manager.start();
//! let outcome = manager.sync().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod clock;
pub mod connectivity;
pub mod manager;
pub mod queue;
pub mod resolver;
pub mod store;

pub use api::{ApiError, HttpSyncApi, MockSyncApi, SyncApi};
pub use auth::{AuthError, AuthEvent, AuthProvider, MockAuth, StaticAuth};
pub use clock::{Clock, ManualClock, SystemClock};
pub use connectivity::{AlwaysOnline, Connectivity, ManualConnectivity};
pub use manager::{
    AppliedCounts, BuildError, ClientError, OfflineReason, SettingsUpdate, SyncEvent, SyncManager,
    SyncManagerBuilder, SyncOutcome, SyncStatusReport, SyncSummary,
};
pub use queue::SyncQueue;
pub use resolver::{ConflictEvent, ConflictResolver, ResolverError};
pub use store::{
    FailingStore, LocalStore, MemoryStore, StoreError, APP_SETTINGS_KEY, QUEUE_KEY, SETTINGS_KEY,
};
